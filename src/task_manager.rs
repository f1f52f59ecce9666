//! Supervised worker tasks.
//!
//! Each control loop runs as its own tokio task, so a panic in one loop is
//! captured as a `JoinError` and cannot touch another loop's state. The
//! coordinator reconciles periodically: any worker found finished is reaped
//! and started again under the same name.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Manages async tasks with proper lifecycle and error handling.
pub struct TaskManager {
    tasks: HashMap<String, TaskInfo>,
    pub global_token: CancellationToken,
}

/// How a reaped worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    Completed,
    Failed(String),
    Panicked,
    Cancelled,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns and registers a task with the given name.
    ///
    /// The task receives a child of the global token. A previous task with
    /// the same name is aborted and replaced.
    pub async fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        if self.global_token.is_cancelled() {
            anyhow::bail!("Refusing to start '{name}' during shutdown");
        }

        let task_token = self.global_token.child_token();
        let task_token_clone = task_token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            match task_fn(task_token_clone).await {
                Ok(()) => {
                    info!("Task '{task_name}' completed successfully");
                    Ok(())
                }
                Err(e) => {
                    error!("Task '{task_name}' failed: {e:#}");
                    Err(e)
                }
            }
        });

        let previous = self.tasks.insert(
            name.clone(),
            TaskInfo {
                handle,
                cancel_token: task_token,
            },
        );
        if let Some(previous) = previous {
            warn!("Replacing existing task '{name}'");
            previous.cancel_token.cancel();
            previous.handle.abort();
        }

        info!("Task '{name}' spawned");
        Ok(())
    }

    /// True while the named task is registered and has not finished.
    pub fn is_alive(&self, name: &str) -> bool {
        self.tasks
            .get(name)
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Removes every finished task and reports how each one ended.
    pub async fn reap_finished(&mut self) -> Vec<(String, TaskExit)> {
        let finished: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        let mut reaped = Vec::with_capacity(finished.len());
        for name in finished {
            let Some(task) = self.tasks.remove(&name) else {
                continue;
            };
            let exit = match task.handle.await {
                Ok(Ok(())) => TaskExit::Completed,
                Ok(Err(e)) => TaskExit::Failed(format!("{e:#}")),
                Err(e) if e.is_panic() => TaskExit::Panicked,
                Err(_) => TaskExit::Cancelled,
            };
            warn!("Worker '{name}' is no longer running ({exit:?})");
            reaped.push((name, exit));
        }
        reaped
    }

    /// True once [`shutdown_all`](Self::shutdown_all) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.global_token.is_cancelled()
    }

    /// Cancels every task and waits for each to exit. A task that ignores
    /// cancellation past the timeout is aborted, so none outlives this call.
    ///
    /// Safe to call repeatedly; later calls find nothing left to stop.
    /// Returns the first error encountered, if any.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        if self.tasks.is_empty() && self.global_token.is_cancelled() {
            return Ok(());
        }
        info!("Stopping all {} tasks", self.tasks.len());

        self.global_token.cancel();

        let mut first_error = None;
        let handles: Vec<_> = self
            .tasks
            .drain()
            .map(|(name, info)| (name, info.handle))
            .collect();

        for (name, mut handle) in handles {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!("Task '{name}' failed during shutdown: {e}");
                    first_error.get_or_insert(e);
                }
                Ok(Err(e)) => {
                    let error = anyhow::anyhow!("Task '{name}' panicked: {e}");
                    error!("{error}");
                    first_error.get_or_insert(error);
                }
                Err(_) => {
                    // Dropping the handle would detach the worker; stop it here.
                    handle.abort();
                    let _ = handle.await;
                    let error = anyhow::anyhow!("Task '{name}' shutdown timeout exceeded, aborted");
                    error!("{error}");
                    first_error.get_or_insert(error);
                }
            }
        }

        if let Some(error) = first_error {
            Err(error).context("One or more tasks failed during shutdown")
        } else {
            info!("All tasks stopped");
            Ok(())
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(test)]
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

struct TaskInfo {
    handle: JoinHandle<Result<()>>,
    cancel_token: CancellationToken,
}
