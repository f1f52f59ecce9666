//! Resilient access to small kernel pseudo-files.
//!
//! Every [`ControlPath`] gets at most one cached handle. Reads and writes
//! always rewind to offset 0, so a cached handle is only an optimization:
//! any I/O error drops it and the next attempt opens a fresh one.

use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use log::{debug, error, warn};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::Mutex,
};

use crate::{
    control_path::{Access, ControlPath},
    error::{ControlError, Result},
    retry::{Exhausted, RetryPolicy, with_retry},
};

type Handle = Arc<Mutex<File>>;

/// Counters describing store activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub cached_handles: usize,
}

impl std::ops::Add for StoreStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            reads: self.reads + other.reads,
            writes: self.writes + other.writes,
            cached_handles: self.cached_handles + other.cached_handles,
        }
    }
}

/// Handle cache plus retrying read/write for one gateway.
#[derive(Debug)]
pub struct PseudoFileStore {
    handles: DashMap<PathBuf, Handle>,
    retry: RetryPolicy,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl PseudoFileStore {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            handles: DashMap::new(),
            retry,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Returns the full content of the file.
    pub async fn read(&self, control: &ControlPath) -> Result<String> {
        if !control.access().readable() {
            return Err(access_violation(control, "control file is write-only"));
        }
        let name = format!("read {control}");
        let content = with_retry(&name, self.retry, || self.read_once(control))
            .await
            .map_err(|exhausted| self.failure(control, exhausted))?;

        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(content)
    }

    /// Replaces the file content with `content`.
    pub async fn write(&self, control: &ControlPath, content: &str) -> Result<()> {
        if !control.access().writable() {
            return Err(access_violation(control, "control file is read-only"));
        }
        let name = format!("write {control}");
        with_retry(&name, self.retry, || self.write_once(control, content))
            .await
            .map_err(|exhausted| self.failure(control, exhausted))?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Wrote {:?} to {control}", content);
        Ok(())
    }

    /// Closes every cached handle. Individual failures are logged only.
    pub async fn close_all(&self) -> usize {
        let paths: Vec<PathBuf> = self.handles.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;

        for path in paths {
            let Some((path, handle)) = self.handles.remove(&path) else {
                continue;
            };
            let mut file = handle.lock().await;
            if let Err(e) = file.flush().await {
                error!("Error closing {}: {e}", path.display());
            }
            closed += 1;
        }

        closed
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            cached_handles: self.handles.len(),
        }
    }

    async fn read_once(&self, control: &ControlPath) -> io::Result<String> {
        let handle = self.handle(control).await?;
        let mut file = handle.lock().await;
        let result = async {
            file.seek(SeekFrom::Start(0)).await?;
            let mut content = String::new();
            file.read_to_string(&mut content).await?;
            Ok::<_, io::Error>(content)
        }
        .await;

        if result.is_err() {
            self.invalidate(control.path());
        }
        result
    }

    async fn write_once(&self, control: &ControlPath, content: &str) -> io::Result<()> {
        let handle = self.handle(control).await?;
        let mut file = handle.lock().await;
        let result = async {
            file.seek(SeekFrom::Start(0)).await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
            // Regular files keep stale bytes past the new end; sysfs ignores this.
            if let Err(e) = file.set_len(content.len() as u64).await {
                debug!("Could not truncate {control}: {e}");
            }
            Ok::<_, io::Error>(())
        }
        .await;

        if result.is_err() {
            self.invalidate(control.path());
        }
        result
    }

    async fn handle(&self, control: &ControlPath) -> io::Result<Handle> {
        if let Some(handle) = self.handles.get(control.path()) {
            return Ok(Arc::clone(handle.value()));
        }

        let file = open_options(control.access()).open(control.path()).await?;
        let handle = self
            .handles
            .entry(control.path().to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(file)))
            .value()
            .clone();
        Ok(handle)
    }

    fn invalidate(&self, path: &Path) {
        if self.handles.remove(path).is_some() {
            debug!("Dropped cached handle for {}", path.display());
        }
    }

    fn failure(&self, control: &ControlPath, exhausted: Exhausted<io::Error>) -> ControlError {
        warn!(
            "Giving up on {control} after {} attempt(s): {}",
            exhausted.attempts, exhausted.error
        );
        ControlError::Io {
            path: control.path().to_path_buf(),
            attempts: exhausted.attempts,
            source: exhausted.error,
        }
    }
}

/// Wrong access mode is a configuration error, so it is never retried.
fn access_violation(control: &ControlPath, reason: &'static str) -> ControlError {
    error!("Refusing to access {control}: {reason}");
    ControlError::Io {
        path: control.path().to_path_buf(),
        attempts: 0,
        source: io::Error::new(io::ErrorKind::PermissionDenied, reason),
    }
}

fn open_options(access: Access) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(access.readable()).write(access.writable());
    options
}
