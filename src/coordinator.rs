//! System coordinator: service registration, supervision and shutdown.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::broadcast::error::RecvError,
    time::MissedTickBehavior,
};

use crate::{
    app_context::AppState,
    config::{ConfigManager, TimingCfg},
    event::{Event, EventBus},
    providers::{
        AppStateProvider, AsyncProvider, DBusServiceProvider, FanServiceProvider,
        KeyboardServiceProvider, PowerServiceProvider, ServiceProvider, ThermalServiceProvider,
    },
    task_manager::TaskManager,
};

/// Owns every service provider and the supervisor they run under.
///
/// Lifecycle: [`initialize`](Self::initialize) prepares hardware (a
/// critical failure aborts startup), [`start_all_services`](Self::start_all_services)
/// spawns one worker per provider and [`run_main_loop`](Self::run_main_loop)
/// restarts dead workers on the monitor interval until a stop is requested.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
    monitor_interval: Duration,
    stopped: bool,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
            monitor_interval: TimingCfg::default().monitor_interval(),
            stopped: false,
        }
    }

    /// Builds shared state, registers providers and prepares hardware.
    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let state = AppStateProvider::new(config_manager)
            .provide()
            .await
            .context("Failed to initialize application state")?;
        self.monitor_interval = state.config().timing.monitor_interval();
        self.shared_state = Some(state.clone());

        self.register_service_providers(state).await;
        self.initialize_services()
            .await
            .context("Failed to initialize hardware")?;

        info!("SystemCoordinator initialization completed");
        Ok(())
    }

    async fn register_service_providers(&mut self, state: Arc<AppState>) {
        self.add_provider(Box::new(KeyboardServiceProvider::new(&state)));
        self.add_provider(Box::new(ThermalServiceProvider::new(
            &state,
            self.event_bus.clone(),
        )));
        self.add_provider(Box::new(PowerServiceProvider::new(
            state.clone(),
            self.event_bus.clone(),
        )));
        self.add_provider(Box::new(FanServiceProvider::new(
            &state,
            self.event_bus.clone(),
        )));

        if state.config().dbus.enabled {
            match DBusServiceProvider::new(state.clone(), self.event_bus.clone()).await {
                Ok(provider) => self.add_provider(Box::new(provider)),
                Err(e) => warn!("{e:#}, skipping D-Bus service"),
            }
        }

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
    }

    /// Adds a provider, keeping the list in descending priority order.
    pub fn add_provider(&mut self, provider: Box<dyn ServiceProvider>) {
        self.service_providers.push(provider);
        self.service_providers
            .sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Runs every provider's one-time preparation. Critical failures abort;
    /// non-critical providers that fail are dropped.
    async fn initialize_services(&mut self) -> Result<()> {
        let mut ready = Vec::with_capacity(self.service_providers.len());

        for provider in std::mem::take(&mut self.service_providers) {
            match provider.initialize().await {
                Ok(()) => ready.push(provider),
                Err(e) if provider.is_critical() => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to initialize", provider.name())
                    });
                }
                Err(e) => warn!(
                    "Non-critical service '{}' disabled: {e:#}",
                    provider.name()
                ),
            }
        }

        self.service_providers = ready;
        Ok(())
    }

    /// Starts all registered services in priority order.
    ///
    /// Critical services must start successfully, while non-critical services
    /// can fail without stopping the system.
    pub async fn start_all_services(&mut self) -> Result<()> {
        info!(
            "Starting {} services in priority order...",
            self.service_providers.len()
        );

        for provider in &self.service_providers {
            let is_critical = provider.is_critical();

            match provider.start(&mut self.task_manager).await {
                Ok(()) => {
                    info!(
                        "Service '{}' started (priority: {}, critical: {})",
                        provider.name(),
                        provider.priority(),
                        is_critical
                    );
                }
                Err(e) if is_critical => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => {
                    warn!(
                        "Non-critical service '{}' failed to start: {e}",
                        provider.name()
                    );
                }
            }
        }

        info!("All critical services started successfully");
        Ok(())
    }

    /// Restarts every worker that is not alive. Returns the restarted names.
    ///
    /// Level-triggered: whatever killed a worker, the next call starts it
    /// again. There is no restart limit.
    pub async fn reconcile(&mut self) -> Vec<&'static str> {
        if self.stopped || self.task_manager.is_shutting_down() {
            return Vec::new();
        }

        self.task_manager.reap_finished().await;

        let mut restarted = Vec::new();
        for provider in &self.service_providers {
            let name = provider.name();
            if self.task_manager.is_alive(name) {
                continue;
            }

            warn!("Worker '{name}' is not running, restarting");
            match provider.start(&mut self.task_manager).await {
                Ok(()) => {
                    restarted.push(name);
                    if self
                        .event_bus
                        .publish(Event::WorkerRestarted(name.to_string()))
                        .is_err()
                    {
                        debug!("No subscribers for restart of '{name}'");
                    }
                }
                Err(e) => error!("Failed to restart '{name}': {e:#}"),
            }
        }
        restarted
    }

    /// Supervises workers until Ctrl-C, SIGTERM or a shutdown event, then
    /// shuts everything down.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut monitor = tokio::time::interval(self.monitor_interval);
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        monitor.tick().await;

        info!("Starting main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for shutdown signal")?;
                    info!("Received Ctrl+C, initiating graceful shutdown...");
                    break;
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown...");
                    break;
                }

                _ = monitor.tick() => {
                    let restarted = self.reconcile().await;
                    if !restarted.is_empty() {
                        info!("Restarted workers: {restarted:?}");
                    }
                }

                event = event_rx.recv() => {
                    if self.handle_event(event)?.is_break() {
                        break;
                    }
                }
            }
        }

        self.shutdown().await?;
        info!("Main event loop terminated");
        Ok(())
    }

    fn handle_event(&self, event_result: Result<Event, RecvError>) -> Result<ControlFlow<()>> {
        match event_result {
            Ok(Event::PerformanceModeRequested(enabled)) => match &self.shared_state {
                Some(state) => {
                    state.set_performance_mode(enabled);
                }
                None => warn!("Cannot change performance mode: system state not initialized"),
            },
            Ok(Event::SystemShutdown) => {
                info!("Processing SystemShutdown event");
                return Ok(ControlFlow::Break(()));
            }
            Ok(event) => debug!("Received event: {event:?}"),
            Err(RecvError::Closed) => bail!("Event bus channel closed unexpectedly"),
            Err(RecvError::Lagged(n)) => warn!("Event bus lagged by {n} messages"),
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Stops every worker, then releases every provider's cached handles
    /// and returns how many were closed.
    ///
    /// A second call is a no-op.
    pub async fn shutdown(&mut self) -> Result<usize> {
        if self.stopped {
            debug!("Shutdown already completed");
            return Ok(0);
        }
        self.stopped = true;
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.task_manager.shutdown_all().await {
            error!("Error during task shutdown: {e:#}");
        }

        let mut released = 0;
        for provider in &self.service_providers {
            let stats = provider.stats();
            debug!(
                "{}: {} reads, {} writes, {} cached handles",
                provider.name(),
                stats.reads,
                stats.writes,
                stats.cached_handles
            );
            released += provider.release().await;
        }

        info!("Shutdown complete, {released} cached handles released");
        Ok(released)
    }

    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn state(&self) -> Option<&Arc<AppState>> {
        self.shared_state.as_ref()
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        self.service_providers
            .iter()
            .map(|p| p.name())
            .filter(|name| self.task_manager.is_alive(name))
            .collect()
    }
}
