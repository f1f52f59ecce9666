//! Application entry point and builder pattern implementation.

use crate::{config::ConfigManager, coordinator::SystemCoordinator};
use anyhow::Result;

/// Main application structure that orchestrates all daemon components.
///
/// # Example
///
/// ```no_run
/// use tufd::application::Application;
/// use tufd::config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = config::ConfigManager::load(None).await?;
/// let mut app = Application::builder()
///     .with_config_manager(config_manager)
///     .build()?;
///
/// app.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    pub coordinator: SystemCoordinator,
    config_manager: ConfigManager,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Runs the complete daemon lifecycle: initialize, start services, and
    /// supervise until asked to stop.
    pub async fn run(&mut self) -> Result<()> {
        self.coordinator
            .initialize(self.config_manager.clone())
            .await?;

        if let Err(e) = self.coordinator.start_all_services().await {
            self.coordinator.shutdown().await?;
            return Err(e);
        }

        self.coordinator.run_main_loop().await
    }
}

/// Builder pattern for creating Application instances.
pub struct ApplicationBuilder {
    config_manager: Option<ConfigManager>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config_manager: None,
        }
    }

    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    pub fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow::anyhow!("Configuration manager is required"))?;

        Ok(Application {
            coordinator: SystemCoordinator::new(),
            config_manager,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event::Event, test_support::SysfsFixture};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[test]
    fn build_requires_config() {
        assert!(Application::builder().build().is_err());
    }

    #[tokio::test]
    async fn run_until_stop_requested() {
        let fx = SysfsFixture::new();
        let mut app = Application::builder()
            .with_config_manager(ConfigManager::new(fx.config(), None))
            .build()
            .unwrap();

        let event_bus = app.coordinator.event_bus().clone();
        tokio::spawn(async move {
            // Only the main loop subscribes, so success means it saw the event.
            while event_bus.publish(Event::SystemShutdown).is_err() {
                sleep(Duration::from_millis(10)).await;
            }
        });

        timeout(Duration::from_secs(5), app.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fx.read("kbbl_flags"), "ff");
        assert!(app.coordinator.running_services().is_empty());
    }

    #[tokio::test]
    async fn run_fails_fast_without_keyboard() {
        let fx = SysfsFixture::new();
        fx.remove("kbbl_mode");
        let mut app = Application::builder()
            .with_config_manager(ConfigManager::new(fx.config(), None))
            .build()
            .unwrap();

        assert!(app.run().await.is_err());
    }
}
