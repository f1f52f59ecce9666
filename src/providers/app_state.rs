use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::{app_context::AppState, config::ConfigManager, providers::traits::AsyncProvider};

/// Builds the shared [`AppState`] from a loaded configuration.
pub struct AppStateProvider {
    config_manager: ConfigManager,
}

impl AppStateProvider {
    pub const fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }
}

#[async_trait]
impl AsyncProvider<Arc<AppState>> for AppStateProvider {
    async fn provide(&self) -> Result<Arc<AppState>> {
        let app_state = AppState::new(self.config_manager.clone())?;
        Ok(Arc::new(app_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn provides_state_with_initial_performance_mode() {
        let mut config = Config::default();
        config.performance_mode = true;
        let state = AppStateProvider::new(ConfigManager::new(config, None))
            .provide()
            .await
            .unwrap();
        assert!(state.performance_mode());
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let mut config = Config::default();
        config.retry.max_retries = 0;
        let provider = AppStateProvider::new(ConfigManager::new(config, None));
        assert!(provider.provide().await.is_err());
    }
}
