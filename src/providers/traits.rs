use anyhow::Result;
use async_trait::async_trait;

use crate::{pseudo_file::StoreStats, task_manager::TaskManager};

/// Base trait for providers that can create components asynchronously.
///
/// # Example
///
/// ```no_run
/// use tufd::providers::traits::AsyncProvider;
///
/// struct ConfigProvider;
///
/// #[async_trait::async_trait]
/// impl AsyncProvider<String> for ConfigProvider {
///     async fn provide(&self) -> anyhow::Result<String> {
///         Ok("config data".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// A supervised service started through [`TaskManager`].
///
/// `start` may be called again after the worker dies; it must spawn a fresh
/// worker under the same [`name`](Self::name) reusing the provider's
/// gateways.
///
/// # Example
///
/// ```no_run
/// use tufd::providers::traits::ServiceProvider;
/// use tufd::task_manager::TaskManager;
/// use anyhow::Result;
///
/// struct ExampleService;
///
/// #[async_trait::async_trait]
/// impl ServiceProvider for ExampleService {
///     async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
///         task_manager.spawn_task("example".to_string(), |token| async move {
///             token.cancelled().await;
///             Ok(())
///         }).await
///     }
///
///     fn name(&self) -> &'static str { "ExampleService" }
/// }
/// ```
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// One-time hardware preparation before the first start.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Starts (or restarts) the service in TaskManager.
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    /// Releases cached file handles after the worker stopped. Returns how
    /// many were closed.
    async fn release(&self) -> usize {
        0
    }

    /// Combined store activity of the gateways this service owns.
    fn stats(&self) -> StoreStats {
        StoreStats::default()
    }

    /// Returns service name for logging and supervision.
    fn name(&self) -> &'static str;

    /// Returns startup priority (higher numbers start first).
    fn priority(&self) -> i32 {
        0
    }

    /// Indicates if service is critical for system operation.
    fn is_critical(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MinimalService;

    #[async_trait]
    impl ServiceProvider for MinimalService {
        async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
            task_manager
                .spawn_task(self.name().to_string(), |token| async move {
                    token.cancelled().await;
                    Ok(())
                })
                .await
        }

        fn name(&self) -> &'static str {
            "MinimalService"
        }
    }

    #[tokio::test]
    async fn defaults_are_noops() {
        let service = MinimalService;
        assert!(service.initialize().await.is_ok());
        assert_eq!(service.release().await, 0);
        assert_eq!(service.stats(), StoreStats::default());
        assert_eq!(service.priority(), 0);
        assert!(!service.is_critical());
    }

    #[tokio::test]
    async fn start_registers_named_task() {
        let service = MinimalService;
        let mut task_manager = TaskManager::new();

        service.start(&mut task_manager).await.unwrap();
        assert!(task_manager.is_alive("MinimalService"));

        task_manager.shutdown_all().await.unwrap();
        assert!(!task_manager.is_alive("MinimalService"));
    }
}
