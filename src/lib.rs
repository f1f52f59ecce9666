//! # tufd
//!
//! A Linux daemon for Asus TUF laptops driven through the faustus platform
//! driver's sysfs files.
//!
//! ## Features
//!
//! - **Keyboard backlight**: colour follows CPU and GPU load, dimmed on battery
//! - **Thermal policy**: silent on battery, boost for gamemode or compiler jobs
//! - **Power profile**: profile, GPU power and fan mode per power source and
//!   performance mode
//! - **Fan boost**: automatic boost with a hysteresis band
//! - **Supervision**: every control loop is a supervised task restarted if it dies
//! - **D-Bus Interface**: performance mode and stop requests
//!
//! ## Architecture
//!
//! - [`PseudoFileStore`](pseudo_file::PseudoFileStore) - cached, retrying
//!   access to control files
//! - [`gateways`] - typed device accessors built on the store
//! - [`providers`] - one control loop per concern
//! - [`TaskManager`](task_manager::TaskManager) - worker supervision
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - lifecycle manager
//!
//! ## Example
//!
//! ```no_run
//! use tufd::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod cli;
pub mod config;
pub mod control_path;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod gateways;
pub mod interface;
pub mod modes;
pub mod policy;
pub mod providers;
pub mod pseudo_file;
pub mod retry;
pub mod task_manager;
pub mod tuning;
pub mod workload;

#[cfg(test)]
mod test_support;
