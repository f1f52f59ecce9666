//! Service providers: one supervised control loop per concern, plus the
//! optional D-Bus surface.
//!
//! Each provider owns the gateways its loop uses, so a restarted worker
//! picks up the same handle cache and nothing is shared between loops.

pub mod app_state;
pub mod dbus;
pub mod fan;
pub mod keyboard;
pub mod power;
pub mod thermal;
pub mod traits;

pub use app_state::AppStateProvider;
pub use dbus::DBusServiceProvider;
pub use fan::FanServiceProvider;
pub use keyboard::KeyboardServiceProvider;
pub use power::PowerServiceProvider;
pub use thermal::ThermalServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};
