//! Route handlers, grouped by concern

pub mod hardware;
pub mod stream;
pub mod sweep;

pub use hardware::{acquire_hardware, force_release_hardware, hardware_status, release_hardware};
pub use stream::{event_stream, sweep_stream};
pub use sweep::{emergency_stop, health_check, start_sweep, stop_sweep, sweep_status};
