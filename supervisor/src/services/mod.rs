//! Service implementations
//!
//! Real implementations of the service traits. These touch the OS process
//! table and run host commands.

pub mod host_probe;
pub mod process_manager;

#[cfg(test)]
mod tests;

pub use host_probe::RealHostProbe;
pub use process_manager::RealProcessManager;
