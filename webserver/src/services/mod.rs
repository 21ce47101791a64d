//! Service implementations

pub mod stream_broadcaster;

#[cfg(test)]
mod tests;

pub use stream_broadcaster::{ConnectionHandle, StreamBroadcaster};
