//! HTTP surface
//!
//! Route handlers for sweep control, hardware arbitration and the SSE event
//! stream.

pub mod handlers;
