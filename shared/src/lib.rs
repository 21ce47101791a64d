//! Shared types for the sweep supervision system
//!
//! Contains the data model that crosses component boundaries: process and
//! cycle snapshots, recovery and health status, hardware locks, and the
//! event surface streamed to dashboard consumers.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{
    // Supervisor -> consumer event surface
    CycleConfigPayload, ErrorCode, ErrorPayload, RecoveryPayload, SpectrumFrame, StatusPayload, SweepEvent,
    // Control surface payloads
    AcquireResponse, ForceReleaseRequest, ForceReleaseResponse, FrequencyRequest, HardwareRequest, ReleaseResponse,
    StartSweepRequest,
};
