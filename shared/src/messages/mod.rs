//! Message types for the sweep supervision system
//!
//! - `events`: supervisor → consumer event surface streamed to dashboards
//! - `control`: operator requests and arbitration replies

pub mod control;
pub mod events;

pub use events::{
    CycleConfigPayload, ErrorCode, ErrorPayload, RecoveryPayload, SpectrumFrame, StatusPayload, SweepEvent,
};

pub use control::{
    AcquireResponse, ForceReleaseRequest, ForceReleaseResponse, FrequencyRequest, HardwareRequest, ReleaseResponse,
    StartSweepRequest,
};
