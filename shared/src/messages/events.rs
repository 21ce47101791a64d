//! Events fanned out to every attached stream consumer

use crate::types::{CycleState, FrequencyRange, HardwareDevice, HealthSnapshot, ProcessState, RecoveryStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine-readable error codes carried by `error` events
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ProcessDied,
    HealthCheckFailed,
    SpawnFailed,
    RecoveryFailed,
    RecoveryExhausted,
    HardwareConflict,
    /// A range failed often enough to be dropped from the cycle
    FrequencyBlacklisted,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
    pub code: ErrorCode,
    pub timestamp: DateTime<Utc>,
}

/// Full snapshot pushed on attach and after every state transition
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub active: bool,
    pub process: ProcessState,
    pub cycle: CycleState,
    pub recovery: RecoveryStatus,
    pub health: HealthSnapshot,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleConfigPayload {
    pub frequencies: Vec<FrequencyRange>,
    pub current_index: usize,
    pub next_frequency: Option<FrequencyRange>,
    pub is_cycling: bool,
    pub cycle_time_ms: u64,
    pub switching_time_ms: u64,
    pub total_cycle_time_ms: u64,
    /// Ranges skipped by the cycle after repeated failures
    pub blacklisted: Vec<FrequencyRange>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPayload {
    pub attempt: u32,
    pub max_attempts: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// One raw output chunk from the sweep binary.
///
/// Content is not interpreted here; downstream consumers parse it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumFrame {
    pub data: String,
    pub frequency: Option<FrequencyRange>,
    pub received_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SweepEvent {
    Connected {
        connection_id: String,
        timestamp: DateTime<Utc>,
    },
    Status(StatusPayload),
    SpectrumData(SpectrumFrame),
    Error(ErrorPayload),
    Heartbeat {
        connection_id: String,
        uptime_ms: u64,
        timestamp: DateTime<Utc>,
    },
    CycleConfig(CycleConfigPayload),
    RecoveryStart(RecoveryPayload),
    RecoveryComplete(RecoveryPayload),
    RecoveryExhausted(RecoveryPayload),
    StatusChange {
        status: String,
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    HardwareAcquired {
        device: HardwareDevice,
        owner: String,
    },
    HardwareRejected {
        device: HardwareDevice,
        requester: String,
        owner: String,
    },
    HardwareReleased {
        device: HardwareDevice,
        owner: String,
    },
}

impl SweepEvent {
    /// Event name used on the wire (SSE `event:` field)
    pub fn kind(&self) -> &'static str {
        match self {
            SweepEvent::Connected { .. } => "connected",
            SweepEvent::Status(_) => "status",
            SweepEvent::SpectrumData(_) => "spectrum_data",
            SweepEvent::Error(_) => "error",
            SweepEvent::Heartbeat { .. } => "heartbeat",
            SweepEvent::CycleConfig(_) => "cycle_config",
            SweepEvent::RecoveryStart(_) => "recovery_start",
            SweepEvent::RecoveryComplete(_) => "recovery_complete",
            SweepEvent::RecoveryExhausted(_) => "recovery_exhausted",
            SweepEvent::StatusChange { .. } => "status_change",
            SweepEvent::HardwareAcquired { .. } => "hardware_acquired",
            SweepEvent::HardwareRejected { .. } => "hardware_rejected",
            SweepEvent::HardwareReleased { .. } => "hardware_released",
        }
    }

    /// Spectrum frames supersede each other and are rate limited per consumer
    pub fn is_high_frequency(&self) -> bool {
        matches!(self, SweepEvent::SpectrumData(_))
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        SweepEvent::Error(ErrorPayload {
            message: message.into(),
            code,
            timestamp: Utc::now(),
        })
    }

    pub fn status_change(status: impl Into<String>, message: Option<String>) -> Self {
        SweepEvent::StatusChange {
            status: status.into(),
            message,
            timestamp: Utc::now(),
        }
    }
}
