//! Supervisor-specific error types

use crate::core::timeout::TimeoutError;
use shared::{ErrorCode, HardwareDevice, SharedError};
use thiserror::Error;

/// Why a spawn attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnFailureKind {
    BinaryMissing,
    PermissionDenied,
    Other,
}

impl SpawnFailureKind {
    pub fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => SpawnFailureKind::BinaryMissing,
            std::io::ErrorKind::PermissionDenied => SpawnFailureKind::PermissionDenied,
            _ => SpawnFailureKind::Other,
        }
    }
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Sweep process already running (pid {pid:?})")]
    AlreadyRunning { pid: Option<u32> },

    #[error("Failed to spawn sweep process ({kind:?}): {message}")]
    SpawnFailed { kind: SpawnFailureKind, message: String },

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("No frequencies configured")]
    NoFrequencies,

    #[error("Device {device} is owned by {owner}")]
    ResourceConflict { device: HardwareDevice, owner: String },

    #[error("Device {device} failed verification: {reason}")]
    VerificationFailed { device: HardwareDevice, reason: String },

    #[error("Recovery exhausted after {attempts} attempts")]
    RecoveryExhausted { attempts: u32 },

    #[error("Supervision is not active")]
    NotSupervising,

    #[error("Signal delivery to {pid} failed: {errno}")]
    Signal { pid: i32, errno: nix::errno::Errno },

    #[error("Process {pid} survived SIGKILL")]
    KillUnconfirmed { pid: u32 },

    #[error("Host probe `{command}` failed: {message}")]
    Probe { command: String, message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn spawn(kind: SpawnFailureKind, message: impl Into<String>) -> Self {
        SupervisorError::SpawnFailed {
            kind,
            message: message.into(),
        }
    }

    pub fn config(field: &str, value: impl ToString) -> Self {
        SupervisorError::InvalidConfig {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Errors that no amount of retrying will fix
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SupervisorError::SpawnFailed {
                kind: SpawnFailureKind::BinaryMissing | SpawnFailureKind::PermissionDenied,
                ..
            } | SupervisorError::InvalidConfig { .. }
                | SupervisorError::NoFrequencies
        )
    }

    /// Code reported to stream consumers
    pub fn code(&self) -> ErrorCode {
        match self {
            SupervisorError::SpawnFailed { .. } | SupervisorError::AlreadyRunning { .. } => ErrorCode::SpawnFailed,
            SupervisorError::ResourceConflict { .. } | SupervisorError::VerificationFailed { .. } => {
                ErrorCode::HardwareConflict
            }
            SupervisorError::RecoveryExhausted { .. } => ErrorCode::RecoveryExhausted,
            _ => ErrorCode::RecoveryFailed,
        }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
