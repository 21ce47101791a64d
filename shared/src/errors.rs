//! Shared error types for the sweep supervision system

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SharedError {
    #[error("Frequency window {start_mhz}-{end_mhz} MHz outside supported range ({min_mhz}-{max_mhz} MHz)")]
    FrequencyOutOfRange {
        start_mhz: f64,
        end_mhz: f64,
        min_mhz: f64,
        max_mhz: f64,
    },

    #[error("Invalid frequency value: {value}")]
    InvalidFrequency { value: f64 },

    #[error("Unknown frequency unit: {unit}")]
    UnknownUnit { unit: String },

    #[error("Unknown hardware device: {name}")]
    UnknownDevice { name: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
