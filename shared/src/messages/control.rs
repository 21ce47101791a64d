//! Operator control requests and arbitration replies

use crate::errors::SharedResult;
use crate::types::{FrequencyRange, FrequencyUnit, HardwareDevice};
use serde::{Deserialize, Serialize};

/// A centre frequency as typed by an operator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FrequencyRequest {
    pub value: f64,
    #[serde(default)]
    pub unit: FrequencyUnit,
}

impl FrequencyRequest {
    pub fn to_range(&self) -> SharedResult<FrequencyRange> {
        FrequencyRange::from_center(self.value, self.unit)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartSweepRequest {
    pub frequencies: Vec<FrequencyRequest>,
    /// Dwell per range, falls back to the configured default
    pub cycle_time_ms: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HardwareRequest {
    pub tool: String,
    pub device: HardwareDevice,
}

/// Operator override that frees a device whoever holds it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ForceReleaseRequest {
    pub device: HardwareDevice,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AcquireResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReleaseResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForceReleaseResponse {
    pub success: bool,
    pub previous_owner: Option<String>,
}
