//! Core data types shared across the sweep supervision system

use crate::errors::{SharedError, SharedResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest frequency the sweep hardware can tune to
pub const MIN_FREQUENCY_MHZ: f64 = 1.0;
/// Highest frequency the sweep hardware can tune to
pub const MAX_FREQUENCY_MHZ: f64 = 7250.0;
/// Half-width of the sweep window built around a centre frequency
pub const SWEEP_HALF_WIDTH_MHZ: f64 = 10.0;

/// Unit a centre frequency is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FrequencyUnit {
    #[serde(rename = "Hz")]
    Hz,
    #[serde(rename = "kHz")]
    KHz,
    #[default]
    #[serde(rename = "MHz")]
    MHz,
    #[serde(rename = "GHz")]
    GHz,
}

impl FrequencyUnit {
    /// Convert a value in this unit to MHz
    pub fn to_mhz(self, value: f64) -> f64 {
        match self {
            FrequencyUnit::Hz => value / 1_000_000.0,
            FrequencyUnit::KHz => value / 1_000.0,
            FrequencyUnit::MHz => value,
            FrequencyUnit::GHz => value * 1_000.0,
        }
    }
}

impl FromStr for FrequencyUnit {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hz" => Ok(FrequencyUnit::Hz),
            "khz" => Ok(FrequencyUnit::KHz),
            "mhz" => Ok(FrequencyUnit::MHz),
            "ghz" => Ok(FrequencyUnit::GHz),
            _ => Err(SharedError::UnknownUnit { unit: s.to_string() }),
        }
    }
}

/// A contiguous band handed to the sweep binary, always in MHz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub start_mhz: f64,
    pub end_mhz: f64,
}

impl FrequencyRange {
    /// Build a validated range from explicit bounds
    pub fn new(start_mhz: f64, end_mhz: f64) -> SharedResult<Self> {
        if !start_mhz.is_finite() || !end_mhz.is_finite() || start_mhz >= end_mhz {
            return Err(SharedError::InvalidFrequency { value: start_mhz });
        }
        if start_mhz < MIN_FREQUENCY_MHZ || end_mhz > MAX_FREQUENCY_MHZ {
            return Err(SharedError::FrequencyOutOfRange {
                start_mhz,
                end_mhz,
                min_mhz: MIN_FREQUENCY_MHZ,
                max_mhz: MAX_FREQUENCY_MHZ,
            });
        }
        Ok(Self { start_mhz, end_mhz })
    }

    /// Expand a centre frequency into the standard ±10 MHz sweep window.
    ///
    /// Bounds are rounded outwards to whole MHz because the sweep binary only
    /// accepts integer band edges.
    pub fn from_center(value: f64, unit: FrequencyUnit) -> SharedResult<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(SharedError::InvalidFrequency { value });
        }
        let center = unit.to_mhz(value);
        let start = (center - SWEEP_HALF_WIDTH_MHZ).floor();
        let end = (center + SWEEP_HALF_WIDTH_MHZ).ceil();
        Self::new(start, end)
    }

    pub fn center_mhz(&self) -> f64 {
        (self.start_mhz + self.end_mhz) / 2.0
    }
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} MHz", self.start_mhz, self.end_mhz)
    }
}

/// Snapshot of the sweep subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessState {
    pub running: bool,
    pub pid: Option<u32>,
    pub process_group_id: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
}

impl ProcessState {
    pub fn stopped() -> Self {
        Self::default()
    }
}

/// Snapshot of the frequency cycler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleState {
    pub current_frequency: Option<FrequencyRange>,
    pub index: usize,
    pub in_transition: bool,
    pub is_cycling: bool,
}

/// Recovery bookkeeping kept for the whole supervision lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStatus {
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub is_recovering: bool,
    pub device_status: DeviceStatus,
    /// Failures seen in the trailing minute
    pub recent_failures: u32,
}

/// Condition of the sweep hardware, inferred from the errors it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Available,
    Busy,
    Stuck,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessHealth {
    Healthy,
    Unhealthy,
}

/// Where the sweep process is in its life, as seen by the health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartupPhase {
    #[default]
    Idle,
    /// Spawned, no datum seen yet
    Starting,
    /// At least one datum received
    Streaming,
    Recovering,
}

/// Derived each health tick, never mutated independently
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub process_health: Option<ProcessHealth>,
    pub last_data_received_at: Option<DateTime<Utc>>,
    pub process_startup_phase: StartupPhase,
}

/// Scarce physical devices guarded by the resource arbiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareDevice {
    HackRf,
    Alfa,
    Bluetooth,
}

impl HardwareDevice {
    pub const ALL: [HardwareDevice; 3] = [HardwareDevice::HackRf, HardwareDevice::Alfa, HardwareDevice::Bluetooth];

    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareDevice::HackRf => "hackrf",
            HardwareDevice::Alfa => "alfa",
            HardwareDevice::Bluetooth => "bluetooth",
        }
    }
}

impl fmt::Display for HardwareDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HardwareDevice {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hackrf" => Ok(HardwareDevice::HackRf),
            "alfa" => Ok(HardwareDevice::Alfa),
            "bluetooth" => Ok(HardwareDevice::Bluetooth),
            _ => Err(SharedError::UnknownDevice { name: s.to_string() }),
        }
    }
}

/// Ownership record for one device. Persists with `owner: None` after release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLock {
    pub device_id: HardwareDevice,
    pub owner: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
}

impl ResourceLock {
    pub fn unowned(device_id: HardwareDevice) -> Self {
        Self {
            device_id,
            owner: None,
            acquired_at: None,
        }
    }
}
