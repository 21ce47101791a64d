//! Sweep binary argument construction

use shared::FrequencyRange;
use std::path::PathBuf;

/// Above this centre frequency the high-band gain profile is used
pub const HIGH_BAND_THRESHOLD_MHZ: f64 = 5000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainProfile {
    pub vga: u32,
    pub lna: u32,
}

impl GainProfile {
    pub fn for_range(range: &FrequencyRange) -> Self {
        if range.center_mhz() > HIGH_BAND_THRESHOLD_MHZ {
            Self { vga: 30, lna: 40 }
        } else {
            Self { vga: 20, lna: 32 }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepCommandConfig {
    pub binary: PathBuf,
    /// Pins the sweep to one board when several are attached
    pub device_serial: Option<String>,
    pub bin_width_hz: u32,
    pub extra_args: Vec<String>,
}

impl Default for SweepCommandConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("hackrf_sweep"),
            device_serial: None,
            bin_width_hz: 20_000,
            extra_args: Vec::new(),
        }
    }
}

impl SweepCommandConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    /// Configure the device serial (fluent API)
    pub fn with_device_serial(mut self, serial: Option<String>) -> Self {
        self.device_serial = serial.filter(|s| !s.trim().is_empty());
        self
    }

    /// Configure the FFT bin width (fluent API)
    pub fn with_bin_width(mut self, bin_width_hz: u32) -> Self {
        self.bin_width_hz = bin_width_hz;
        self
    }

    /// Append extra arguments after the generated ones (fluent API)
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// File name used when sweeping for orphaned copies of the binary
    pub fn binary_name(&self) -> Option<String> {
        self.binary.file_name().map(|name| name.to_string_lossy().into_owned())
    }

    pub fn build_args(&self, range: &FrequencyRange) -> Vec<String> {
        let gains = GainProfile::for_range(range);
        let mut args = vec![
            "-f".to_string(),
            format!("{}:{}", range.start_mhz.floor() as i64, range.end_mhz.ceil() as i64),
            "-g".to_string(),
            gains.vga.to_string(),
            "-l".to_string(),
            gains.lna.to_string(),
            "-w".to_string(),
            self.bin_width_hz.to_string(),
            "-n".to_string(),
        ];
        if let Some(serial) = &self.device_serial {
            args.push("-d".to_string());
            args.push(serial.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}
