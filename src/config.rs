//! TOML instrument configuration.
//!
//! One document describes the sensor, the optional auto-ranging front end
//! and the sampling cadence:
//!
//! ```toml
//! [device]
//! chip = "ina3221"
//! address = 0x40
//! shunt_resistances = [0.1, 10.0, 1000.0]
//! max_expected_current_a = 1.64
//!
//! [auto_range]
//! select_pins = ["gpio0", "gpio1"]
//! voltage_channel = 1
//!
//! [[auto_range.levels]]
//! description = "8.192 mA ~ 1.64 A"
//! lower_a = 8.192e-3
//! upper_a = 1.64
//! select = 0b00
//! channels = [1, 2, 3]
//!
//! [[auto_range.levels]]
//! description = "81.920 µA ~ 16.302 mA"
//! lower_a = 81.92e-6
//! upper_a = 16.302e-3
//! select = 0b10
//! channels = [2, 3]
//!
//! [sampling]
//! interval_ms = 100
//! ```
//!
//! Every section except `[device]` is optional; missing fields take the
//! defaults documented on each struct.

use crate::autorange::{ParallelSum, RangeLevel, RangeTable};
use crate::chip::{Chip, ShuntRange};
use crate::consts::DEFAULT_I2C_ADDRESS;
use crate::device::DeviceSettings;
use crate::error::{Error, Result};
use crate::pin::PinId;
use crate::sampler::{SamplingRequest, SchedulerConfig, DEFAULT_LOG_CAPACITY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub auto_range: Option<AutoRangeConfig>,
    #[serde(default)]
    pub sampling: SamplingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub chip: Chip,
    /// 7-bit I2C address (default 0x40)
    #[serde(default = "default_address")]
    pub address: u8,
    /// One value for every channel, or one per channel
    pub shunt_resistances: Vec<f64>,
    pub max_expected_current_a: f64,
    #[serde(default)]
    pub shunt_range: ShuntRange,
    /// INA228 SHUNT_TEMPCO in ppm/°C
    #[serde(default)]
    pub temperature_coefficient_ppm: Option<u16>,
    /// Raw configuration word replacing the chip default (INA219, INA3221)
    #[serde(default)]
    pub config: Option<u16>,
    /// INA219 bus voltage range, 16 or 32 V
    #[serde(default)]
    pub bus_voltage_range_v: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoRangeConfig {
    /// Bit `i` of a level's `select` code drives `select_pins[i]`
    pub select_pins: Vec<PinId>,
    /// Channel whose bus voltage is reported (default: first channel of level 0)
    #[serde(default)]
    pub voltage_channel: Option<u8>,
    /// Coarsest first
    pub levels: Vec<LevelConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    #[serde(default)]
    pub description: String,
    pub lower_a: f64,
    pub upper_a: f64,
    pub select: u32,
    /// Channels summed at this level
    pub channels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Bounded run length; continuous when absent
    #[serde(default)]
    pub duration_s: Option<f64>,
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            duration_s: None,
            log_capacity: default_log_capacity(),
            poll_ms: default_poll_ms(),
            progress_every: default_progress_every(),
        }
    }
}

fn default_address() -> u8 {
    DEFAULT_I2C_ADDRESS
}

fn default_interval_ms() -> u64 {
    100
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_poll_ms() -> u64 {
    50
}

fn default_progress_every() -> u64 {
    100
}

impl InstrumentConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks everything that can be checked without hardware.
    pub fn validate(&self) -> Result<()> {
        let chip = self.device.chip;
        let settings = self.device_settings();
        let channels = chip.constants().channels as usize;
        let n = settings.shunt_resistances.len();
        if n != 1 && n != channels {
            return Err(Error::Configuration(format!(
                "[device] {} needs 1 or {} shunt resistances, got {}",
                chip, channels, n
            )));
        }
        settings.validate(chip)?;
        if self.device.address > 0x7F {
            return Err(Error::Configuration(format!(
                "[device] address 0x{:02X} is not a 7-bit I2C address",
                self.device.address
            )));
        }
        for ch in chip.channels() {
            chip.compute_calibration(
                settings.shunt_for(ch).unwrap_or(0.0),
                settings.max_expected_current_a,
                settings.shunt_range,
            )?;
        }

        if let Some(auto) = &self.auto_range {
            self.range_table()?;
            for level in &auto.levels {
                if let Some(&ch) = level.channels.iter().find(|&&ch| !chip.has_channel(ch)) {
                    return Err(Error::Configuration(format!(
                        "[auto_range] level '{}' reads channel {}, which {} does not have",
                        level.description, ch, chip
                    )));
                }
            }
            if let Some(ch) = auto.voltage_channel {
                if !chip.has_channel(ch) {
                    return Err(Error::Configuration(format!(
                        "[auto_range] voltage channel {} does not exist on {}",
                        ch, chip
                    )));
                }
            }
        }

        self.scheduler_config().validate()?;
        let s = &self.sampling;
        if s.interval_ms == 0 {
            return Err(Error::Configuration("[sampling] interval_ms must be positive".to_string()));
        }
        self.sampling_request()?;
        Ok(())
    }

    pub fn device_settings(&self) -> DeviceSettings {
        let d = &self.device;
        DeviceSettings {
            shunt_resistances: d.shunt_resistances.clone(),
            max_expected_current_a: d.max_expected_current_a,
            shunt_range: d.shunt_range,
            temperature_coefficient_ppm: d.temperature_coefficient_ppm,
            config: d.config,
            bus_voltage_range_v: d.bus_voltage_range_v,
        }
    }

    /// Builds the range table; `Configuration` error if `[auto_range]` is missing.
    pub fn range_table(&self) -> Result<RangeTable> {
        let auto = self
            .auto_range
            .as_ref()
            .ok_or_else(|| Error::Configuration("no [auto_range] section".to_string()))?;
        let levels = auto
            .levels
            .iter()
            .map(|l| {
                RangeLevel::new(
                    l.description.clone(),
                    l.lower_a,
                    l.upper_a,
                    l.select,
                    ParallelSum::new(l.channels.clone()),
                )
            })
            .collect();
        RangeTable::new(auto.select_pins.clone(), levels)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            log_capacity: self.sampling.log_capacity,
            poll_interval: Duration::from_millis(self.sampling.poll_ms),
            progress_every: self.sampling.progress_every,
        }
    }

    /// Bounded if `duration_s` is set, continuous otherwise.
    pub fn sampling_request(&self) -> Result<SamplingRequest> {
        let interval = Duration::from_millis(self.sampling.interval_ms);
        match self.sampling.duration_s {
            Some(d) => {
                let duration = Duration::try_from_secs_f64(d)
                    .ok()
                    .filter(|d| !d.is_zero())
                    .ok_or_else(|| {
                        Error::Configuration(format!(
                            "[sampling] duration_s must be a positive number of seconds, got {}",
                            d
                        ))
                    })?;
                Ok(SamplingRequest::bounded(duration, interval))
            }
            None => Ok(SamplingRequest::continuous(interval)),
        }
    }
}
