use crate::chip::Chip;
use crate::pin::PinId;
use thiserror::Error;

/// Errors that can occur while talking to a bridge, a sensor or the sampler.
///
/// A failed read is always reported through one of these variants; no
/// operation in this crate turns a failure into a zero reading.
#[derive(Error, Debug)]
pub enum Error {
    /// I2C transfer failed on the bridge.
    #[error("I2C transfer failed at address 0x{address:02X}, register 0x{register:02X}: {message}")]
    I2c {
        /// 7-bit slave address of the transfer.
        address: u8,
        /// Register pointer of the transfer.
        register: u8,
        /// Bridge-specific failure detail.
        message: String,
    },
    /// General I/O error from the bridge transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The bridge cannot perform the requested operation on this pin.
    #[error("Pin {pin} not supported: {message}")]
    UnsupportedPin {
        /// The pin that was addressed.
        pin: PinId,
        /// Why the operation was refused.
        message: String,
    },
    /// A derived quantity was requested before calibration was written.
    #[error("{chip} channel {channel} is not calibrated; call initialize() first")]
    NotCalibrated {
        /// Chip family of the device.
        chip: Chip,
        /// Channel that was read.
        channel: u8,
    },
    /// Requested range level is not registered with the auto-ranger.
    #[error("Range level {level} is not registered ({available} levels available)")]
    InvalidRangeLevel {
        /// The requested level index.
        level: usize,
        /// Number of registered levels.
        available: usize,
    },
    /// Range table, device settings or sampling request are inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Instrument configuration file could not be parsed.
    #[error("Failed to parse instrument configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// Select pins did not read back the code that was written.
    #[error(
        "Range switch to level {level} unconfirmed: wrote select code 0b{expected:b}, read back 0b{actual:b}"
    )]
    RangeSwitchUnconfirmed {
        /// Level the ranger switched to.
        level: usize,
        /// Select code that was written.
        expected: u32,
        /// Select code that was read back.
        actual: u32,
    },
    /// The chip family has no register for the requested operation.
    #[error("Feature not supported by this chip: {0}")]
    UnsupportedFeature(String),
    /// Function argument is outside the valid range.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// Identity registers do not belong to the expected chip vendor.
    #[error("Unexpected device: expected manufacturer ID 0x{expected:04X}, read 0x{actual:04X}")]
    UnexpectedDevice {
        /// Manufacturer ID the chip should report.
        expected: u16,
        /// Manufacturer ID actually read.
        actual: u16,
    },
    /// The sampling worker is gone; the handle can no longer reach it.
    #[error("Sampler is not running")]
    SamplerStopped,
    /// A running sampler did not answer within the allotted time.
    #[error("Timeout waiting for the sampler")]
    Timeout,
}

/// Flat classification of [`Error`], used when logging failed samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Bus,
    UnsupportedPin,
    NotCalibrated,
    InvalidRangeLevel,
    Configuration,
    RangeSwitchUnconfirmed,
    UnsupportedFeature,
    ArgumentOutOfRange,
    UnexpectedDevice,
    SamplerStopped,
    Timeout,
}

impl Error {
    /// Returns the flat kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::I2c { .. } | Error::Io(_) => ErrorKind::Bus,
            Error::UnsupportedPin { .. } => ErrorKind::UnsupportedPin,
            Error::NotCalibrated { .. } => ErrorKind::NotCalibrated,
            Error::InvalidRangeLevel { .. } => ErrorKind::InvalidRangeLevel,
            Error::Configuration(_) | Error::ConfigParse(_) => ErrorKind::Configuration,
            Error::RangeSwitchUnconfirmed { .. } => ErrorKind::RangeSwitchUnconfirmed,
            Error::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            Error::ArgumentOutOfRange(_) => ErrorKind::ArgumentOutOfRange,
            Error::UnexpectedDevice { .. } => ErrorKind::UnexpectedDevice,
            Error::SamplerStopped => ErrorKind::SamplerStopped,
            Error::Timeout => ErrorKind::Timeout,
        }
    }

    /// True for errors caused by bad settings rather than by the hardware.
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

/// Result type alias for instrumentation operations.
pub type Result<T> = std::result::Result<T, Error>;

// Helpers for the errors raised from several modules
pub(crate) fn input_only_pin(pin: PinId) -> Error {
    Error::UnsupportedPin {
        pin,
        message: "status pins are input-only".to_string(),
    }
}
pub(crate) fn pin_not_output(pin: PinId) -> Error {
    Error::UnsupportedPin {
        pin,
        message: "pin is configured as input; set it to output first".to_string(),
    }
}
pub(crate) fn unsupported_measurement(chip: Chip, what: &str) -> Error {
    Error::UnsupportedFeature(format!("{} has no {} register", chip, what))
}
pub(crate) fn invalid_channel(chip: Chip, channel: u8) -> Error {
    Error::ArgumentOutOfRange(format!(
        "{} has channels 1..={}, got {}",
        chip,
        chip.constants().channels,
        channel
    ))
}
