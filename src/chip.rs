//! Chip families, their constant tables and the calibration math.
//!
//! A [`Chip`] is a closed set of families. Everything that differs between
//! families (channel count, ADC width, calibration register semantics,
//! register layout of each measurement) is looked up from a
//! [`ChipConstants`] table or from [`Chip::field`], so the device code
//! itself has no per-family branches beyond a few quirks.

use crate::consts::{ina219, ina228, ina3221, TI_MANUFACTURER_ID};
use crate::error::{Error, Result};
use crate::register::{RawField, Register, RegisterWidth};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Supported INA-family shunt monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chip {
    Ina219,
    Ina228,
    Ina3221,
}

impl fmt::Display for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constants().name)
    }
}

/// How the calibration register relates the current LSB to the shunt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationFormula {
    /// `cal = floor(k / (current_lsb * shunt))` (the register divides).
    Inverse { k: f64 },
    /// `cal = floor(k * current_lsb * shunt * range_scale)` (the register multiplies).
    Proportional { k: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationModel {
    pub register: u8,
    pub formula: CalibrationFormula,
    /// Largest value the calibration register accepts.
    pub max_value: u32,
}

/// Static description of a chip family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChipConstants {
    pub name: &'static str,
    pub channels: u8,
    /// Signed width of the current result; `current_lsb = max / 2^(adc_bits - 1)`.
    pub adc_bits: u32,
    /// `None` when the chip has no calibration register.
    pub calibration: Option<CalibrationModel>,
    /// `power_lsb = factor * current_lsb`; `None` when power is computed on the host.
    pub power_lsb_factor: Option<f64>,
    /// `energy_lsb = factor * power_lsb`; `None` without an energy accumulator.
    pub energy_lsb_factor: Option<f64>,
    pub config_register: u8,
    pub reset_bits: u16,
    pub reset_delay: Duration,
    pub manufacturer_id_register: Option<u8>,
    pub device_id_register: Option<u8>,
    pub device_id: u16,
    pub device_id_mask: u16,
}

static INA219: ChipConstants = ChipConstants {
    name: "INA219",
    channels: 1,
    adc_bits: 16,
    calibration: Some(CalibrationModel {
        register: ina219::REG_CALIBRATION,
        formula: CalibrationFormula::Inverse {
            k: ina219::CALIBRATION_K,
        },
        max_value: ina219::CALIBRATION_MAX,
    }),
    power_lsb_factor: Some(ina219::POWER_LSB_FACTOR),
    energy_lsb_factor: None,
    config_register: ina219::REG_CONFIG,
    reset_bits: ina219::CONFIG_RESET,
    reset_delay: Duration::from_millis(ina219::RESET_DELAY_MS),
    manufacturer_id_register: None,
    device_id_register: None,
    device_id: 0,
    device_id_mask: 0,
};

static INA228: ChipConstants = ChipConstants {
    name: "INA228",
    channels: 1,
    adc_bits: 20,
    calibration: Some(CalibrationModel {
        register: ina228::REG_SHUNT_CAL,
        formula: CalibrationFormula::Proportional {
            k: ina228::CALIBRATION_K,
        },
        max_value: ina228::CALIBRATION_MAX,
    }),
    power_lsb_factor: Some(ina228::POWER_LSB_FACTOR),
    energy_lsb_factor: Some(ina228::ENERGY_LSB_FACTOR),
    config_register: ina228::REG_CONFIG,
    reset_bits: ina228::CONFIG_RESET,
    reset_delay: Duration::from_millis(ina228::RESET_DELAY_MS),
    manufacturer_id_register: Some(ina228::REG_MANUFACTURER_ID),
    device_id_register: Some(ina228::REG_DEVICE_ID),
    device_id: ina228::DEVICE_ID,
    device_id_mask: ina228::DEVICE_ID_MASK,
};

static INA3221: ChipConstants = ChipConstants {
    name: "INA3221",
    channels: 3,
    adc_bits: 13,
    calibration: None,
    power_lsb_factor: None,
    energy_lsb_factor: None,
    config_register: ina3221::REG_CONFIG,
    reset_bits: ina3221::CONFIG_RESET,
    reset_delay: Duration::from_millis(ina3221::RESET_DELAY_MS),
    manufacturer_id_register: Some(ina3221::REG_MANUFACTURER_ID),
    device_id_register: Some(ina3221::REG_DIE_ID),
    device_id: ina3221::DIE_ID,
    device_id_mask: 0xFFFF,
};

/// Full-scale shunt range of chips with a selectable ADC range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuntRange {
    /// ±163.84 mV on the INA228.
    Standard,
    /// ±40.96 mV on the INA228; four times finer shunt resolution.
    #[default]
    Narrow,
}

/// Quantities a device can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    ShuntVoltage,
    BusVoltage,
    Current,
    Power,
    Energy,
    Charge,
    Temperature,
}

impl MeasurementKind {
    /// Quantities that depend on the calibration.
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            MeasurementKind::Current
                | MeasurementKind::Power
                | MeasurementKind::Energy
                | MeasurementKind::Charge
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            MeasurementKind::ShuntVoltage => "shunt voltage",
            MeasurementKind::BusVoltage => "bus voltage",
            MeasurementKind::Current => "current",
            MeasurementKind::Power => "power",
            MeasurementKind::Energy => "energy",
            MeasurementKind::Charge => "charge",
            MeasurementKind::Temperature => "temperature",
        }
    }
}

/// How raw counts of a field become engineering units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    /// Fixed datasheet LSB.
    Fixed(f64),
    CurrentLsb,
    PowerLsb,
    EnergyLsb,
}

/// Register, field layout and scale of one measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMap {
    pub register: Register,
    pub field: RawField,
    pub scale: Scale,
}

const fn map(address: u8, width: RegisterWidth, field: RawField, scale: Scale) -> FieldMap {
    FieldMap {
        register: Register::new(address, width),
        field,
        scale,
    }
}

impl Chip {
    pub fn constants(self) -> &'static ChipConstants {
        match self {
            Chip::Ina219 => &INA219,
            Chip::Ina228 => &INA228,
            Chip::Ina3221 => &INA3221,
        }
    }

    /// Returns true if `channel` (1-based) exists on this chip.
    #[inline]
    pub fn has_channel(self, channel: u8) -> bool {
        channel >= 1 && channel <= self.constants().channels
    }

    /// Channels of the chip, 1-based.
    pub fn channels(self) -> Vec<u8> {
        (1..=self.constants().channels).collect()
    }

    /// Checks an identity register value against the vendor ID.
    pub fn check_manufacturer_id(self, value: u16) -> Result<()> {
        if value != TI_MANUFACTURER_ID {
            return Err(Error::UnexpectedDevice {
                expected: TI_MANUFACTURER_ID,
                actual: value,
            });
        }
        Ok(())
    }

    /// Returns true if `value` is a device ID of this family.
    pub fn device_id_matches(self, value: u16) -> bool {
        let c = self.constants();
        (value & c.device_id_mask) == c.device_id
    }

    /// Configuration word written after reset.
    pub fn default_config(self, range: ShuntRange) -> u16 {
        match self {
            Chip::Ina219 => ina219::DEFAULT_CONFIG,
            Chip::Ina228 => match range {
                ShuntRange::Standard => 0,
                ShuntRange::Narrow => ina228::CONFIG_ADC_RANGE_NARROW,
            },
            Chip::Ina3221 => ina3221::DEFAULT_CONFIG,
        }
    }

    /// Layout of `kind` on `channel`, or `None` if the chip lacks it.
    ///
    /// `channel` must already be validated. INA3221 current reuses the shunt
    /// voltage field with a per-channel LSB of `40 µV / shunt`.
    pub fn field(self, kind: MeasurementKind, channel: u8, range: ShuntRange) -> Option<FieldMap> {
        use MeasurementKind::*;
        use RegisterWidth::*;
        match self {
            Chip::Ina219 => match kind {
                ShuntVoltage => Some(map(
                    ina219::REG_SHUNT_VOLTAGE,
                    Bits16,
                    RawField::signed(0, 16),
                    Scale::Fixed(ina219::SHUNT_LSB_V),
                )),
                BusVoltage => Some(map(
                    ina219::REG_BUS_VOLTAGE,
                    Bits16,
                    RawField::unsigned(3, 13),
                    Scale::Fixed(ina219::BUS_LSB_V),
                )),
                Current => Some(map(
                    ina219::REG_CURRENT,
                    Bits16,
                    RawField::signed(0, 16),
                    Scale::CurrentLsb,
                )),
                Power => Some(map(
                    ina219::REG_POWER,
                    Bits16,
                    RawField::unsigned(0, 16),
                    Scale::PowerLsb,
                )),
                Energy | Charge | Temperature => None,
            },
            Chip::Ina228 => {
                let shift = ina228::RESULT_SHIFT;
                match kind {
                    ShuntVoltage => Some(map(
                        ina228::REG_VSHUNT,
                        Bits24,
                        RawField::signed(shift, 20),
                        Scale::Fixed(match range {
                            ShuntRange::Standard => ina228::SHUNT_LSB_STANDARD_V,
                            ShuntRange::Narrow => ina228::SHUNT_LSB_NARROW_V,
                        }),
                    )),
                    BusVoltage => Some(map(
                        ina228::REG_VBUS,
                        Bits24,
                        RawField::unsigned(shift, 20),
                        Scale::Fixed(ina228::BUS_LSB_V),
                    )),
                    Current => Some(map(
                        ina228::REG_CURRENT,
                        Bits24,
                        RawField::signed(shift, 20),
                        Scale::CurrentLsb,
                    )),
                    Power => Some(map(
                        ina228::REG_POWER,
                        Bits24,
                        RawField::unsigned(0, 24),
                        Scale::PowerLsb,
                    )),
                    Energy => Some(map(
                        ina228::REG_ENERGY,
                        Bits40,
                        RawField::unsigned(0, 40),
                        Scale::EnergyLsb,
                    )),
                    Charge => Some(map(
                        ina228::REG_CHARGE,
                        Bits40,
                        RawField::signed(0, 40),
                        Scale::CurrentLsb,
                    )),
                    Temperature => Some(map(
                        ina228::REG_DIETEMP,
                        Bits16,
                        RawField::signed(0, 16),
                        Scale::Fixed(ina228::TEMP_LSB_C),
                    )),
                }
            }
            Chip::Ina3221 => {
                let offset = 2 * (channel.saturating_sub(1));
                let shift = ina3221::RESULT_SHIFT;
                match kind {
                    ShuntVoltage => Some(map(
                        ina3221::REG_CH1_SHUNT_VOLTAGE + offset,
                        Bits16,
                        RawField::signed(shift, 13),
                        Scale::Fixed(ina3221::SHUNT_LSB_V),
                    )),
                    Current => Some(map(
                        ina3221::REG_CH1_SHUNT_VOLTAGE + offset,
                        Bits16,
                        RawField::signed(shift, 13),
                        Scale::CurrentLsb,
                    )),
                    BusVoltage => Some(map(
                        ina3221::REG_CH1_BUS_VOLTAGE + offset,
                        Bits16,
                        RawField::signed(shift, 13),
                        Scale::Fixed(ina3221::BUS_LSB_V),
                    )),
                    Power | Energy | Charge | Temperature => None,
                }
            }
        }
    }

    /// Derives all LSBs and the calibration register value for one channel.
    ///
    /// Fails with [`Error::Configuration`] on a non-positive or non-finite
    /// shunt resistance or maximum current.
    pub fn compute_calibration(
        self,
        shunt_resistance_ohm: f64,
        max_expected_current_a: f64,
        range: ShuntRange,
    ) -> Result<CalibrationParameters> {
        if !(shunt_resistance_ohm.is_finite() && shunt_resistance_ohm > 0.0) {
            return Err(Error::Configuration(format!(
                "shunt resistance must be positive, got {} Ω",
                shunt_resistance_ohm
            )));
        }
        if !(max_expected_current_a.is_finite() && max_expected_current_a > 0.0) {
            return Err(Error::Configuration(format!(
                "max expected current must be positive, got {} A",
                max_expected_current_a
            )));
        }

        let c = self.constants();
        let Some(model) = c.calibration else {
            // No calibration register: the shunt voltage LSB divided by the shunt is the current LSB.
            let current_lsb = ina3221::SHUNT_LSB_V / shunt_resistance_ohm;
            return Ok(CalibrationParameters {
                shunt_resistance_ohm,
                max_expected_current_a,
                current_lsb,
                power_lsb: None,
                energy_lsb: None,
                calibration_register_value: None,
                clamped: false,
            });
        };

        let max = model.max_value as f64;
        let mut current_lsb = max_expected_current_a / (1u64 << (c.adc_bits - 1)) as f64;
        let mut clamped = false;
        let cal = match model.formula {
            CalibrationFormula::Inverse { k } => {
                let raw = (k / (current_lsb * shunt_resistance_ohm)).floor();
                if raw > max {
                    clamped = true;
                    current_lsb = k / (max * shunt_resistance_ohm);
                    max
                } else if raw < 1.0 {
                    clamped = true;
                    current_lsb = k / shunt_resistance_ohm;
                    1.0
                } else {
                    raw
                }
            }
            CalibrationFormula::Proportional { k } => {
                let scale = match range {
                    ShuntRange::Standard => 1.0,
                    ShuntRange::Narrow => ina228::NARROW_RANGE_CAL_SCALE,
                };
                let raw = (k * current_lsb * shunt_resistance_ohm * scale).floor();
                if raw > max {
                    clamped = true;
                    current_lsb = max / (k * shunt_resistance_ohm * scale);
                    max
                } else if raw < 1.0 {
                    clamped = true;
                    current_lsb = 1.0 / (k * shunt_resistance_ohm * scale);
                    1.0
                } else {
                    raw
                }
            }
        };

        let power_lsb = c.power_lsb_factor.map(|f| f * current_lsb);
        let energy_lsb = match (c.energy_lsb_factor, power_lsb) {
            (Some(f), Some(p)) => Some(f * p),
            _ => None,
        };
        if clamped {
            warn!(
                "{}: calibration clamped to 0x{:04X}, current LSB re-derived as {:.3e} A",
                c.name, cal as u32, current_lsb
            );
        }
        Ok(CalibrationParameters {
            shunt_resistance_ohm,
            max_expected_current_a,
            current_lsb,
            power_lsb,
            energy_lsb,
            calibration_register_value: Some(cal as u32),
            clamped,
        })
    }
}

/// Calibration of one channel, derived from shunt and maximum current.
///
/// All LSBs are computed together from the final `current_lsb`, after any
/// clamping of the calibration register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationParameters {
    pub shunt_resistance_ohm: f64,
    pub max_expected_current_a: f64,
    /// Amperes per count.
    pub current_lsb: f64,
    /// Watts per count; `None` when power is computed on the host.
    pub power_lsb: Option<f64>,
    /// Joules per count; `None` without an energy accumulator.
    pub energy_lsb: Option<f64>,
    /// Value for the calibration register; `None` when the chip has none.
    pub calibration_register_value: Option<u32>,
    /// Set when the register value hit a limit and `current_lsb` was re-derived.
    pub clamped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ina219_reference_calibration() {
        let cal = Chip::Ina219
            .compute_calibration(0.1, 3.2, ShuntRange::Standard)
            .unwrap();
        assert_relative_eq!(cal.current_lsb, 97.65625e-6, max_relative = 1e-9);
        assert_eq!(cal.calibration_register_value, Some(4194));
        assert_relative_eq!(cal.power_lsb.unwrap(), 20.0 * 97.65625e-6, max_relative = 1e-9);
        assert!(!cal.clamped);
    }

    #[test]
    fn test_ina219_clamps_and_rederives() {
        // Tiny shunt and tiny current overflow the 0xFFFE register limit.
        let cal = Chip::Ina219
            .compute_calibration(0.001, 0.01, ShuntRange::Standard)
            .unwrap();
        assert!(cal.clamped);
        assert_eq!(cal.calibration_register_value, Some(0xFFFE));
        assert_relative_eq!(cal.current_lsb, 0.04096 / (0xFFFE as f64 * 0.001), max_relative = 1e-12);
        assert_relative_eq!(cal.power_lsb.unwrap(), 20.0 * cal.current_lsb, max_relative = 1e-12);
    }

    #[test]
    fn test_ina228_proportional_calibration() {
        let cal = Chip::Ina228
            .compute_calibration(1.0, 0.2, ShuntRange::Narrow)
            .unwrap();
        // 13107.2e6 * (0.2 / 2^19) * 1 Ω * 4 = 20000
        assert!(!cal.clamped);
        assert_eq!(cal.calibration_register_value, Some(20000));
        assert_relative_eq!(cal.current_lsb, 0.2 / 524288.0, max_relative = 1e-12);
        assert_relative_eq!(cal.energy_lsb.unwrap(), 16.0 * 3.2 * cal.current_lsb, max_relative = 1e-12);

        let cal = Chip::Ina228
            .compute_calibration(0.0123, 0.2, ShuntRange::Standard)
            .unwrap();
        assert_eq!(cal.calibration_register_value, Some(61));
    }

    #[test]
    fn test_ina228_clamps_and_rederives() {
        // 2 Ω in the narrow range needs 40000 > 0x7FFF.
        let cal = Chip::Ina228
            .compute_calibration(2.0, 0.2, ShuntRange::Narrow)
            .unwrap();
        assert!(cal.clamped);
        assert_eq!(cal.calibration_register_value, Some(0x7FFF));
        assert_relative_eq!(cal.current_lsb, 0x7FFF as f64 / (13107.2e6 * 2.0 * 4.0), max_relative = 1e-12);
        assert_relative_eq!(cal.power_lsb.unwrap(), 3.2 * cal.current_lsb, max_relative = 1e-12);
    }

    #[test]
    fn test_ina3221_has_no_register() {
        let cal = Chip::Ina3221
            .compute_calibration(10.0, 0.016, ShuntRange::Standard)
            .unwrap();
        assert_eq!(cal.calibration_register_value, None);
        assert_relative_eq!(cal.current_lsb, 4e-6, max_relative = 1e-12);
        assert!(cal.power_lsb.is_none());
    }

    #[test]
    fn test_rejects_bad_inputs() {
        for (r, i) in [(0.0, 1.0), (-1.0, 1.0), (0.1, 0.0), (f64::NAN, 1.0)] {
            let err = Chip::Ina219
                .compute_calibration(r, i, ShuntRange::Standard)
                .unwrap_err();
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn test_ina3221_channel_registers() {
        let f = Chip::Ina3221
            .field(MeasurementKind::BusVoltage, 3, ShuntRange::Standard)
            .unwrap();
        assert_eq!(f.register.address, 0x06);
        assert!(Chip::Ina3221
            .field(MeasurementKind::Energy, 1, ShuntRange::Standard)
            .is_none());
        assert!(Chip::Ina3221.has_channel(3));
        assert!(!Chip::Ina3221.has_channel(0));
    }
}
