//! Register-level sensor device over a [`BusPort`].

use crate::bus::BusPort;
use crate::chip::{CalibrationParameters, Chip, MeasurementKind, Scale, ShuntRange};
use crate::consts::{ina219, ina228, ina3221};
use crate::error::{invalid_channel, unsupported_measurement, Error, Result};
use crate::register::{decode_be, encode_be, RawField, RegisterWidth};
use log::{debug, info, trace, warn};
use std::thread;

/// Shunt and range settings applied by [`RegisterDevice::initialize`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    /// One resistance per channel, or a single value applied to every channel.
    pub shunt_resistances: Vec<f64>,
    pub max_expected_current_a: f64,
    pub shunt_range: ShuntRange,
    /// SHUNT_TEMPCO value in ppm/°C (INA228 only).
    pub temperature_coefficient_ppm: Option<u16>,
    /// Raw configuration word written instead of the chip default (INA219, INA3221).
    pub config: Option<u16>,
    /// INA219 bus voltage range in volts, 16 or 32. Applied on top of `config`.
    pub bus_voltage_range_v: Option<u8>,
}

impl DeviceSettings {
    pub fn new(shunt_resistance_ohm: f64, max_expected_current_a: f64) -> Self {
        Self {
            shunt_resistances: vec![shunt_resistance_ohm],
            max_expected_current_a,
            shunt_range: ShuntRange::default(),
            temperature_coefficient_ppm: None,
            config: None,
            bus_voltage_range_v: None,
        }
    }

    /// Per-channel shunts, e.g. the 0.1 Ω / 10 Ω / 1000 Ω ladder of an INA3221 board.
    pub fn with_shunts(shunt_resistances: &[f64], max_expected_current_a: f64) -> Self {
        Self {
            shunt_resistances: shunt_resistances.to_vec(),
            ..Self::new(0.0, max_expected_current_a)
        }
    }

    pub fn shunt_range(mut self, range: ShuntRange) -> Self {
        self.shunt_range = range;
        self
    }

    pub fn config(mut self, config: u16) -> Self {
        self.config = Some(config);
        self
    }

    pub fn bus_voltage_range(mut self, volts: u8) -> Self {
        self.bus_voltage_range_v = Some(volts);
        self
    }

    /// Configuration word `initialize` writes for `chip`.
    pub fn config_word(&self, chip: Chip) -> u16 {
        let mut config = self
            .config
            .unwrap_or_else(|| chip.default_config(self.shunt_range));
        match self.bus_voltage_range_v {
            Some(16) => config = (config & !ina219::CONFIG_BRNG_MASK) | ina219::CONFIG_BRNG_16V,
            Some(32) => config = (config & !ina219::CONFIG_BRNG_MASK) | ina219::CONFIG_BRNG_32V,
            _ => {}
        }
        config
    }

    /// Resistance of `channel` (1-based).
    pub fn shunt_for(&self, channel: u8) -> Option<f64> {
        match self.shunt_resistances.len() {
            0 => None,
            1 => self.shunt_resistances.first().copied(),
            _ => self
                .shunt_resistances
                .get(channel.checked_sub(1)? as usize)
                .copied(),
        }
    }

    pub(crate) fn validate(&self, chip: Chip) -> Result<()> {
        let n = self.shunt_resistances.len();
        let channels = chip.constants().channels as usize;
        if n != 1 && n != channels {
            return Err(Error::Configuration(format!(
                "{} needs 1 or {} shunt resistances, got {}",
                chip, channels, n
            )));
        }
        if let Some(config) = self.config {
            if chip == Chip::Ina228 {
                return Err(Error::Configuration(
                    "INA228 CONFIG follows the shunt range and cannot be overridden".to_string(),
                ));
            }
            if config & chip.constants().reset_bits != 0 {
                return Err(Error::Configuration(format!(
                    "config word 0x{:04X} has the reset bit set",
                    config
                )));
            }
        }
        if let Some(volts) = self.bus_voltage_range_v {
            if chip != Chip::Ina219 {
                return Err(Error::Configuration(format!(
                    "{} has no selectable bus voltage range",
                    chip
                )));
            }
            if volts != 16 && volts != 32 {
                return Err(Error::Configuration(format!(
                    "bus voltage range must be 16 or 32 V, got {} V",
                    volts
                )));
            }
        }
        Ok(())
    }
}

/// INA228 alert thresholds in engineering units. `None` leaves a limit untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertLimits {
    pub shunt_overvoltage_v: Option<f64>,
    pub shunt_undervoltage_v: Option<f64>,
    pub bus_overvoltage_v: Option<f64>,
    pub bus_undervoltage_v: Option<f64>,
    pub power_limit_w: Option<f64>,
    pub temperature_limit_c: Option<f64>,
}

/// Identity, configuration and calibration snapshot of a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub chip: Chip,
    pub address: u8,
    pub initialized: bool,
    pub manufacturer_id: Option<u16>,
    pub device_id: Option<u16>,
    pub config: u16,
    /// Index 0 is channel 1.
    pub calibration: Vec<Option<CalibrationParameters>>,
}

/// An INA-family sensor at one I2C address behind a bridge.
///
/// The device owns its bus. Derived quantities (current, power, energy,
/// charge) are only available after [`initialize`](Self::initialize) wrote the
/// calibration; before that they fail with [`Error::NotCalibrated`].
#[derive(Debug)]
pub struct RegisterDevice<B: BusPort> {
    bus: B,
    address: u8,
    chip: Chip,
    settings: DeviceSettings,
    calibration: Vec<Option<CalibrationParameters>>,
}

impl<B: BusPort> RegisterDevice<B> {
    /// Wraps a bus. Nothing is sent until [`initialize`](Self::initialize).
    pub fn new(bus: B, chip: Chip, address: u8) -> Self {
        Self {
            bus,
            address,
            chip,
            settings: DeviceSettings::new(0.1, 3.2),
            calibration: vec![None; chip.constants().channels as usize],
        }
    }

    pub fn chip(&self) -> Chip {
        self.chip
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    /// True once every channel has calibration parameters.
    pub fn is_initialized(&self) -> bool {
        self.calibration.iter().all(Option::is_some)
    }

    /// Calibration of `channel`, if written.
    pub fn calibration(&self, channel: u8) -> Option<&CalibrationParameters> {
        if !self.chip.has_channel(channel) {
            return None;
        }
        self.calibration[channel as usize - 1].as_ref()
    }

    /// Calibration math for this chip and the configured shunt range.
    pub fn compute_calibration(
        &self,
        shunt_resistance_ohm: f64,
        max_expected_current_a: f64,
    ) -> Result<CalibrationParameters> {
        self.chip.compute_calibration(
            shunt_resistance_ohm,
            max_expected_current_a,
            self.settings.shunt_range,
        )
    }

    // --- Register Access ---

    /// Reads a 2, 3 or 5 byte register, MSB first.
    pub fn read_register(&mut self, reg: u8, width: RegisterWidth) -> Result<u64> {
        let mut buf = [0u8; 5];
        let buf = &mut buf[..width.bytes()];
        self.bus.i2c_read_block(self.address, reg, buf)?;
        let value = decode_be(buf);
        trace!(
            "Read 0x{:02X} reg 0x{:02X} = 0x{:0w$X}",
            self.address,
            reg,
            value,
            w = width.bytes() * 2
        );
        Ok(value)
    }

    /// Writes a 2, 3 or 5 byte register, MSB first.
    pub fn write_register(&mut self, reg: u8, value: u64, width: RegisterWidth) -> Result<()> {
        let data = encode_be(value, width)?;
        trace!(
            "Write 0x{:02X} reg 0x{:02X} = 0x{:0w$X}",
            self.address,
            reg,
            value,
            w = width.bytes() * 2
        );
        self.bus.i2c_write_block(self.address, reg, &data)
    }

    fn read_u16(&mut self, reg: u8) -> Result<u16> {
        Ok(self.read_register(reg, RegisterWidth::Bits16)? as u16)
    }

    fn write_u16(&mut self, reg: u8, value: u16) -> Result<()> {
        self.write_register(reg, value as u64, RegisterWidth::Bits16)
    }

    // --- Lifecycle ---

    /// Identifies, resets, calibrates and configures the chip.
    ///
    /// All calibrations are computed before the first bus transfer, so bad
    /// settings fail with [`Error::Configuration`] without touching the chip.
    pub fn initialize(&mut self, settings: DeviceSettings) -> Result<()> {
        settings.validate(self.chip)?;
        let calibration = self.calibrate_all(&settings)?;
        let c = self.chip.constants();
        info!("Initializing {} at 0x{:02X}", c.name, self.address);

        if let Some(reg) = c.manufacturer_id_register {
            let id = self.read_u16(reg)?;
            self.chip.check_manufacturer_id(id)?;
        }
        if let Some(reg) = c.device_id_register {
            let id = self.read_u16(reg)?;
            if !self.chip.device_id_matches(id) {
                warn!(
                    "{} at 0x{:02X}: unexpected device ID 0x{:04X} (expected 0x{:04X})",
                    c.name, self.address, id, c.device_id
                );
            }
        }

        // Invalidate before reset: a failure below leaves the device uncalibrated.
        self.calibration.iter_mut().for_each(|cal| *cal = None);
        self.write_u16(c.config_register, c.reset_bits)?;
        thread::sleep(c.reset_delay);

        if let (Some(model), Some(first)) = (c.calibration, calibration.first()) {
            if let Some(value) = first.calibration_register_value {
                self.write_u16(model.register, value as u16)?;
            }
        }

        let config = settings.config_word(self.chip);
        if self.chip == Chip::Ina228 {
            if let Some(tempco) = settings.temperature_coefficient_ppm {
                self.write_u16(ina228::REG_SHUNT_TEMPCO, tempco)?;
            }
            self.write_u16(ina228::REG_CONFIG, config)?;
            self.write_u16(ina228::REG_ADC_CONFIG, ina228::DEFAULT_ADC_CONFIG)?;
            self.write_u16(ina228::REG_DIAG_ALRT, ina228::DIAG_ALRT_ALATCH)?;
            self.write_u16(ina228::REG_SOVL, ina228::DEFAULT_SOVL)?;
            self.write_u16(ina228::REG_BUVL, ina228::DEFAULT_BUVL)?;
        } else {
            self.write_u16(c.config_register, config)?;
        }

        let readback = self.read_u16(c.config_register)?;
        if readback != config {
            warn!(
                "{} at 0x{:02X}: config readback 0x{:04X} != written 0x{:04X}",
                c.name, self.address, readback, config
            );
        }

        for (slot, cal) in self.calibration.iter_mut().zip(calibration) {
            debug!(
                "{}: shunt {} Ω, current LSB {:.3e} A, cal {:?}",
                c.name, cal.shunt_resistance_ohm, cal.current_lsb, cal.calibration_register_value
            );
            *slot = Some(cal);
        }
        self.settings = settings;
        info!("{} at 0x{:02X} initialized", c.name, self.address);
        Ok(())
    }

    /// Changes the shunt of one channel and rewrites the calibration if initialized.
    pub fn set_shunt_resistance(&mut self, channel: u8, shunt_resistance_ohm: f64) -> Result<()> {
        if !self.chip.has_channel(channel) {
            return Err(invalid_channel(self.chip, channel));
        }
        let mut shunts: Vec<f64> = self
            .chip
            .channels()
            .into_iter()
            .map(|ch| self.settings.shunt_for(ch).unwrap_or(0.0))
            .collect();
        shunts[channel as usize - 1] = shunt_resistance_ohm;
        let mut settings = self.settings.clone();
        settings.shunt_resistances = shunts;
        self.recalibrate(settings)
    }

    /// Changes the maximum expected current and rewrites the calibration if initialized.
    pub fn set_max_expected_current(&mut self, max_expected_current_a: f64) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.max_expected_current_a = max_expected_current_a;
        self.recalibrate(settings)
    }

    fn calibrate_all(&self, settings: &DeviceSettings) -> Result<Vec<CalibrationParameters>> {
        self.chip
            .channels()
            .into_iter()
            .map(|ch| {
                self.chip.compute_calibration(
                    settings.shunt_for(ch).unwrap_or(0.0),
                    settings.max_expected_current_a,
                    settings.shunt_range,
                )
            })
            .collect()
    }

    fn recalibrate(&mut self, settings: DeviceSettings) -> Result<()> {
        let calibration = self.calibrate_all(&settings)?;
        if self.is_initialized() {
            if let (Some(model), Some(value)) = (
                self.chip.constants().calibration,
                calibration.first().and_then(|c| c.calibration_register_value),
            ) {
                self.write_u16(model.register, value as u16)?;
            }
            for (slot, cal) in self.calibration.iter_mut().zip(calibration) {
                *slot = Some(cal);
            }
        }
        self.settings = settings;
        Ok(())
    }

    // --- Measurements ---

    /// Reads one quantity of one channel (1-based) in SI units.
    ///
    /// Volts, amperes, watts, joules, coulombs and °C. Derived quantities fail
    /// with [`Error::NotCalibrated`] before initialization.
    pub fn read_measurement(&mut self, kind: MeasurementKind, channel: u8) -> Result<f64> {
        if !self.chip.has_channel(channel) {
            return Err(invalid_channel(self.chip, channel));
        }
        let cal = self.calibration[channel as usize - 1];
        if kind.is_derived() && cal.is_none() {
            return Err(Error::NotCalibrated {
                chip: self.chip,
                channel,
            });
        }

        let Some(map) = self.chip.field(kind, channel, self.settings.shunt_range) else {
            if kind == MeasurementKind::Power {
                // No power register: power is computed from bus voltage and current.
                let voltage = self.read_measurement(MeasurementKind::BusVoltage, channel)?;
                let current = self.read_measurement(MeasurementKind::Current, channel)?;
                return Ok(voltage * current);
            }
            return Err(unsupported_measurement(self.chip, kind.label()));
        };

        let raw = self.read_register(map.register.address, map.register.width)?;
        if self.chip == Chip::Ina219
            && kind == MeasurementKind::BusVoltage
            && raw & ina219::BUS_OVF as u64 != 0
        {
            warn!(
                "{} at 0x{:02X}: math overflow flag set; current and power are invalid",
                self.chip, self.address
            );
        }
        let counts = map.field.extract(raw);
        let lsb = match map.scale {
            Scale::Fixed(lsb) => Some(lsb),
            Scale::CurrentLsb => cal.map(|c| c.current_lsb),
            Scale::PowerLsb => cal.and_then(|c| c.power_lsb),
            Scale::EnergyLsb => cal.and_then(|c| c.energy_lsb),
        }
        .ok_or(Error::NotCalibrated {
            chip: self.chip,
            channel,
        })?;
        Ok(counts as f64 * lsb)
    }

    pub fn read_current(&mut self, channel: u8) -> Result<f64> {
        self.read_measurement(MeasurementKind::Current, channel)
    }

    /// Bus voltage of `channel`.
    pub fn read_voltage(&mut self, channel: u8) -> Result<f64> {
        self.read_measurement(MeasurementKind::BusVoltage, channel)
    }

    pub fn read_shunt_voltage(&mut self, channel: u8) -> Result<f64> {
        self.read_measurement(MeasurementKind::ShuntVoltage, channel)
    }

    pub fn read_power(&mut self, channel: u8) -> Result<f64> {
        self.read_measurement(MeasurementKind::Power, channel)
    }

    /// Current of every channel, in channel order.
    pub fn read_currents(&mut self) -> Result<Vec<f64>> {
        self.read_all(MeasurementKind::Current)
    }

    pub fn read_voltages(&mut self) -> Result<Vec<f64>> {
        self.read_all(MeasurementKind::BusVoltage)
    }

    pub fn read_powers(&mut self) -> Result<Vec<f64>> {
        self.read_all(MeasurementKind::Power)
    }

    fn read_all(&mut self, kind: MeasurementKind) -> Result<Vec<f64>> {
        self.chip
            .channels()
            .into_iter()
            .map(|ch| self.read_measurement(kind, ch))
            .collect()
    }

    pub fn read_temperature(&mut self) -> Result<f64> {
        self.read_measurement(MeasurementKind::Temperature, 1)
    }

    /// Accumulated energy since the last reset (INA228).
    pub fn read_energy(&mut self) -> Result<f64> {
        self.read_measurement(MeasurementKind::Energy, 1)
    }

    /// Accumulated charge since the last reset (INA228).
    pub fn read_charge(&mut self) -> Result<f64> {
        self.read_measurement(MeasurementKind::Charge, 1)
    }

    /// Clears the energy and charge accumulators (INA228 CONFIG.RESETACC).
    pub fn reset_accumulators(&mut self) -> Result<()> {
        if self.chip != Chip::Ina228 {
            return Err(unsupported_measurement(self.chip, "accumulator"));
        }
        let config = self.read_u16(ina228::REG_CONFIG)?;
        self.write_u16(ina228::REG_CONFIG, config | ina228::CONFIG_RESETACC)?;
        debug!("{} at 0x{:02X}: accumulators reset", self.chip, self.address);
        Ok(())
    }

    /// Programs INA228 alert thresholds.
    ///
    /// The power limit needs the calibration; every value must fit its
    /// 16-bit limit register or the call fails before any write.
    pub fn set_alert_limits(&mut self, limits: &AlertLimits) -> Result<()> {
        if self.chip != Chip::Ina228 {
            return Err(unsupported_measurement(self.chip, "alert limit"));
        }
        let shunt_lsb = match self.settings.shunt_range {
            ShuntRange::Standard => ina228::SHUNT_LIMIT_LSB_STANDARD_V,
            ShuntRange::Narrow => ina228::SHUNT_LIMIT_LSB_NARROW_V,
        };
        let mut writes: Vec<(u8, u16)> = Vec::new();
        if let Some(v) = limits.shunt_overvoltage_v {
            writes.push((ina228::REG_SOVL, signed_limit(v, shunt_lsb, "shunt over-voltage")?));
        }
        if let Some(v) = limits.shunt_undervoltage_v {
            writes.push((ina228::REG_SUVL, signed_limit(v, shunt_lsb, "shunt under-voltage")?));
        }
        if let Some(v) = limits.bus_overvoltage_v {
            writes.push((ina228::REG_BOVL, unsigned_limit(v, ina228::BUS_LIMIT_LSB_V, "bus over-voltage")?));
        }
        if let Some(v) = limits.bus_undervoltage_v {
            writes.push((ina228::REG_BUVL, unsigned_limit(v, ina228::BUS_LIMIT_LSB_V, "bus under-voltage")?));
        }
        if let Some(v) = limits.temperature_limit_c {
            writes.push((ina228::REG_TEMP_LIMIT, signed_limit(v, ina228::TEMP_LIMIT_LSB_C, "temperature")?));
        }
        if let Some(v) = limits.power_limit_w {
            let power_lsb = self
                .calibration(1)
                .and_then(|c| c.power_lsb)
                .ok_or(Error::NotCalibrated {
                    chip: self.chip,
                    channel: 1,
                })?;
            let lsb = power_lsb * ina228::POWER_LIMIT_FACTOR;
            writes.push((ina228::REG_PWR_LIMIT, unsigned_limit(v, lsb, "power")?));
        }
        for (reg, value) in writes {
            self.write_u16(reg, value)?;
        }
        Ok(())
    }

    /// Programs the INA3221 shunt voltage alert limits of one channel.
    ///
    /// `None` leaves a limit untouched. Both values are checked before any write.
    pub fn set_channel_alert_limits(
        &mut self,
        channel: u8,
        critical_v: Option<f64>,
        warning_v: Option<f64>,
    ) -> Result<()> {
        let offset = self.ina3221_limit_offset(channel)?;
        let critical = critical_v
            .map(|v| shunt_limit_ina3221(v, "critical"))
            .transpose()?;
        let warning = warning_v
            .map(|v| shunt_limit_ina3221(v, "warning"))
            .transpose()?;
        if let Some(value) = critical {
            self.write_u16(ina3221::REG_CH1_CRITICAL_ALERT_LIMIT + offset, value)?;
        }
        if let Some(value) = warning {
            self.write_u16(ina3221::REG_CH1_WARNING_ALERT_LIMIT + offset, value)?;
        }
        Ok(())
    }

    /// Critical and warning shunt voltage limits of one INA3221 channel, in volts.
    pub fn channel_alert_limits(&mut self, channel: u8) -> Result<(f64, f64)> {
        let offset = self.ina3221_limit_offset(channel)?;
        let field = RawField::signed(ina3221::RESULT_SHIFT, 13);
        let critical = self.read_u16(ina3221::REG_CH1_CRITICAL_ALERT_LIMIT + offset)?;
        let warning = self.read_u16(ina3221::REG_CH1_WARNING_ALERT_LIMIT + offset)?;
        Ok((
            field.extract(critical as u64) as f64 * ina3221::SHUNT_LSB_V,
            field.extract(warning as u64) as f64 * ina3221::SHUNT_LSB_V,
        ))
    }

    fn ina3221_limit_offset(&self, channel: u8) -> Result<u8> {
        if self.chip != Chip::Ina3221 {
            return Err(unsupported_measurement(self.chip, "per-channel alert limit"));
        }
        if !self.chip.has_channel(channel) {
            return Err(invalid_channel(self.chip, channel));
        }
        Ok(2 * (channel - 1))
    }

    /// Returns true once a conversion has completed since the flag was last cleared.
    pub fn conversion_ready(&mut self) -> Result<bool> {
        let (reg, flag) = match self.chip {
            Chip::Ina219 => (ina219::REG_BUS_VOLTAGE, ina219::BUS_CNVR),
            Chip::Ina228 => (ina228::REG_DIAG_ALRT, ina228::DIAG_ALRT_CNVRF),
            Chip::Ina3221 => (ina3221::REG_MASK_ENABLE, ina3221::MASK_ENABLE_CVRF),
        };
        Ok(self.read_u16(reg)? & flag != 0)
    }

    /// Reads identity and configuration registers.
    pub fn info(&mut self) -> Result<DeviceInfo> {
        let c = self.chip.constants();
        let manufacturer_id = match c.manufacturer_id_register {
            Some(reg) => Some(self.read_u16(reg)?),
            None => None,
        };
        let device_id = match c.device_id_register {
            Some(reg) => Some(self.read_u16(reg)?),
            None => None,
        };
        let config = self.read_u16(c.config_register)?;
        Ok(DeviceInfo {
            chip: self.chip,
            address: self.address,
            initialized: self.is_initialized(),
            manufacturer_id,
            device_id,
            config,
            calibration: self.calibration.clone(),
        })
    }
}

fn signed_limit(value: f64, lsb: f64, what: &str) -> Result<u16> {
    let counts = (value / lsb).round();
    if !(i16::MIN as f64..=i16::MAX as f64).contains(&counts) {
        return Err(Error::ArgumentOutOfRange(format!(
            "{} limit {} does not fit the limit register",
            what, value
        )));
    }
    Ok(counts as i16 as u16)
}

/// INA3221 limits share the 13-bit layout of the shunt voltage register.
fn shunt_limit_ina3221(value: f64, what: &str) -> Result<u16> {
    let counts = (value / ina3221::SHUNT_LSB_V).round();
    if !(-4096.0..=4095.0).contains(&counts) {
        return Err(Error::ArgumentOutOfRange(format!(
            "{} shunt limit {} V does not fit the limit register",
            what, value
        )));
    }
    Ok(((counts as i16) << ina3221::RESULT_SHIFT) as u16)
}

fn unsigned_limit(value: f64, lsb: f64, what: &str) -> Result<u16> {
    let counts = (value / lsb).round();
    if !(0.0..=u16::MAX as f64).contains(&counts) {
        return Err(Error::ArgumentOutOfRange(format!(
            "{} limit {} does not fit the limit register",
            what, value
        )));
    }
    Ok(counts as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_shunt_lookup() {
        let single = DeviceSettings::new(0.1, 1.0);
        assert_eq!(single.shunt_for(3), Some(0.1));
        let ladder = DeviceSettings::with_shunts(&[0.1, 10.0, 1000.0], 1.64);
        assert_eq!(ladder.shunt_for(2), Some(10.0));
        assert_eq!(ladder.shunt_for(0), None);
        assert!(ladder.validate(Chip::Ina3221).is_ok());
        assert!(DeviceSettings::with_shunts(&[0.1, 10.0], 1.0)
            .validate(Chip::Ina3221)
            .is_err());
    }

    #[test]
    fn test_limit_conversion() {
        assert_eq!(signed_limit(-5e-6, 5e-6, "x").unwrap(), 0xFFFF);
        assert_eq!(unsigned_limit(3.0, ina228::BUS_LIMIT_LSB_V, "x").unwrap(), 960);
        assert!(unsigned_limit(-1.0, 1.0, "x").is_err());
        assert!(signed_limit(1.0, 1e-6, "x").is_err());
    }
}
