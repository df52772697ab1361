//! # ina-autorange
//!
//! A Rust crate for measuring current with Texas Instruments INA219, INA228
//! and INA3221 shunt monitors sitting behind USB-I²C bridge chips, with
//! automatic switching between shunt configurations to cover currents from
//! tens of nanoamperes to amperes.
//!
//! The crate does not talk to USB itself. Any bridge driver that implements
//! the small [`BusPort`] trait (block I²C transfers plus single and batched
//! GPIO access) can carry the sensors; [`sim::SimBus`] is an in-memory
//! implementation used by the tests and the demo.
//!
//! ## Features
//!
//! *   Bridge abstraction (`BusPort`):
//!     *   I²C block reads/writes addressed by 7-bit address and register.
//!     *   Pin direction and level access, masked group writes (`set_multiple_pins`).
//!     *   Strongly-typed `PinId` with a static location table (data, aux and status groups).
//! *   Register devices (`RegisterDevice`):
//!     *   Chip families INA219, INA228 and INA3221 with per-chip constant tables.
//!     *   Calibration from shunt resistance and maximum expected current
//!         (`compute_calibration`), written at `initialize`.
//!     *   Current, bus/shunt voltage and power per channel; temperature,
//!         energy and charge on the INA228.
//!     *   2, 3 and 5 byte big-endian registers with sign extension.
//!     *   INA228 alert limits in engineering units (`set_alert_limits`).
//! *   Auto-ranging (`AutoRanger`):
//!     *   Validated hysteresis bands per level (`RangeTable`), switched through GPIO select lines.
//!     *   Per-level read plans that sum the channels of a parallel shunt ladder.
//!     *   Read-back confirmation of every range switch.
//! *   Sampling (`SamplingScheduler`):
//!     *   Bounded and continuous runs at a fixed cadence without accumulated drift.
//!     *   Stop and statistics requests from other threads through a `SamplerHandle`.
//!     *   Ring-buffered sample log with per-channel min/max/mean.
//! *   TOML instrument configuration (`InstrumentConfig`).
//!
//! ## Chip Support & Limitations
//!
//! *   **INA219:** one channel, 16-bit calibration register (`0.04096 / (lsb · R)`).
//! *   **INA228:** one channel, 20-bit results, energy and charge
//!     accumulators, `SHUNT_CAL = 13107.2e6 · lsb · R` (×4 in the ±40.96 mV range).
//! *   **INA3221:** three channels, no calibration register; current is
//!     shunt voltage divided by the channel's shunt, so each channel may use a
//!     different resistor.
//!
//! Calibration values are clamped to the register range. When that happens the
//! current LSB is re-derived from the clamped value and a warning is logged.
//!
//! ## Installation
//!
//! Add the following to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! ina-autorange = "0.1.0" # Replace with the latest version
//! log = "0.4"             # Optional, for logging
//!
//! [dev-dependencies]      # For demos/tests
//! env_logger = "0.11"
//! approx = "0.5"
//! ```
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ina_autorange::{
//!     sim::SimBus, AutoRanger, Chip, DeviceSettings, RangeTable, RegisterDevice, Result,
//!     SamplingRequest, SamplingScheduler, SchedulerConfig, THREE_STAGE_SHUNTS,
//! };
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!     // Optional: Initialize logging
//!     // env_logger::init();
//!
//!     // Replace SimBus with a BusPort implementation for your bridge.
//!     let bus = SimBus::with_chip(Chip::Ina3221, 0x40);
//!     let mut device = RegisterDevice::new(bus, Chip::Ina3221, 0x40);
//!     device.initialize(DeviceSettings::with_shunts(&THREE_STAGE_SHUNTS, 1.64))?;
//!     println!("Channel 1: {:.6} A", device.read_current(1)?);
//!
//!     let mut ranger = AutoRanger::new(device, RangeTable::three_stage_ina3221()?)?;
//!
//!     let (mut scheduler, handle) = SamplingScheduler::new(SchedulerConfig::default());
//!     let request = SamplingRequest::bounded(Duration::from_secs(2), Duration::from_millis(100));
//!     let report = scheduler.execute(&mut ranger, &request, |sample| {
//!         println!("#{} {:?}", sample.sequence, sample.channels);
//!     })?;
//!     println!("{} samples, range {}", report.samples.len(), ranger.active_level());
//!     # drop(handle);
//!     Ok(())
//! }
//! ```
//!
//! ## Running in the Background
//!
//! [`SamplingScheduler::spawn`] moves the source to a worker thread. The
//! returned [`SamplerHandle`] can be cloned freely; `stop()` ends the run
//! within one poll interval (50 ms by default) and `query_statistics()`
//! returns the live statistics without touching the bus. Dropping every
//! handle ends a continuous run.
//!
//! See `demos/continuous_autorange.rs`.
//!
//! ## Hardware Setup Notes
//!
//! *   **I²C Pull-up Resistors:** Required externally (e.g., 4.7kΩ to 3.3V).
//! *   **Shunt ladder:** the three-stage preset expects 0.1 Ω, 10 Ω and 1000 Ω
//!     on INA3221 channels 1 to 3, with GPIO0/GPIO1 driving the switches that
//!     take the low-value shunts out of the current path.
//! *   **Select lines:** a switch is confirmed by reading the select pins
//!     back, so the bridge must report driven output levels.
//!
//! ## License
//!
//! This project is licensed under the WTFPL - see the [LICENSE](LICENSE) file for details.

use log::debug;

pub mod autorange;
pub mod bus;
pub mod chip;
pub mod config;
pub mod consts;
mod device;
mod error;
pub mod pin;
pub mod register;
pub mod sampler;
pub mod sim;

pub use autorange::{AutoRanger, ParallelSum, RangeLevel, RangeTable, ReadPlan, THREE_STAGE_SHUNTS};
pub use bus::BusPort;
pub use chip::{CalibrationParameters, Chip, MeasurementKind, ShuntRange};
pub use config::InstrumentConfig;
pub use device::{AlertLimits, DeviceInfo, DeviceSettings, RegisterDevice};
pub use error::{Error, ErrorKind, Result};
pub use pin::{PinCapability, PinDirection, PinId, PinLevel};
pub use register::RegisterWidth;
pub use sampler::{
    ChannelReading, Sample, SampleSource, SamplerHandle, SamplingMode, SamplingReport,
    SamplingRequest, SamplingScheduler, SchedulerConfig, Statistics,
};

/// Initializes the device described by `config` and builds its range table
/// if an `[auto_range]` section is present.
pub fn open_instrument<B: BusPort>(
    bus: B,
    config: &InstrumentConfig,
) -> Result<(RegisterDevice<B>, Option<RangeTable>)> {
    config.validate()?;
    let mut device = RegisterDevice::new(bus, config.device.chip, config.device.address);
    device.initialize(config.device_settings())?;
    let table = match config.auto_range {
        Some(_) => Some(config.range_table()?),
        None => None,
    };
    debug!(
        "Opened {} at 0x{:02X} via {} (auto-range: {})",
        config.device.chip,
        config.device.address,
        device.bus().name(),
        table.is_some()
    );
    Ok((device, table))
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{ina219, ina228};
    use crate::sim::SimBus;
    use approx::assert_relative_eq;

    #[test]
    fn test_ina219_current_lsb_from_shunt() {
        let cal = Chip::Ina219.compute_calibration(0.1, 3.2, ShuntRange::Standard).unwrap();
        assert_relative_eq!(cal.current_lsb, 97.65625e-6, max_relative = 1e-9);
        assert_relative_eq!(cal.power_lsb.unwrap(), 20.0 * 97.65625e-6, max_relative = 1e-9);
    }

    #[test]
    fn test_ina219_end_to_end_on_sim() {
        let mut device = RegisterDevice::new(SimBus::new(), Chip::Ina219, 0x40);
        device.initialize(DeviceSettings::new(0.1, 3.2)).unwrap();
        assert_eq!(device.bus().register(0x40, ina219::REG_CALIBRATION), Some(4194));
        assert_eq!(
            device.bus().register(0x40, ina219::REG_CONFIG),
            Some(ina219::DEFAULT_CONFIG as u64)
        );

        // 1024 counts of 97.65625 µA = 0.1 A; 12 V on the bus (3000 counts, bits 15..3).
        device.bus_mut().set_register(0x40, ina219::REG_CURRENT, 1024, RegisterWidth::Bits16);
        device
            .bus_mut()
            .set_register(0x40, ina219::REG_BUS_VOLTAGE, 3000 << 3, RegisterWidth::Bits16);
        assert_relative_eq!(device.read_current(1).unwrap(), 0.1, max_relative = 1e-9);
        assert_relative_eq!(device.read_voltage(1).unwrap(), 12.0, max_relative = 1e-9);

        // Negative current is two's complement.
        device.bus_mut().set_register_signed(0x40, ina219::REG_CURRENT, -1024, RegisterWidth::Bits16);
        assert_relative_eq!(device.read_current(1).unwrap(), -0.1, max_relative = 1e-9);
    }

    #[test]
    fn test_ina228_initialization_sequence() {
        let mut device = RegisterDevice::new(SimBus::with_chip(Chip::Ina228, 0x45), Chip::Ina228, 0x45);
        device.initialize(DeviceSettings::new(1.0, 0.2)).unwrap();
        let bus = device.bus();
        assert_eq!(bus.register(0x45, ina228::REG_SHUNT_CAL), Some(20000));
        assert_eq!(
            bus.register(0x45, ina228::REG_CONFIG),
            Some(ina228::CONFIG_ADC_RANGE_NARROW as u64)
        );
        assert_eq!(
            bus.register(0x45, ina228::REG_ADC_CONFIG),
            Some(ina228::DEFAULT_ADC_CONFIG as u64)
        );
        assert_eq!(bus.register(0x45, ina228::REG_SOVL), Some(0x7FFE));
        assert_eq!(bus.register(0x45, ina228::REG_BUVL), Some(0x0310));
        assert!(device.is_initialized());
    }

    #[test]
    fn test_open_instrument_from_config() {
        let config = InstrumentConfig::from_toml_str(
            r#"
            [device]
            chip = "ina3221"
            shunt_resistances = [0.1, 10.0, 1000.0]
            max_expected_current_a = 1.64
            "#,
        )
        .unwrap();
        let (device, table) = open_instrument(SimBus::with_chip(Chip::Ina3221, 0x40), &config).unwrap();
        assert!(device.is_initialized());
        assert!(table.is_none());
        assert_relative_eq!(device.calibration(2).unwrap().current_lsb, 4e-6, max_relative = 1e-9);
    }
}
