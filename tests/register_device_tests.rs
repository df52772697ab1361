//! Register device tests against the in-memory bridge.
//!
//! These tests cover calibration, register framing and measurement scaling
//! without requiring hardware.

use approx::assert_relative_eq;
use ina_autorange::consts::{ina219, ina228, ina3221};
use ina_autorange::sim::SimBus;
use ina_autorange::{
    AlertLimits, BusPort, Chip, DeviceSettings, Error, ErrorKind, RegisterDevice, RegisterWidth, ShuntRange,
    THREE_STAGE_SHUNTS,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ina219() -> RegisterDevice<SimBus> {
    let mut device = RegisterDevice::new(SimBus::new(), Chip::Ina219, 0x40);
    device.initialize(DeviceSettings::new(0.1, 3.2)).unwrap();
    device
}

fn ina228(range: ShuntRange) -> RegisterDevice<SimBus> {
    let mut device = RegisterDevice::new(SimBus::with_chip(Chip::Ina228, 0x40), Chip::Ina228, 0x40);
    device
        .initialize(DeviceSettings::new(0.015, 10.0).shunt_range(range))
        .unwrap();
    device
}

fn ina3221() -> RegisterDevice<SimBus> {
    let mut device = RegisterDevice::new(SimBus::with_chip(Chip::Ina3221, 0x40), Chip::Ina3221, 0x40);
    device
        .initialize(DeviceSettings::with_shunts(&THREE_STAGE_SHUNTS, 1.64))
        .unwrap();
    device
}

#[test]
fn test_register_round_trip_all_widths() {
    init_logging();
    let mut device = RegisterDevice::new(SimBus::new(), Chip::Ina228, 0x44);
    let cases = [
        (0x00, 0xBEEF, RegisterWidth::Bits16),
        (0x07, 0x00AB_CDEF, RegisterWidth::Bits24),
        (0x09, 0x12_3456_789A, RegisterWidth::Bits40),
    ];
    for (reg, value, width) in cases {
        device.write_register(reg, value, width).unwrap();
        assert_eq!(device.read_register(reg, width).unwrap(), value);
    }
    // Big-endian on the wire.
    assert_eq!(device.bus().register(0x44, 0x07), Some(0x00AB_CDEF));

    let err = device
        .write_register(0x00, 0x1_0000, RegisterWidth::Bits16)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentOutOfRange);
}

#[test]
fn test_derived_quantities_need_calibration() {
    init_logging();
    let mut device = RegisterDevice::new(SimBus::new(), Chip::Ina219, 0x40);
    let err = device.read_current(1).unwrap_err();
    assert!(matches!(
        err,
        Error::NotCalibrated {
            chip: Chip::Ina219,
            channel: 1
        }
    ));
    assert_eq!(device.read_power(1).unwrap_err().kind(), ErrorKind::NotCalibrated);

    // Raw voltages do not need calibration.
    device
        .bus_mut()
        .set_register(0x40, ina219::REG_BUS_VOLTAGE, 1250 << 3, RegisterWidth::Bits16);
    assert_relative_eq!(device.read_voltage(1).unwrap(), 5.0, max_relative = 1e-9);
    device
        .bus_mut()
        .set_register_signed(0x40, ina219::REG_SHUNT_VOLTAGE, -500, RegisterWidth::Bits16);
    assert_relative_eq!(device.read_shunt_voltage(1).unwrap(), -5e-3, max_relative = 1e-9);
}

#[test]
fn test_failed_initialization_leaves_device_uncalibrated() {
    init_logging();
    let mut device = ina219();
    assert!(device.is_initialized());

    // Reset write fails: previous calibration must not survive.
    device.bus_mut().fail_next(1);
    let err = device.initialize(DeviceSettings::new(0.1, 3.2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Bus);
    assert!(!device.is_initialized());
    assert_eq!(device.read_current(1).unwrap_err().kind(), ErrorKind::NotCalibrated);

    // Bad settings fail before any transfer.
    let before = device.bus().transfer_count();
    let err = device.initialize(DeviceSettings::new(0.0, 3.2)).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(device.bus().transfer_count(), before);
}

#[test]
fn test_identity_checks() {
    init_logging();
    let mut bus = SimBus::with_chip(Chip::Ina228, 0x40);
    bus.set_register(0x40, ina228::REG_MANUFACTURER_ID, 0x1234, RegisterWidth::Bits16);
    let mut device = RegisterDevice::new(bus, Chip::Ina228, 0x40);
    let err = device.initialize(DeviceSettings::new(0.015, 10.0)).unwrap_err();
    assert!(matches!(
        err,
        Error::UnexpectedDevice {
            expected: 0x5449,
            actual: 0x1234
        }
    ));

    // A foreign device ID is only a warning.
    let mut bus = SimBus::with_chip(Chip::Ina3221, 0x41);
    bus.set_register(0x41, ina3221::REG_DIE_ID, 0x9999, RegisterWidth::Bits16);
    let mut device = RegisterDevice::new(bus, Chip::Ina3221, 0x41);
    device
        .initialize(DeviceSettings::with_shunts(&THREE_STAGE_SHUNTS, 1.64))
        .unwrap();
    let info = device.info().unwrap();
    assert_eq!(info.device_id, Some(0x9999));
    assert_eq!(info.config, ina3221::DEFAULT_CONFIG);
}

#[test]
fn test_calibration_stays_consistent_with_register() {
    for shunt in [0.001, 0.01, 0.1, 0.5, 2.0] {
        for max_current in [0.01, 0.1, 1.0, 3.2, 15.0] {
            let cal = Chip::Ina219
                .compute_calibration(shunt, max_current, ShuntRange::Standard)
                .unwrap();
            let value = cal.calibration_register_value.unwrap();
            assert!((1..=ina219::CALIBRATION_MAX).contains(&value));
            let ideal = ina219::CALIBRATION_K / (cal.current_lsb * shunt);
            assert!(
                (ideal - value as f64).abs() < 1.0,
                "INA219 {} Ω / {} A: cal {} vs {}",
                shunt,
                max_current,
                value,
                ideal
            );

            for range in [ShuntRange::Standard, ShuntRange::Narrow] {
                let cal = Chip::Ina228
                    .compute_calibration(shunt, max_current, range)
                    .unwrap();
                let value = cal.calibration_register_value.unwrap();
                assert!((1..=ina228::CALIBRATION_MAX).contains(&value));
                let scale = if range == ShuntRange::Narrow { 4.0 } else { 1.0 };
                let ideal = ina228::CALIBRATION_K * cal.current_lsb * shunt * scale;
                assert!(
                    (ideal - value as f64).abs() < 1.0,
                    "INA228 {} Ω / {} A / {:?}: cal {} vs {}",
                    shunt,
                    max_current,
                    range,
                    value,
                    ideal
                );
            }
        }
    }
}

#[test]
fn test_recalibration_rewrites_register() {
    init_logging();
    let mut device = ina219();
    assert_eq!(device.bus().register(0x40, ina219::REG_CALIBRATION), Some(4194));

    device.set_shunt_resistance(1, 0.05).unwrap();
    assert_eq!(device.bus().register(0x40, ina219::REG_CALIBRATION), Some(8388));
    assert_relative_eq!(
        device.calibration(1).unwrap().current_lsb,
        97.65625e-6,
        max_relative = 1e-9
    );

    device.set_max_expected_current(1.6).unwrap();
    assert_relative_eq!(
        device.calibration(1).unwrap().current_lsb,
        1.6 / 32768.0,
        max_relative = 1e-9
    );
    assert!(device.set_shunt_resistance(2, 0.1).is_err());
}

#[test]
fn test_ina228_scaling() {
    init_logging();
    let mut device = ina228(ShuntRange::Standard);
    let lsb = device.calibration(1).unwrap().current_lsb;
    assert_relative_eq!(lsb, 10.0 / 524288.0, max_relative = 1e-12);
    assert_eq!(device.bus().register(0x40, ina228::REG_CONFIG), Some(0));

    // 20-bit results sit above 4 reserved bits.
    device
        .bus_mut()
        .set_register_signed(0x40, ina228::REG_CURRENT, -1000 << 4, RegisterWidth::Bits24);
    assert_relative_eq!(device.read_current(1).unwrap(), -1000.0 * lsb, max_relative = 1e-9);
    device
        .bus_mut()
        .set_register(0x40, ina228::REG_VBUS, 61440 << 4, RegisterWidth::Bits24);
    assert_relative_eq!(device.read_voltage(1).unwrap(), 12.0, max_relative = 1e-9);
    device
        .bus_mut()
        .set_register(0x40, ina228::REG_DIETEMP, 3200, RegisterWidth::Bits16);
    assert_relative_eq!(device.read_temperature().unwrap(), 25.0, max_relative = 1e-9);

    device
        .bus_mut()
        .set_register(0x40, ina228::REG_ENERGY, 1000, RegisterWidth::Bits40);
    assert_relative_eq!(
        device.read_energy().unwrap(),
        1000.0 * 16.0 * 3.2 * lsb,
        max_relative = 1e-9
    );
    device
        .bus_mut()
        .set_register_signed(0x40, ina228::REG_CHARGE, -200, RegisterWidth::Bits40);
    assert_relative_eq!(device.read_charge().unwrap(), -200.0 * lsb, max_relative = 1e-9);

    device.reset_accumulators().unwrap();
    assert_eq!(
        device.bus().register(0x40, ina228::REG_CONFIG),
        Some(ina228::CONFIG_RESETACC as u64)
    );
}

#[test]
fn test_ina228_alert_limits() {
    init_logging();
    let mut device = ina228(ShuntRange::Narrow);
    device
        .set_alert_limits(&AlertLimits {
            shunt_overvoltage_v: Some(0.01),
            bus_overvoltage_v: Some(12.0),
            temperature_limit_c: Some(85.0),
            ..Default::default()
        })
        .unwrap();
    let bus = device.bus();
    assert_eq!(bus.register(0x40, ina228::REG_SOVL), Some(8000));
    assert_eq!(bus.register(0x40, ina228::REG_BOVL), Some(3840));
    assert_eq!(bus.register(0x40, ina228::REG_TEMP_LIMIT), Some(10880));
    // Untouched limit keeps the initialization default.
    assert_eq!(bus.register(0x40, ina228::REG_BUVL), Some(0x0310));

    // Out-of-range value: nothing is written.
    let before = device.bus().transfer_count();
    let err = device
        .set_alert_limits(&AlertLimits {
            bus_overvoltage_v: Some(10.0),
            shunt_overvoltage_v: Some(1.0),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentOutOfRange);
    assert_eq!(device.bus().transfer_count(), before);

    let err = ina219().set_alert_limits(&AlertLimits::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
}

#[test]
fn test_ina3221_channels() {
    init_logging();
    let mut device = ina3221();
    assert_eq!(
        device.bus().register(0x40, ina3221::REG_CONFIG),
        Some(ina3221::DEFAULT_CONFIG as u64)
    );

    // 50 mV across 10 Ω on channel 2, 5 V on its bus.
    device
        .bus_mut()
        .set_register_signed(0x40, 0x03, 1250 << 3, RegisterWidth::Bits16);
    device
        .bus_mut()
        .set_register(0x40, 0x04, 625 << 3, RegisterWidth::Bits16);
    assert_relative_eq!(device.read_current(2).unwrap(), 5e-3, max_relative = 1e-9);
    assert_relative_eq!(device.read_voltage(2).unwrap(), 5.0, max_relative = 1e-9);
    // No power register: V x I.
    assert_relative_eq!(device.read_power(2).unwrap(), 25e-3, max_relative = 1e-9);

    let currents = device.read_currents().unwrap();
    assert_eq!(currents.len(), 3);
    assert_eq!(currents[0], 0.0);

    assert_eq!(device.read_current(4).unwrap_err().kind(), ErrorKind::ArgumentOutOfRange);
    assert_eq!(device.read_temperature().unwrap_err().kind(), ErrorKind::UnsupportedFeature);
}

#[test]
fn test_failed_read_is_not_zero() {
    init_logging();
    let mut device = ina219();
    device.bus_mut().fail_next(1);
    assert_eq!(device.read_current(1).unwrap_err().kind(), ErrorKind::Bus);
    assert_eq!(device.read_current(1).unwrap(), 0.0);
}

#[test]
fn test_device_over_boxed_bus() {
    init_logging();
    let bus: Box<dyn BusPort> = Box::new(SimBus::new());
    let mut device = RegisterDevice::new(bus, Chip::Ina219, 0x40);
    device.initialize(DeviceSettings::new(0.1, 3.2)).unwrap();
    assert_eq!(device.bus().name(), "sim");
    // Calibration 4194 = 0x1062, MSB first.
    assert_eq!(device.bus_mut().i2c_read_byte(0x40, ina219::REG_CALIBRATION).unwrap(), 0x10);
    device.bus_mut().i2c_write_byte(0x41, 0x00, 0x5A).unwrap();
    let mut buf = [0u8; 2];
    device.bus_mut().i2c_read_block(0x41, 0x00, &mut buf).unwrap();
    assert_eq!(buf, [0x5A, 0x00]);
}

#[test]
fn test_config_word_overrides() {
    init_logging();
    // 16 V bus range on top of the default word.
    let mut device = RegisterDevice::new(SimBus::new(), Chip::Ina219, 0x40);
    device
        .initialize(DeviceSettings::new(0.1, 3.2).bus_voltage_range(16))
        .unwrap();
    assert_eq!(
        device.bus().register(0x40, ina219::REG_CONFIG),
        Some((ina219::DEFAULT_CONFIG & !ina219::CONFIG_BRNG_MASK) as u64)
    );
    assert_eq!(device.info().unwrap().config, 0x199F);

    // Raw word with the 32 V range applied on top.
    let mut device = RegisterDevice::new(SimBus::new(), Chip::Ina219, 0x40);
    device
        .initialize(DeviceSettings::new(0.1, 3.2).config(0x019F).bus_voltage_range(32))
        .unwrap();
    assert_eq!(device.bus().register(0x40, ina219::REG_CONFIG), Some(0x219F));

    let mut device = RegisterDevice::new(SimBus::with_chip(Chip::Ina3221, 0x40), Chip::Ina3221, 0x40);
    device
        .initialize(DeviceSettings::with_shunts(&THREE_STAGE_SHUNTS, 1.64).config(0x7127))
        .unwrap();
    assert_eq!(device.bus().register(0x40, ina3221::REG_CONFIG), Some(0x7127));
}

#[test]
fn test_invalid_config_overrides_touch_nothing() {
    init_logging();
    let cases = [
        (Chip::Ina219, DeviceSettings::new(0.1, 3.2).bus_voltage_range(20)),
        (Chip::Ina219, DeviceSettings::new(0.1, 3.2).config(0x8000)),
        (Chip::Ina228, DeviceSettings::new(0.015, 10.0).config(0x0010)),
        (
            Chip::Ina3221,
            DeviceSettings::with_shunts(&THREE_STAGE_SHUNTS, 1.64).bus_voltage_range(32),
        ),
    ];
    for (chip, settings) in cases {
        let mut device = RegisterDevice::new(SimBus::with_chip(chip, 0x40), chip, 0x40);
        let err = device.initialize(settings).unwrap_err();
        assert!(err.is_configuration(), "{}: {}", chip, err);
        assert_eq!(device.bus().transfer_count(), 0);
    }
}

#[test]
fn test_ina3221_channel_alert_limits() {
    init_logging();
    let mut device = ina3221();
    device
        .set_channel_alert_limits(2, Some(0.1), Some(0.08))
        .unwrap();
    // 40 µV counts in bits 15..3.
    assert_eq!(device.bus().register(0x40, 0x09), Some(2500 << 3));
    assert_eq!(device.bus().register(0x40, 0x0A), Some(2000 << 3));
    let (critical, warning) = device.channel_alert_limits(2).unwrap();
    assert_relative_eq!(critical, 0.1, epsilon = 1e-9);
    assert_relative_eq!(warning, 0.08, epsilon = 1e-9);

    device.set_channel_alert_limits(1, Some(-0.04), None).unwrap();
    assert_eq!(device.bus().register(0x40, 0x07), Some(0xE0C0));
    assert_relative_eq!(device.channel_alert_limits(1).unwrap().0, -0.04, epsilon = 1e-9);

    // An out-of-range value blocks the whole call.
    let before = device.bus().transfer_count();
    let err = device
        .set_channel_alert_limits(3, Some(0.2), Some(0.01))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentOutOfRange);
    assert_eq!(device.bus().transfer_count(), before);
    assert_eq!(device.bus().register(0x40, 0x0C), None);

    assert_eq!(
        device.set_channel_alert_limits(4, Some(0.01), None).unwrap_err().kind(),
        ErrorKind::ArgumentOutOfRange
    );
    assert_eq!(
        ina219().channel_alert_limits(1).unwrap_err().kind(),
        ErrorKind::UnsupportedFeature
    );
}

#[test]
fn test_conversion_ready_flags() {
    init_logging();
    let mut device = ina219();
    device
        .bus_mut()
        .set_register(0x40, ina219::REG_BUS_VOLTAGE, 3000 << 3, RegisterWidth::Bits16);
    assert!(!device.conversion_ready().unwrap());
    device.bus_mut().set_register(
        0x40,
        ina219::REG_BUS_VOLTAGE,
        (3000 << 3) | ina219::BUS_CNVR as u64,
        RegisterWidth::Bits16,
    );
    assert!(device.conversion_ready().unwrap());

    let mut device = ina228(ShuntRange::Narrow);
    assert!(!device.conversion_ready().unwrap());
    device.bus_mut().set_register(
        0x40,
        ina228::REG_DIAG_ALRT,
        (ina228::DIAG_ALRT_ALATCH | ina228::DIAG_ALRT_CNVRF) as u64,
        RegisterWidth::Bits16,
    );
    assert!(device.conversion_ready().unwrap());

    let mut device = ina3221();
    assert!(!device.conversion_ready().unwrap());
    device.bus_mut().set_register(
        0x40,
        ina3221::REG_MASK_ENABLE,
        ina3221::MASK_ENABLE_CVRF as u64,
        RegisterWidth::Bits16,
    );
    assert!(device.conversion_ready().unwrap());
}
