//! Auto-ranging tests on the three-stage INA3221 ladder.
//!
//! Shunt voltages are injected into the simulated INA3221 registers; the
//! select lines are observed through the simulated pin groups.

use approx::assert_relative_eq;
use ina_autorange::pin::PinGroup;
use ina_autorange::sim::SimBus;
use ina_autorange::{
    AutoRanger, BusPort, Chip, DeviceSettings, Error, ErrorKind, PinDirection, PinId, PinLevel, RangeTable,
    RegisterDevice, RegisterWidth, THREE_STAGE_SHUNTS,
};

const ADDR: u8 = 0x40;
const GPIO0_BIT: u32 = 1 << 8;
const GPIO1_BIT: u32 = 1 << 9;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn device() -> RegisterDevice<SimBus> {
    let mut device = RegisterDevice::new(SimBus::with_chip(Chip::Ina3221, ADDR), Chip::Ina3221, ADDR);
    device
        .initialize(DeviceSettings::with_shunts(&THREE_STAGE_SHUNTS, 1.64))
        .unwrap();
    device
}

fn ranger() -> AutoRanger<SimBus> {
    AutoRanger::new(device(), RangeTable::three_stage_ina3221().unwrap()).unwrap()
}

/// Sets the shunt voltage of `channel` to `counts` × 40 µV.
fn set_shunt_counts(ranger: &mut AutoRanger<SimBus>, channel: u8, counts: i64) {
    let reg = 0x01 + 2 * (channel - 1);
    ranger
        .device_mut()
        .bus_mut()
        .set_register_signed(ADDR, reg, counts << 3, RegisterWidth::Bits16);
}

fn clear_shunts(ranger: &mut AutoRanger<SimBus>) {
    for ch in 1..=3 {
        set_shunt_counts(ranger, ch, 0);
    }
}

#[test]
fn test_starts_at_coarsest_level() {
    init_logging();
    let ranger = ranger();
    assert_eq!(ranger.active_level(), 0);
    assert_eq!(ranger.switch_count(), 0);
    assert_eq!(ranger.device().bus().group_state(PinGroup::Aux), 0);
    let caps = ranger.device().bus().supported_pins();
    let gpio1 = caps.iter().find(|c| c.pin == PinId::Gpio1).unwrap();
    assert_eq!(gpio1.direction, PinDirection::Output);
}

#[test]
fn test_three_stage_descent() {
    init_logging();
    let mut ranger = ranger();

    // 20 mA through 0.1 Ω = 2 mV = 50 counts.
    set_shunt_counts(&mut ranger, 1, 50);
    assert_relative_eq!(ranger.process().unwrap(), 20e-3, max_relative = 1e-9);
    assert_eq!(ranger.active_level(), 0);

    // 5 mA through 10 Ω = 50 mV = 1250 counts.
    clear_shunts(&mut ranger);
    set_shunt_counts(&mut ranger, 2, 1250);
    assert_relative_eq!(ranger.process().unwrap(), 5e-3, max_relative = 1e-9);
    assert_eq!(ranger.active_level(), 1);
    assert_eq!(ranger.device().bus().group_state(PinGroup::Aux), GPIO1_BIT);

    // 50 µA through 1000 Ω = 50 mV = 1250 counts.
    clear_shunts(&mut ranger);
    set_shunt_counts(&mut ranger, 3, 1250);
    assert_relative_eq!(ranger.process().unwrap(), 50e-6, max_relative = 1e-9);
    assert_eq!(ranger.active_level(), 2);
    assert_eq!(
        ranger.device().bus().group_state(PinGroup::Aux),
        GPIO0_BIT | GPIO1_BIT
    );
    assert_eq!(ranger.switch_count(), 2);
}

#[test]
fn test_constant_current_never_switches() {
    init_logging();
    let mut ranger = ranger();
    set_shunt_counts(&mut ranger, 1, 50);
    let writes = ranger.device().bus().pin_write_count();
    for _ in 0..50 {
        ranger.process().unwrap();
    }
    assert_eq!(ranger.active_level(), 0);
    assert_eq!(ranger.switch_count(), 0);
    assert_eq!(ranger.device().bus().pin_write_count(), writes);
}

#[test]
fn test_finest_level_overflow() {
    init_logging();
    let mut ranger = ranger();
    ranger.switch_range_level(2).unwrap();

    // 160 µA is still inside the finest band.
    set_shunt_counts(&mut ranger, 3, 4000);
    ranger.process().unwrap();
    assert_eq!(ranger.active_level(), 2);

    // 163.8 µA overflows; level 1 covers it.
    set_shunt_counts(&mut ranger, 3, 4095);
    ranger.process().unwrap();
    assert_eq!(ranger.active_level(), 1);
}

#[test]
fn test_switch_to_unknown_level_keeps_state() {
    init_logging();
    let mut ranger = ranger();
    let err = ranger.switch_range_level(3).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidRangeLevel {
            level: 3,
            available: 3
        }
    ));
    assert_eq!(ranger.active_level(), 0);
    assert_eq!(ranger.switch_count(), 0);
}

#[test]
fn test_failed_batch_write_keeps_state() {
    init_logging();
    let mut ranger = ranger();
    ranger
        .device_mut()
        .bus_mut()
        .set_pin_direction(PinId::Gpio1, PinDirection::Input)
        .unwrap();
    let err = ranger.switch_range_level(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedPin);
    assert_eq!(ranger.active_level(), 0);
}

#[test]
fn test_unconfirmed_switch_is_reported() {
    init_logging();
    let mut ranger = ranger();
    ranger
        .device_mut()
        .bus_mut()
        .stick_pin(PinId::Gpio1, PinLevel::Low);

    clear_shunts(&mut ranger);
    set_shunt_counts(&mut ranger, 2, 1250);
    let err = ranger.process().unwrap_err();
    assert!(matches!(
        err,
        Error::RangeSwitchUnconfirmed {
            level: 1,
            expected: 0b10,
            actual: 0b00
        }
    ));
    // The code was written, so the state follows the target.
    assert_eq!(ranger.active_level(), 1);

    ranger.device_mut().bus_mut().release_pin(PinId::Gpio1);
    ranger.switch_range_level(1).unwrap();
}

#[test]
fn test_uncalibrated_device_fails_to_measure() {
    init_logging();
    let device = RegisterDevice::new(SimBus::with_chip(Chip::Ina3221, ADDR), Chip::Ina3221, ADDR);
    let mut ranger = AutoRanger::new(device, RangeTable::three_stage_ina3221().unwrap()).unwrap();
    assert_eq!(ranger.process().unwrap_err().kind(), ErrorKind::NotCalibrated);
    assert_eq!(ranger.active_level(), 0);
}

#[test]
fn test_plan_channels_must_exist() {
    init_logging();
    let device = RegisterDevice::new(SimBus::new(), Chip::Ina219, ADDR);
    let err = AutoRanger::new(device, RangeTable::three_stage_ina3221().unwrap()).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_voltage_channel_selection() {
    init_logging();
    let ranger = ranger();
    assert_eq!(ranger.voltage_channel(), 1);
    let ranger = ranger.with_voltage_channel(3).unwrap();
    assert_eq!(ranger.voltage_channel(), 3);
    assert!(ranger.with_voltage_channel(0).is_err());
}
