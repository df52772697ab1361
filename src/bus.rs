//! The bridge abstraction consumed by every sensor and control loop.

use crate::error::Result;
use crate::pin::{PinCapability, PinDirection, PinId, PinLevel};
use log::trace;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

/// A USB-to-I2C bridge: register-style I2C transfers plus digital pins.
///
/// Implementations exist per bridge chip and own their transport. The core
/// only ever holds one `BusPort` per physical bridge and never issues
/// overlapping transfers, so every method takes `&mut self`.
///
/// Contract:
/// * `i2c_read_block` fills exactly `buf.len()` bytes or fails.
/// * `set_multiple_pins` applies every change before returning `Ok`; a
///   partial application is an error. Pins of the same group are written
///   atomically, so unrelated pins never see a wrong transient level.
/// * Input-only pins reject direction and level writes with
///   [`Error::UnsupportedPin`](crate::Error::UnsupportedPin).
/// * No method retries internally.
pub trait BusPort {
    /// Short human readable name of the bridge, for logs.
    fn name(&self) -> &str {
        "bus"
    }

    /// Reads `buf.len()` bytes starting at register `reg` of slave `addr`.
    fn i2c_read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()>;

    /// Writes `data` starting at register `reg` of slave `addr`.
    fn i2c_write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()>;

    fn set_pin_direction(&mut self, pin: PinId, direction: PinDirection) -> Result<()>;

    fn set_pin_level(&mut self, pin: PinId, level: PinLevel) -> Result<()>;

    fn get_pin_level(&mut self, pin: PinId) -> Result<PinLevel>;

    /// Drives several pins in one batch (one masked write per pin group).
    fn set_multiple_pins(&mut self, levels: &BTreeMap<PinId, PinLevel>) -> Result<()>;

    /// Samples several pins; the result has one entry per requested pin.
    fn get_multiple_pins(&mut self, pins: &[PinId]) -> Result<BTreeMap<PinId, PinLevel>>;

    /// Pins this bridge exposes, with their current direction and last level.
    fn supported_pins(&self) -> Vec<PinCapability>;

    fn i2c_read_byte(&mut self, addr: u8, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.i2c_read_block(addr, reg, &mut buf)?;
        Ok(buf[0])
    }

    fn i2c_write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<()> {
        self.i2c_write_block(addr, reg, &[value])
    }

    /// Inverts an output pin and returns the new level.
    fn toggle_pin(&mut self, pin: PinId) -> Result<PinLevel> {
        let next = self.get_pin_level(pin)?.toggled();
        self.set_pin_level(pin, next)?;
        trace!("{}: toggled {} to {:?}", self.name(), pin, next);
        Ok(next)
    }

    /// Drives `pin` high for `duration`, then low again.
    fn pulse_pin(&mut self, pin: PinId, duration: Duration) -> Result<()> {
        self.set_pin_level(pin, PinLevel::High)?;
        thread::sleep(duration);
        self.set_pin_level(pin, PinLevel::Low)
    }
}

impl<B: BusPort + ?Sized> BusPort for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn i2c_read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        (**self).i2c_read_block(addr, reg, buf)
    }
    fn i2c_write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        (**self).i2c_write_block(addr, reg, data)
    }
    fn set_pin_direction(&mut self, pin: PinId, direction: PinDirection) -> Result<()> {
        (**self).set_pin_direction(pin, direction)
    }
    fn set_pin_level(&mut self, pin: PinId, level: PinLevel) -> Result<()> {
        (**self).set_pin_level(pin, level)
    }
    fn get_pin_level(&mut self, pin: PinId) -> Result<PinLevel> {
        (**self).get_pin_level(pin)
    }
    fn set_multiple_pins(&mut self, levels: &BTreeMap<PinId, PinLevel>) -> Result<()> {
        (**self).set_multiple_pins(levels)
    }
    fn get_multiple_pins(&mut self, pins: &[PinId]) -> Result<BTreeMap<PinId, PinLevel>> {
        (**self).get_multiple_pins(pins)
    }
    fn supported_pins(&self) -> Vec<PinCapability> {
        (**self).supported_pins()
    }
}
