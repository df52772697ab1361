//! In-memory bridge for tests and demos.
//!
//! [`SimBus`] keeps a register file per I2C address and one state word per
//! pin group. It can be told to fail transfers or to report a stuck pin, which
//! is how the error paths of the device, the ranger and the sampler are
//! exercised without hardware.

use crate::bus::BusPort;
use crate::chip::Chip;
use crate::consts::{ina228, ina3221, TI_MANUFACTURER_ID};
use crate::error::{Error, Result};
use crate::pin::{PinBank, PinCapability, PinDirection, PinGroup, PinId, PinLevel};
use crate::register::{decode_be, encode_be, RegisterWidth};
use log::trace;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct SimBus {
    registers: HashMap<(u8, u8), Vec<u8>>,
    pins: PinBank,
    groups: BTreeMap<PinGroup, u32>,
    stuck: BTreeMap<PinId, PinLevel>,
    pending_failures: usize,
    transfers: usize,
    pin_writes: usize,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus with the identity registers of `chip` at `address` preloaded.
    pub fn with_chip(chip: Chip, address: u8) -> Self {
        let mut bus = Self::new();
        match chip {
            Chip::Ina219 => {}
            Chip::Ina228 => {
                bus.set_register(address, ina228::REG_MANUFACTURER_ID, TI_MANUFACTURER_ID as u64, RegisterWidth::Bits16);
                bus.set_register(address, ina228::REG_DEVICE_ID, 0x2281, RegisterWidth::Bits16);
            }
            Chip::Ina3221 => {
                bus.set_register(address, ina3221::REG_MANUFACTURER_ID, TI_MANUFACTURER_ID as u64, RegisterWidth::Bits16);
                bus.set_register(address, ina3221::REG_DIE_ID, ina3221::DIE_ID as u64, RegisterWidth::Bits16);
            }
        }
        bus
    }

    /// Stores a register value as the chip would present it.
    pub fn set_register(&mut self, address: u8, reg: u8, value: u64, width: RegisterWidth) {
        // Values wider than the register are truncated to its width.
        let value = value & width.max_value();
        if let Ok(bytes) = encode_be(value, width) {
            self.registers.insert((address, reg), bytes);
        }
    }

    /// Stores a signed register value in two's complement.
    pub fn set_register_signed(&mut self, address: u8, reg: u8, value: i64, width: RegisterWidth) {
        self.set_register(address, reg, value as u64, width);
    }

    /// Last value written to (or preloaded into) a register.
    pub fn register(&self, address: u8, reg: u8) -> Option<u64> {
        self.registers.get(&(address, reg)).map(|b| decode_be(b))
    }

    /// Makes the next `count` I2C transfers fail.
    pub fn fail_next(&mut self, count: usize) {
        self.pending_failures = count;
    }

    /// Forces `pin` to read back `level` regardless of what is driven.
    pub fn stick_pin(&mut self, pin: PinId, level: PinLevel) {
        self.stuck.insert(pin, level);
    }

    pub fn release_pin(&mut self, pin: PinId) {
        self.stuck.remove(&pin);
    }

    /// Sets an input-only status pin as seen by the bridge.
    pub fn set_status_input(&mut self, pin: PinId, level: PinLevel) {
        let word = self.groups.entry(pin.group()).or_insert(0);
        if level.is_high() {
            *word |= pin.mask();
        } else {
            *word &= !pin.mask();
        }
    }

    /// Number of I2C transfers attempted so far.
    pub fn transfer_count(&self) -> usize {
        self.transfers
    }

    /// Number of group writes issued so far.
    pub fn pin_write_count(&self) -> usize {
        self.pin_writes
    }

    pub fn group_state(&self, group: PinGroup) -> u32 {
        self.groups.get(&group).copied().unwrap_or(0)
    }

    fn begin_transfer(&mut self, address: u8, reg: u8) -> Result<()> {
        self.transfers += 1;
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            return Err(Error::I2c {
                address,
                register: reg,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn level_of(&self, pin: PinId) -> PinLevel {
        if let Some(level) = self.stuck.get(&pin) {
            return *level;
        }
        PinLevel::from(self.group_state(pin.group()) & pin.mask() != 0)
    }
}

impl BusPort for SimBus {
    fn name(&self) -> &str {
        "sim"
    }

    fn i2c_read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        self.begin_transfer(addr, reg)?;
        buf.fill(0);
        if let Some(stored) = self.registers.get(&(addr, reg)) {
            let n = stored.len().min(buf.len());
            buf[..n].copy_from_slice(&stored[..n]);
        }
        trace!("sim: read 0x{:02X}/0x{:02X} -> {:02X?}", addr, reg, buf);
        Ok(())
    }

    fn i2c_write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        self.begin_transfer(addr, reg)?;
        trace!("sim: write 0x{:02X}/0x{:02X} <- {:02X?}", addr, reg, data);
        self.registers.insert((addr, reg), data.to_vec());
        Ok(())
    }

    fn set_pin_direction(&mut self, pin: PinId, direction: PinDirection) -> Result<()> {
        self.pins.set_direction(pin, direction)
    }

    fn set_pin_level(&mut self, pin: PinId, level: PinLevel) -> Result<()> {
        let mut levels = BTreeMap::new();
        levels.insert(pin, level);
        self.set_multiple_pins(&levels)
    }

    fn get_pin_level(&mut self, pin: PinId) -> Result<PinLevel> {
        let level = self.level_of(pin);
        self.pins.record_level(pin, level);
        Ok(level)
    }

    fn set_multiple_pins(&mut self, levels: &BTreeMap<PinId, PinLevel>) -> Result<()> {
        let writes = self.pins.plan_write(levels)?;
        for write in &writes {
            let word = self.groups.entry(write.group).or_insert(0);
            *word = write.apply(*word);
            self.pin_writes += 1;
            trace!(
                "sim: group {:?} mask=0x{:08X} levels=0x{:08X} -> 0x{:08X}",
                write.group,
                write.mask,
                write.levels,
                *word
            );
        }
        self.pins.record_levels(levels);
        Ok(())
    }

    fn get_multiple_pins(&mut self, pins: &[PinId]) -> Result<BTreeMap<PinId, PinLevel>> {
        let mut levels = BTreeMap::new();
        for &pin in pins {
            levels.insert(pin, self.get_pin_level(pin)?);
        }
        Ok(levels)
    }

    fn supported_pins(&self) -> Vec<PinCapability> {
        self.pins.capabilities()
    }
}
