//! Hysteresis auto-ranging over a set of switchable shunt configurations.
//!
//! Levels are ordered coarse to fine: level 0 has the smallest total shunt
//! resistance and the widest current range, the last level the largest
//! resistance and the finest resolution. Each level's bounds are its
//! hysteresis band; adjacent bands must overlap or touch, so that every
//! current has a level and a reading just across a boundary does not flap.

use crate::bus::BusPort;
use crate::device::RegisterDevice;
use crate::error::{Error, Result};
use crate::pin::{PinDirection, PinId, PinLevel};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fmt;

/// How a level turns per-channel currents into the measured current.
///
/// Coarse levels usually read every sense element of the parallel ladder;
/// finer levels read only the elements that carry current in that
/// configuration.
pub trait ReadPlan: Send + fmt::Debug {
    /// Device channels (1-based) to read, in order.
    fn channels(&self) -> &[u8];

    /// Combines the readings of [`channels`](Self::channels), in the same order.
    fn combine(&self, readings: &[f64]) -> f64;
}

/// Sum of parallel sense elements: the total current through the ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelSum {
    channels: Vec<u8>,
}

impl ParallelSum {
    pub fn new(channels: impl Into<Vec<u8>>) -> Self {
        Self {
            channels: channels.into(),
        }
    }
}

impl ReadPlan for ParallelSum {
    fn channels(&self) -> &[u8] {
        &self.channels
    }

    fn combine(&self, readings: &[f64]) -> f64 {
        readings.iter().sum()
    }
}

/// One hardware configuration of the sensing front end.
#[derive(Debug)]
pub struct RangeLevel {
    pub description: String,
    /// Below this (in magnitude) the ranger moves to a finer level.
    pub lower_a: f64,
    /// Above this the ranger moves to a coarser level.
    pub upper_a: f64,
    /// Bit `i` is driven on select pin `i`.
    pub select_code: u32,
    pub plan: Box<dyn ReadPlan>,
}

impl RangeLevel {
    pub fn new(
        description: impl Into<String>,
        lower_a: f64,
        upper_a: f64,
        select_code: u32,
        plan: impl ReadPlan + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            lower_a,
            upper_a,
            select_code,
            plan: Box::new(plan),
        }
    }
}

/// Validated, ordered set of range levels plus the pins that select them.
#[derive(Debug)]
pub struct RangeTable {
    select_pins: Vec<PinId>,
    levels: Vec<RangeLevel>,
}

/// Shunts of the three-stage INA3221 board, channels 1 to 3.
pub const THREE_STAGE_SHUNTS: [f64; 3] = [0.1, 10.0, 1000.0];

impl RangeTable {
    /// Validates and builds a table; any inconsistency is [`Error::Configuration`].
    pub fn new(select_pins: Vec<PinId>, levels: Vec<RangeLevel>) -> Result<Self> {
        if levels.len() < 2 {
            return Err(Error::Configuration(format!(
                "auto-ranging needs at least 2 levels, got {}",
                levels.len()
            )));
        }
        if select_pins.is_empty() || select_pins.len() > 32 {
            return Err(Error::Configuration(format!(
                "1 to 32 select pins required, got {}",
                select_pins.len()
            )));
        }
        for (i, pin) in select_pins.iter().enumerate() {
            if pin.is_input_only() {
                return Err(Error::Configuration(format!("select pin {} is input-only", pin)));
            }
            if select_pins[..i].contains(pin) {
                return Err(Error::Configuration(format!("select pin {} listed twice", pin)));
            }
        }
        let code_limit = 1u64 << select_pins.len();
        for (i, level) in levels.iter().enumerate() {
            if !(level.lower_a.is_finite() && level.upper_a.is_finite())
                || level.lower_a < 0.0
                || level.lower_a >= level.upper_a
            {
                return Err(Error::Configuration(format!(
                    "level {} ({}): bounds [{}, {}] A are not an increasing non-negative pair",
                    i, level.description, level.lower_a, level.upper_a
                )));
            }
            if level.select_code as u64 >= code_limit {
                return Err(Error::Configuration(format!(
                    "level {}: select code 0b{:b} needs more than {} select pins",
                    i,
                    level.select_code,
                    select_pins.len()
                )));
            }
            if levels[..i].iter().any(|l| l.select_code == level.select_code) {
                return Err(Error::Configuration(format!(
                    "level {}: select code 0b{:b} is already used",
                    i, level.select_code
                )));
            }
            if level.plan.channels().is_empty() {
                return Err(Error::Configuration(format!("level {}: read plan has no channels", i)));
            }
        }
        for (i, pair) in levels.windows(2).enumerate() {
            let (coarse, fine) = (&pair[0], &pair[1]);
            if fine.upper_a >= coarse.upper_a {
                return Err(Error::Configuration(format!(
                    "level {} must cover smaller currents than level {}",
                    i + 1,
                    i
                )));
            }
            if coarse.lower_a > fine.upper_a {
                return Err(Error::Configuration(format!(
                    "gap between level {} (from {} A) and level {} (up to {} A)",
                    i,
                    coarse.lower_a,
                    i + 1,
                    fine.upper_a
                )));
            }
        }
        Ok(Self {
            select_pins,
            levels,
        })
    }

    /// The 0.1 Ω / 10 Ω / 1000 Ω ladder on an INA3221, selected by GPIO0/GPIO1.
    ///
    /// | level | range | GPIO1 GPIO0 | channels read |
    /// |---|---|---|---|
    /// | 0 | 8.192 mA - 1.64 A | 0 0 | 1, 2, 3 |
    /// | 1 | 81.92 µA - 16.302 mA | 1 0 | 2, 3 |
    /// | 2 | 40 nA - 163.021 µA | 1 1 | 3 |
    pub fn three_stage_ina3221() -> Result<Self> {
        Self::new(
            vec![PinId::Gpio0, PinId::Gpio1],
            vec![
                RangeLevel::new("8.192 mA ~ 1.64 A", 8.192e-3, 1.64, 0b00, ParallelSum::new([1, 2, 3])),
                RangeLevel::new("81.920 µA ~ 16.302 mA", 81.92e-6, 16.302e-3, 0b10, ParallelSum::new([2, 3])),
                RangeLevel::new("40.000 nA ~ 163.021 µA", 40e-9, 163.021e-6, 0b11, ParallelSum::new([3])),
            ],
        )
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level(&self, index: usize) -> Option<&RangeLevel> {
        self.levels.get(index)
    }

    pub fn levels(&self) -> &[RangeLevel] {
        &self.levels
    }

    pub fn select_pins(&self) -> &[PinId] {
        &self.select_pins
    }

    /// Pin levels that encode `code`.
    pub fn select_levels(&self, code: u32) -> BTreeMap<PinId, PinLevel> {
        self.select_pins
            .iter()
            .enumerate()
            .map(|(bit, &pin)| (pin, PinLevel::from(code & (1 << bit) != 0)))
            .collect()
    }

    /// Inverse of [`select_levels`](Self::select_levels).
    pub fn decode_select(&self, levels: &BTreeMap<PinId, PinLevel>) -> u32 {
        self.select_pins
            .iter()
            .enumerate()
            .filter(|(_, pin)| levels.get(pin).copied() == Some(PinLevel::High))
            .fold(0, |code, (bit, _)| code | (1 << bit))
    }

    /// Next level for a reading taken at `level`.
    ///
    /// * coarsest: finer when below its lower bound.
    /// * intermediate: coarser when above its upper bound, finer when below its lower bound.
    /// * finest: above its upper bound, the finest coarser level whose upper
    ///   bound covers the reading, else the coarsest.
    ///
    /// The magnitude of the reading is compared; NaN never switches.
    pub fn decide(&self, level: usize, measured_a: f64) -> usize {
        let Some(active) = self.levels.get(level) else {
            return level;
        };
        let magnitude = measured_a.abs();
        let last = self.levels.len() - 1;
        if level > 0 && magnitude > active.upper_a {
            if level < last {
                return level - 1;
            }
            return (0..level)
                .rev()
                .find(|&i| magnitude <= self.levels[i].upper_a)
                .unwrap_or(0);
        }
        if level < last && magnitude < active.lower_a {
            return level + 1;
        }
        level
    }
}

/// Closed-loop range control for one sensor.
///
/// The ranger owns the device and, through it, the bus. It is not
/// self-scheduling: call [`process`](Self::process) once per sample.
#[derive(Debug)]
pub struct AutoRanger<B: BusPort> {
    device: RegisterDevice<B>,
    table: RangeTable,
    level: usize,
    voltage_channel: u8,
    switches: u64,
}

impl<B: BusPort> AutoRanger<B> {
    /// Channel id under which the ranged current is reported as a sample.
    pub const OUTPUT_CHANNEL: u8 = 0;

    /// Puts the select pins in output mode and drives the coarsest level.
    ///
    /// Every channel of every read plan must exist on the device.
    pub fn new(device: RegisterDevice<B>, table: RangeTable) -> Result<Self> {
        let chip = device.chip();
        for (i, level) in table.levels.iter().enumerate() {
            if let Some(&ch) = level.plan.channels().iter().find(|&&ch| !chip.has_channel(ch)) {
                return Err(Error::Configuration(format!(
                    "level {} reads channel {}, which {} does not have",
                    i, ch, chip
                )));
            }
        }
        let voltage_channel = table.levels[0].plan.channels()[0];
        let mut ranger = Self {
            device,
            table,
            level: 0,
            voltage_channel,
            switches: 0,
        };
        for pin in ranger.table.select_pins.clone() {
            ranger
                .device
                .bus_mut()
                .set_pin_direction(pin, PinDirection::Output)?;
        }
        ranger.switch_range_level(0)?;
        ranger.switches = 0;
        Ok(ranger)
    }

    /// Channel whose bus voltage is reported alongside the ranged current.
    pub fn with_voltage_channel(mut self, channel: u8) -> Result<Self> {
        if !self.device.chip().has_channel(channel) {
            return Err(crate::error::invalid_channel(self.device.chip(), channel));
        }
        self.voltage_channel = channel;
        Ok(self)
    }

    pub fn active_level(&self) -> usize {
        self.level
    }

    pub fn active_range(&self) -> &RangeLevel {
        &self.table.levels[self.level]
    }

    pub fn table(&self) -> &RangeTable {
        &self.table
    }

    pub fn voltage_channel(&self) -> u8 {
        self.voltage_channel
    }

    /// Range switches performed since construction.
    pub fn switch_count(&self) -> u64 {
        self.switches
    }

    pub fn device(&self) -> &RegisterDevice<B> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut RegisterDevice<B> {
        &mut self.device
    }

    pub fn into_device(self) -> RegisterDevice<B> {
        self.device
    }

    /// Reads the active level's channels and combines them.
    pub fn calculate_current(&mut self) -> Result<f64> {
        let plan = &self.table.levels[self.level].plan;
        let mut readings = Vec::with_capacity(plan.channels().len());
        for &ch in plan.channels() {
            readings.push(self.device.read_current(ch)?);
        }
        let current = plan.combine(&readings);
        debug!(
            "range {}: {:?} A -> {:.6e} A",
            self.level, readings, current
        );
        Ok(current)
    }

    /// Drives the select code of `target`.
    ///
    /// An unregistered level fails with [`Error::InvalidRangeLevel`] and
    /// leaves the state untouched. A failed batch write also leaves it
    /// untouched. If the written code does not read back, the state already
    /// follows `target` and [`Error::RangeSwitchUnconfirmed`] is returned.
    pub fn switch_range_level(&mut self, target: usize) -> Result<()> {
        let Some(level) = self.table.levels.get(target) else {
            return Err(Error::InvalidRangeLevel {
                level: target,
                available: self.table.levels.len(),
            });
        };
        let expected = level.select_code;
        let levels = self.table.select_levels(expected);
        self.device.bus_mut().set_multiple_pins(&levels)?;

        let previous = self.level;
        self.level = target;
        self.switches += 1;

        let readback = self
            .device
            .bus_mut()
            .get_multiple_pins(&self.table.select_pins)?;
        let actual = self.table.decode_select(&readback);
        if actual != expected {
            return Err(Error::RangeSwitchUnconfirmed {
                level: target,
                expected,
                actual,
            });
        }
        debug!(
            "range {} -> {} ({}), select 0b{:b}",
            previous, target, self.table.levels[target].description, expected
        );
        Ok(())
    }

    /// One control step: measure, decide, switch if needed.
    ///
    /// Returns the current measured at the level that was active on entry.
    pub fn process(&mut self) -> Result<f64> {
        let current = self.calculate_current()?;
        let next = self.table.decide(self.level, current);
        if next != self.level {
            info!(
                "{:.6e} A outside [{:.3e}, {:.3e}] A: switching range {} -> {}",
                current,
                self.table.levels[self.level].lower_a,
                self.table.levels[self.level].upper_a,
                self.level,
                next
            );
            self.switch_range_level(next)?;
        }
        Ok(current)
    }
}
