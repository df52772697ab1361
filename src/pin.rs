//! Hardware-neutral pin model shared by all bridge implementations.
//!
//! Every [`PinId`] lives in exactly one [`PinGroup`] at a fixed bit offset.
//! The layout mirrors the usual parallel-port style bridges: an 8-bit data
//! bus, an auxiliary GPIO byte and an input-only status word.

use crate::error::{input_only_pin, pin_not_output, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
    /// Usable as either input or output; the power-on direction of I/O pins.
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    #[inline]
    pub fn is_high(self) -> bool {
        self == PinLevel::High
    }

    /// The opposite level.
    #[inline]
    pub fn toggled(self) -> Self {
        match self {
            PinLevel::Low => PinLevel::High,
            PinLevel::High => PinLevel::Low,
        }
    }
}

impl From<bool> for PinLevel {
    fn from(high: bool) -> Self {
        if high {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

/// Addressing group a pin belongs to. Writes within one group are atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PinGroup {
    /// D0-D7 data bus bits.
    Data,
    /// Auxiliary GPIO bits.
    Aux,
    /// Input-only status bits (fault, busy, bus lines).
    Status,
}

/// Identifier of a bridge pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinId {
    Data0,
    Data1,
    Data2,
    Data3,
    Data4,
    Data5,
    Data6,
    Data7,
    Gpio0,
    Gpio1,
    Gpio2,
    Gpio3,
    Gpio4,
    Gpio5,
    Gpio6,
    Gpio7,
    Fault,
    PaperEmpty,
    Interrupt,
    Select,
    Busy,
    I2cScl,
    I2cSda,
}

/// Where a pin sits and what it can do electrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinLocation {
    pub group: PinGroup,
    /// Bit offset inside the group's 32-bit state word.
    pub bit: u8,
    pub kind: PinDirection,
}

const fn io(group: PinGroup, bit: u8) -> PinLocation {
    PinLocation {
        group,
        bit,
        kind: PinDirection::Bidirectional,
    }
}

const fn status(bit: u8) -> PinLocation {
    PinLocation {
        group: PinGroup::Status,
        bit,
        kind: PinDirection::Input,
    }
}

// Indexed by `PinId as usize`.
const PIN_TABLE: [PinLocation; 23] = [
    io(PinGroup::Data, 0),
    io(PinGroup::Data, 1),
    io(PinGroup::Data, 2),
    io(PinGroup::Data, 3),
    io(PinGroup::Data, 4),
    io(PinGroup::Data, 5),
    io(PinGroup::Data, 6),
    io(PinGroup::Data, 7),
    io(PinGroup::Aux, 8),
    io(PinGroup::Aux, 9),
    io(PinGroup::Aux, 10),
    io(PinGroup::Aux, 11),
    io(PinGroup::Aux, 12),
    io(PinGroup::Aux, 13),
    io(PinGroup::Aux, 14),
    io(PinGroup::Aux, 15),
    status(8),
    status(9),
    status(10),
    status(11),
    status(13),
    status(22),
    status(23),
];

impl PinId {
    /// All pins in table order.
    pub const ALL: [PinId; 23] = [
        PinId::Data0,
        PinId::Data1,
        PinId::Data2,
        PinId::Data3,
        PinId::Data4,
        PinId::Data5,
        PinId::Data6,
        PinId::Data7,
        PinId::Gpio0,
        PinId::Gpio1,
        PinId::Gpio2,
        PinId::Gpio3,
        PinId::Gpio4,
        PinId::Gpio5,
        PinId::Gpio6,
        PinId::Gpio7,
        PinId::Fault,
        PinId::PaperEmpty,
        PinId::Interrupt,
        PinId::Select,
        PinId::Busy,
        PinId::I2cScl,
        PinId::I2cSda,
    ];

    /// Returns the group, bit offset and electrical capability of the pin.
    #[inline]
    pub fn location(self) -> PinLocation {
        PIN_TABLE[self as usize]
    }

    #[inline]
    pub fn group(self) -> PinGroup {
        self.location().group
    }

    /// Returns the bit mask (1 << bit) inside the group's state word.
    #[inline]
    pub fn mask(self) -> u32 {
        1u32 << self.location().bit
    }

    #[inline]
    pub fn is_input_only(self) -> bool {
        self.location().kind == PinDirection::Input
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PinId::Data0 => "D0",
            PinId::Data1 => "D1",
            PinId::Data2 => "D2",
            PinId::Data3 => "D3",
            PinId::Data4 => "D4",
            PinId::Data5 => "D5",
            PinId::Data6 => "D6",
            PinId::Data7 => "D7",
            PinId::Gpio0 => "GPIO0",
            PinId::Gpio1 => "GPIO1",
            PinId::Gpio2 => "GPIO2",
            PinId::Gpio3 => "GPIO3",
            PinId::Gpio4 => "GPIO4",
            PinId::Gpio5 => "GPIO5",
            PinId::Gpio6 => "GPIO6",
            PinId::Gpio7 => "GPIO7",
            PinId::Fault => "FAULT",
            PinId::PaperEmpty => "PEMP",
            PinId::Interrupt => "INT",
            PinId::Select => "SLCT",
            PinId::Busy => "BUSY",
            PinId::I2cScl => "SCL",
            PinId::I2cSda => "SDA",
        };
        f.write_str(name)
    }
}

/// Direction and last observed level of one pin, as tracked by a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinCapability {
    pub pin: PinId,
    pub direction: PinDirection,
    pub last_known_level: Option<PinLevel>,
}

/// One masked write to a group's state word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupWrite {
    pub group: PinGroup,
    pub mask: u32,
    pub levels: u32,
}

impl GroupWrite {
    /// Applies the write to the current state word, leaving bits outside `mask` untouched.
    #[inline]
    pub fn apply(&self, current: u32) -> u32 {
        (current & !self.mask) | (self.levels & self.mask)
    }
}

/// Per-pin bookkeeping a [`BusPort`](crate::BusPort) implementation can embed.
///
/// The bank validates direction changes and batch writes and turns a batch
/// into one [`GroupWrite`] per group, so an implementation only has to move
/// whole state words over its transport.
#[derive(Debug, Clone)]
pub struct PinBank {
    pins: BTreeMap<PinId, PinCapability>,
}

impl Default for PinBank {
    fn default() -> Self {
        Self::new()
    }
}

impl PinBank {
    /// Creates a bank with every pin at its power-on direction and unknown level.
    pub fn new() -> Self {
        let pins = PinId::ALL
            .iter()
            .map(|&pin| {
                (
                    pin,
                    PinCapability {
                        pin,
                        direction: pin.location().kind,
                        last_known_level: None,
                    },
                )
            })
            .collect();
        Self { pins }
    }

    pub fn capability(&self, pin: PinId) -> PinCapability {
        match self.pins.get(&pin) {
            Some(cap) => *cap,
            None => PinCapability {
                pin,
                direction: pin.location().kind,
                last_known_level: None,
            },
        }
    }

    pub fn capabilities(&self) -> Vec<PinCapability> {
        self.pins.values().copied().collect()
    }

    /// Records a direction change, refusing outputs on input-only pins.
    pub fn set_direction(&mut self, pin: PinId, direction: PinDirection) -> Result<()> {
        if pin.is_input_only() && direction != PinDirection::Input {
            return Err(input_only_pin(pin));
        }
        let cap = self.entry(pin);
        cap.direction = direction;
        Ok(())
    }

    /// Checks that a level may be driven on `pin`.
    pub fn check_writable(&self, pin: PinId) -> Result<()> {
        if pin.is_input_only() {
            return Err(input_only_pin(pin));
        }
        if self.capability(pin).direction == PinDirection::Input {
            return Err(pin_not_output(pin));
        }
        Ok(())
    }

    /// Validates a batch and folds it into one masked write per group.
    ///
    /// Nothing is recorded; call [`PinBank::record_levels`] once the writes
    /// reached the hardware.
    pub fn plan_write(&self, levels: &BTreeMap<PinId, PinLevel>) -> Result<Vec<GroupWrite>> {
        let mut writes: Vec<GroupWrite> = Vec::new();
        for (&pin, &level) in levels {
            self.check_writable(pin)?;
            let group = pin.group();
            let bit = pin.mask();
            let idx = match writes.iter().position(|w| w.group == group) {
                Some(idx) => idx,
                None => {
                    writes.push(GroupWrite {
                        group,
                        mask: 0,
                        levels: 0,
                    });
                    writes.len() - 1
                }
            };
            let write = &mut writes[idx];
            write.mask |= bit;
            if level.is_high() {
                write.levels |= bit;
            }
        }
        Ok(writes)
    }

    pub fn record_level(&mut self, pin: PinId, level: PinLevel) {
        self.entry(pin).last_known_level = Some(level);
    }

    pub fn record_levels(&mut self, levels: &BTreeMap<PinId, PinLevel>) {
        for (&pin, &level) in levels {
            self.record_level(pin, level);
        }
    }

    fn entry(&mut self, pin: PinId) -> &mut PinCapability {
        self.pins.entry(pin).or_insert(PinCapability {
            pin,
            direction: pin.location().kind,
            last_known_level: None,
        })
    }
}
