//! Register widths, big-endian wire encoding and raw field extraction.

use crate::error::{Error, Result};

/// Byte width of a sensor register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterWidth {
    Bits16,
    Bits24,
    Bits40,
}

impl RegisterWidth {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            RegisterWidth::Bits16 => 2,
            RegisterWidth::Bits24 => 3,
            RegisterWidth::Bits40 => 5,
        }
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Largest unsigned value the register can hold.
    #[inline]
    pub fn max_value(self) -> u64 {
        (1u64 << self.bits()) - 1
    }

    /// Maps a byte count (2, 3 or 5) to a width.
    pub fn from_bytes(bytes: usize) -> Result<Self> {
        match bytes {
            2 => Ok(RegisterWidth::Bits16),
            3 => Ok(RegisterWidth::Bits24),
            5 => Ok(RegisterWidth::Bits40),
            other => Err(Error::ArgumentOutOfRange(format!(
                "register width must be 2, 3 or 5 bytes, got {}",
                other
            ))),
        }
    }
}

/// A register of a sensor: pointer address plus width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub address: u8,
    pub width: RegisterWidth,
}

impl Register {
    pub const fn new(address: u8, width: RegisterWidth) -> Self {
        Self { address, width }
    }
}

/// Decodes a big-endian register value (MSB first on the wire).
pub fn decode_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Encodes `value` big-endian into a buffer of the register's width.
pub fn encode_be(value: u64, width: RegisterWidth) -> Result<Vec<u8>> {
    if value > width.max_value() {
        return Err(Error::ArgumentOutOfRange(format!(
            "value 0x{:X} does not fit a {}-byte register",
            value,
            width.bytes()
        )));
    }
    let n = width.bytes();
    Ok((0..n).map(|i| (value >> (8 * (n - 1 - i))) as u8).collect())
}

/// Interprets the low `bits` bits of `raw` as a two's-complement number.
///
/// A value at or above half the range has the full range subtracted.
#[inline]
pub fn sign_extend(raw: u64, bits: u32) -> i64 {
    let masked = raw & ((1u64 << bits) - 1);
    if masked >= 1u64 << (bits - 1) {
        masked as i64 - (1i64 << bits)
    } else {
        masked as i64
    }
}

/// Location of a measurement field inside a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawField {
    /// Reserved or flag bits below the field.
    pub shift: u8,
    /// Width of the field after the shift.
    pub bits: u8,
    pub signed: bool,
}

impl RawField {
    pub const fn unsigned(shift: u8, bits: u8) -> Self {
        Self {
            shift,
            bits,
            signed: false,
        }
    }

    pub const fn signed(shift: u8, bits: u8) -> Self {
        Self {
            shift,
            bits,
            signed: true,
        }
    }

    /// Drops the reserved low bits, masks the field and sign-extends if needed.
    pub fn extract(&self, raw: u64) -> i64 {
        let value = raw >> self.shift;
        if self.signed {
            sign_extend(value, self.bits as u32)
        } else {
            (value & ((1u64 << self.bits) - 1)) as i64
        }
    }
}
