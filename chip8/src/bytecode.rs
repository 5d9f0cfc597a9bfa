//! Helpers for extracting data from instruction words.
use std::fmt;

use crate::constants::Address;

/// A 16-bit instruction word, fetched big-endian from memory.
///
/// Operands live in fixed nibble positions:
///
/// ```text
/// 0xF000  op    opcode identity
/// 0x0F00  x     register Vx
/// 0x00F0  y     register Vy
/// 0x000F  n     4-bit immediate
/// 0x00FF  kk    8-bit immediate
/// 0x0FFF  nnn   12-bit address
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Combine two bytes into an instruction word, most significant first.
    #[inline(always)]
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    /// Extract the opcode identity from the upper nibble.
    #[inline(always)]
    pub fn op(self) -> u8 {
        ((self.0 & 0xF000) >> 12) as u8
    }

    /// Extract operand X as a register index.
    #[inline(always)]
    pub fn x(self) -> usize {
        ((self.0 & 0x0F00) >> 8) as usize
    }

    /// Extract operand Y as a register index.
    #[inline(always)]
    pub fn y(self) -> usize {
        ((self.0 & 0x00F0) >> 4) as usize
    }

    /// Extract operand N from the lowest nibble.
    #[inline(always)]
    pub fn n(self) -> u8 {
        (self.0 & 0x000F) as u8
    }

    /// Extract operand KK from the lowest byte.
    #[inline(always)]
    pub fn kk(self) -> u8 {
        (self.0 & 0x00FF) as u8
    }

    /// Extract operand NNN as an address.
    #[inline(always)]
    pub fn nnn(self) -> Address {
        self.0 & 0x0FFF
    }
}

impl From<u16> for Opcode {
    fn from(word: u16) -> Self {
        Self(word)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}
