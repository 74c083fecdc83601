//! Exact sizes and offsets. Everything is counted in bits so that sub-byte fields
//! add up without rounding; byte views are derived on demand.

use crate::error::TranscodeError;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

/// A size or offset measured in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size(usize);

impl Size {
    pub const ZERO: Size = Size(0);

    pub const fn from_bits(bits: usize) -> Self {
        Size(bits)
    }

    pub const fn from_bytes(bytes: usize) -> Self {
        Size(bytes * 8)
    }

    /// Like [`Size::from_bytes`] for byte counts read from data: a count too large to
    /// express in bits is `ValueOutOfRange` instead of an overflow.
    pub fn try_from_bytes(bytes: usize) -> Result<Self, TranscodeError> {
        bytes.checked_mul(8).map(Size).ok_or_else(|| TranscodeError::ValueOutOfRange {
            value: format!("{} bytes", bytes),
            bits: usize::BITS as usize,
        })
    }

    /// Checked addition for running offsets.
    pub fn try_add(self, rhs: Size) -> Result<Self, TranscodeError> {
        self.0.checked_add(rhs.0).map(Size).ok_or_else(|| TranscodeError::ValueOutOfRange {
            value: format!("{} + {} bits", self.0, rhs.0),
            bits: usize::BITS as usize,
        })
    }

    pub const fn bits(self) -> usize {
        self.0
    }

    /// Number of complete bytes.
    pub const fn whole_bytes(self) -> usize {
        self.0 / 8
    }

    /// Bits past the last complete byte (0..8).
    pub const fn remainder_bits(self) -> usize {
        self.0 % 8
    }

    /// Bytes needed to hold this many bits.
    pub const fn byte_len(self) -> usize {
        self.0.div_ceil(8)
    }

    pub const fn is_byte_aligned(self) -> bool {
        self.0 % 8 == 0
    }

    /// Size in bytes, fractional when the size ends mid-byte.
    pub fn as_bytes_f64(self) -> f64 {
        self.0 as f64 / 8.0
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, rhs: Size) -> Size {
        Size(self.0 + rhs.0)
    }
}

impl AddAssign for Size {
    fn add_assign(&mut self, rhs: Size) {
        self.0 += rhs.0;
    }
}

impl Sub for Size {
    type Output = Size;

    fn sub(self, rhs: Size) -> Size {
        Size(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Size {
    fn sum<I: Iterator<Item = Size>>(iter: I) -> Size {
        iter.fold(Size::ZERO, |acc, s| acc + s)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_byte_aligned() {
            write!(f, "{} bytes", self.whole_bytes())
        } else {
            write!(f, "{} bytes + {} bits", self.whole_bytes(), self.remainder_bits())
        }
    }
}
