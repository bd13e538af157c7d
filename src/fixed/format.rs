//! Packed operand sub-formats
//!
//! Instruction operands store fixed-point values with fewer integer and
//! fractional bits than the 18.14 working format. Unpacking sign-extends;
//! packing range-checks and refuses values the field cannot hold.
//!
//! Author: Moroya Sakamoto

use std::fmt;

use serde::{Deserialize, Serialize};

use super::FIXED_SHIFT;
use crate::error::EncodingError;

/// An `n.m` signed fixed-point field layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubFormat {
    /// Integer bits, including the sign bit
    pub integer_bits: u32,
    /// Fractional bits
    pub fractional_bits: u32,
}

impl SubFormat {
    /// Sphere centres and origin offsets
    pub const Q8_7: Self = Self::new(8, 7);
    /// Sphere radii
    pub const Q4_7: Self = Self::new(4, 7);
    /// Plane normal components
    pub const Q2_10: Self = Self::new(2, 10);
    /// Plane distances
    pub const Q8_12: Self = Self::new(8, 12);
    /// AABB bounds
    pub const Q8_1: Self = Self::new(8, 1);

    /// Create a format; the fractional part may not exceed the working precision
    pub const fn new(integer_bits: u32, fractional_bits: u32) -> Self {
        assert!(fractional_bits <= FIXED_SHIFT);
        assert!(integer_bits >= 1 && integer_bits + fractional_bits <= 31);
        Self {
            integer_bits,
            fractional_bits,
        }
    }

    /// Total field width in bits
    #[inline]
    pub const fn bits(self) -> u32 {
        self.integer_bits + self.fractional_bits
    }

    /// Mask covering the field
    #[inline]
    pub const fn mask(self) -> u32 {
        (1u32 << self.bits()) - 1
    }

    /// Pack an 18.14 value, dropping the surplus fractional bits
    pub fn pack(self, value: i32) -> Result<u32, EncodingError> {
        let mask = self.mask();
        let raw = (value >> (FIXED_SHIFT - self.fractional_bits)) as u32;
        let sign = (raw >> (self.bits() - 1)) & 1;
        let expected_high = if sign != 0 { !mask } else { 0 };
        if raw & !mask != expected_high {
            return Err(EncodingError::OutOfRange {
                value,
                format: self,
            });
        }
        Ok(raw & mask)
    }

    /// Unpack a field into 18.14, sign-extending
    ///
    /// Bits above the field width are ignored.
    #[inline]
    pub fn unpack(self, field: u32) -> i32 {
        let field = field & self.mask();
        let mut value = field << (FIXED_SHIFT - self.fractional_bits);
        if (field >> (self.bits() - 1)) & 1 != 0 {
            value |= !((1u32 << (self.integer_bits + FIXED_SHIFT)) - 1);
        }
        value as i32
    }

    /// Unpack the field found at `shift` in an instruction word
    #[inline]
    pub fn extract(self, word: u64, shift: u32) -> i32 {
        self.unpack((word >> shift) as u32)
    }

    /// Pack into the field at `shift` of an instruction word
    #[inline]
    pub fn insert(self, value: i32, shift: u32) -> Result<u64, EncodingError> {
        Ok((self.pack(value)? as u64) << shift)
    }

    /// Largest representable value, in 18.14
    pub const fn max_value(self) -> i32 {
        ((1i32 << (self.bits() - 1)) - 1) << (FIXED_SHIFT - self.fractional_bits)
    }

    /// Smallest representable value, in 18.14
    pub const fn min_value(self) -> i32 {
        -(1i32 << (self.bits() - 1)) << (FIXED_SHIFT - self.fractional_bits)
    }
}

impl fmt::Display for SubFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.integer_bits, self.fractional_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::to_fixed;

    #[test]
    fn test_widths() {
        assert_eq!(SubFormat::Q8_7.bits(), 15);
        assert_eq!(SubFormat::Q4_7.bits(), 11);
        assert_eq!(SubFormat::Q2_10.bits(), 12);
        assert_eq!(SubFormat::Q8_12.bits(), 20);
        assert_eq!(SubFormat::Q8_1.bits(), 9);
        assert_eq!(SubFormat::Q8_7.to_string(), "8.7");
    }

    #[test]
    fn test_sign_extension() {
        let f = SubFormat::Q8_7;
        let packed = f.pack(to_fixed(-3.5)).unwrap();
        assert_eq!(packed & !f.mask(), 0);
        assert_eq!(f.unpack(packed), to_fixed(-3.5));

        let n = SubFormat::Q2_10;
        assert_eq!(n.unpack(n.pack(to_fixed(-1.0)).unwrap()), to_fixed(-1.0));
    }

    #[test]
    fn test_pack_drops_fraction() {
        // 8.1 keeps half units only
        let f = SubFormat::Q8_1;
        assert_eq!(f.unpack(f.pack(to_fixed(2.75)).unwrap()), to_fixed(2.5));
    }

    #[test]
    fn test_pack_rejects_overflow() {
        let f = SubFormat::Q4_7;
        assert!(f.pack(to_fixed(7.5)).is_ok());
        assert!(matches!(
            f.pack(to_fixed(8.0)),
            Err(EncodingError::OutOfRange { .. })
        ));
        assert!(f.pack(to_fixed(-8.0)).is_ok());
        assert!(f.pack(to_fixed(-9.0)).is_err());
    }

    #[test]
    fn test_limits() {
        let f = SubFormat::Q8_7;
        assert_eq!(f.unpack(f.pack(f.max_value()).unwrap()), f.max_value());
        assert_eq!(f.unpack(f.pack(f.min_value()).unwrap()), f.min_value());
        assert!(f.pack(f.max_value() + (1 << 7)).is_err());
    }
}
