//! Fixed-point arithmetic kernel
//!
//! All engine arithmetic is signed 18.14 fixed point (scale 16384) held in
//! `i32`. Multiplies mirror the width of the hardware multipliers: the 64-bit
//! product is truncated to 40 bits (48 for the AABB path) before the shift,
//! so overflow wraps silently instead of failing.
//!
//! Reciprocal and square root use two Newton-Raphson iterations seeded from a
//! 31-entry table indexed by the leading-zero count of the operand.
//!
//! Author: Moroya Sakamoto

mod format;

pub use format::SubFormat;

use std::sync::OnceLock;

use glam::{I16Vec3, IVec3};
use serde::{Deserialize, Serialize};

use crate::error::MathsError;

/// Number of fractional bits
pub const FIXED_SHIFT: u32 = 14;

/// 1.0 in 18.14
pub const FIXED_ONE: i32 = 1 << FIXED_SHIFT;

/// 1.5 in 18.14, used by the Newton-Raphson step
const FIXED_ONE_AND_HALF: i32 = FIXED_ONE + (FIXED_ONE >> 1);

const MASK_40: i64 = 0x7F_FFFF_FFFF;
const MASK_48: i64 = 0x7FF_FFFF_FFFF;

// ============================================================================
// Conversions
// ============================================================================

/// Convert a float to 18.14 (truncating toward zero)
#[inline]
pub fn to_fixed(value: f32) -> i32 {
    (value * FIXED_ONE as f32) as i32
}

/// Convert 18.14 to a float
#[inline]
pub fn from_fixed(value: i32) -> f32 {
    value as f32 / FIXED_ONE as f32
}

/// Convert a float vector to 18.14 components
#[inline]
pub fn to_fixed_vec(v: glam::Vec3) -> IVec3 {
    IVec3::new(to_fixed(v.x), to_fixed(v.y), to_fixed(v.z))
}

/// Convert a 16-bit direction or normal back to floats
#[inline]
pub fn from_fixed_vec16(v: I16Vec3) -> glam::Vec3 {
    glam::Vec3::new(
        from_fixed(v.x as i32),
        from_fixed(v.y as i32),
        from_fixed(v.z as i32),
    )
}

// ============================================================================
// Multiply / divide
// ============================================================================

#[inline(always)]
fn truncate_magnitude(value: i64, mask: i64) -> i64 {
    if value >= 0 {
        value & mask
    } else {
        -((-value) & mask)
    }
}

/// Multiply with a 40-bit intermediate
#[inline(always)]
pub fn fixed_mul(a: i32, b: i32) -> i32 {
    (truncate_magnitude(a as i64 * b as i64, MASK_40) >> FIXED_SHIFT) as i32
}

/// Multiply with the wider intermediate of the AABB slab unit
#[inline(always)]
pub fn fixed_mul48(a: i32, b: i32) -> i32 {
    (truncate_magnitude(a as i64 * b as i64, MASK_48) >> FIXED_SHIFT) as i32
}

/// 16x16-bit multiply; returns 0 when either operand does not fit in 16 bits
#[inline(always)]
pub fn fixed_mul_16x16(a: i32, b: i32) -> i32 {
    checked_mul_16x16(a, b).unwrap_or(0)
}

/// Strict variant of [`fixed_mul_16x16`]
#[inline]
pub fn checked_mul_16x16(a: i32, b: i32) -> Result<i32, MathsError> {
    if a.unsigned_abs() > 0x7FFF || b.unsigned_abs() > 0x7FFF {
        return Err(MathsError::MulOperandRange(a, b));
    }
    Ok((a * b) >> FIXED_SHIFT)
}

/// Fixed-point divide, used only by host-side camera setup
#[inline]
pub fn fixed_div(a: i32, b: i32) -> i32 {
    if b == 0 {
        return if a < 0 { i32::MIN } else { i32::MAX };
    }
    (((a as i64) << FIXED_SHIFT) / b as i64) as i32
}

// ============================================================================
// Reciprocal / square root
// ============================================================================

fn rcp_sqrt_table() -> &'static [i32; 31] {
    static TABLE: OnceLock<[i32; 31]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0i32; 31];
        for i in 0..31u32 {
            // Midpoint between this power of two and the next
            let lower = if i > 0 { 1u32 << (i - 1) } else { 0 };
            let val = (1u32 << i) | lower;
            let actual = val as f32 / FIXED_ONE as f32;
            let root = (actual as f64).sqrt() as f32;
            table[30 - i as usize] = to_fixed(1.0 / root);
        }
        table
    })
}

#[inline(always)]
fn rcp_sqrt_seed(value: i32) -> i32 {
    // value > 0, so bit 31 is clear and leading_zeros is in 1..=31
    rcp_sqrt_table()[value.leading_zeros() as usize - 1]
}

/// Reciprocal square root; returns 0 for non-positive input
#[inline]
pub fn fixed_rcp_sqrt(value: i32) -> i32 {
    if value <= 0 {
        return 0;
    }
    let half = value >> 1;
    let mut out = rcp_sqrt_seed(value);
    for _ in 0..2 {
        let factor = FIXED_ONE_AND_HALF.wrapping_sub(fixed_mul(half, fixed_mul(out, out)));
        out = fixed_mul(out, factor);
    }
    out
}

/// Square root; returns 0 for non-positive input
#[inline]
pub fn fixed_sqrt(value: i32) -> i32 {
    fixed_mul(fixed_rcp_sqrt(value), value)
}

/// Strict variant of [`fixed_sqrt`]
pub fn checked_sqrt(value: i32) -> Result<i32, MathsError> {
    if value < 0 {
        return Err(MathsError::NegativeSqrt(value));
    }
    Ok(fixed_sqrt(value))
}

/// Reciprocal; returns `i32::MAX` for zero
#[inline]
pub fn fixed_rcp(value: i32) -> i32 {
    match value {
        0 => i32::MAX,
        v if v > 0 => {
            let r = fixed_rcp_sqrt(v);
            fixed_mul(r, r)
        }
        v => {
            let r = fixed_rcp_sqrt(v.wrapping_neg());
            fixed_mul(r, r).wrapping_neg()
        }
    }
}

/// Strict variant of [`fixed_rcp`]
pub fn checked_rcp(value: i32) -> Result<i32, MathsError> {
    if value == 0 {
        return Err(MathsError::DivideByZero);
    }
    Ok(fixed_rcp(value))
}

/// Which arithmetic policy a caller wants for the sentinel-producing operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathsPolicy {
    /// Sentinels instead of errors (hardware behaviour)
    #[default]
    Lenient,
    /// Report every sentinel case as an error
    Strict,
}

impl MathsPolicy {
    /// 16x16 multiply under this policy
    #[inline]
    pub fn mul_16x16(self, a: i32, b: i32) -> Result<i32, MathsError> {
        match self {
            Self::Lenient => Ok(fixed_mul_16x16(a, b)),
            Self::Strict => checked_mul_16x16(a, b),
        }
    }

    /// Reciprocal under this policy
    #[inline]
    pub fn rcp(self, value: i32) -> Result<i32, MathsError> {
        match self {
            Self::Lenient => Ok(fixed_rcp(value)),
            Self::Strict => checked_rcp(value),
        }
    }

    /// Square root under this policy
    #[inline]
    pub fn sqrt(self, value: i32) -> Result<i32, MathsError> {
        match self {
            Self::Lenient => Ok(fixed_sqrt(value)),
            Self::Strict => checked_sqrt(value),
        }
    }
}

// ============================================================================
// Vector helpers
// ============================================================================

/// Component-wise [`fixed_mul`]
#[inline(always)]
pub fn mul_vec(a: IVec3, b: IVec3) -> IVec3 {
    IVec3::new(fixed_mul(a.x, b.x), fixed_mul(a.y, b.y), fixed_mul(a.z, b.z))
}

/// Scale a vector by a scalar with [`fixed_mul`]
#[inline(always)]
pub fn scale_vec(v: IVec3, s: i32) -> IVec3 {
    IVec3::new(fixed_mul(v.x, s), fixed_mul(v.y, s), fixed_mul(v.z, s))
}

/// Dot product with [`fixed_mul`]
#[inline(always)]
pub fn dot(a: IVec3, b: IVec3) -> i32 {
    fixed_mul(a.x, b.x)
        .wrapping_add(fixed_mul(a.y, b.y))
        .wrapping_add(fixed_mul(a.z, b.z))
}

/// Dot product of two 16-bit vectors with [`fixed_mul_16x16`]
#[inline(always)]
pub fn dot16(a: I16Vec3, b: I16Vec3) -> i32 {
    fixed_mul_16x16(a.x as i32, b.x as i32)
        + fixed_mul_16x16(a.y as i32, b.y as i32)
        + fixed_mul_16x16(a.z as i32, b.z as i32)
}

/// Widen a 16-bit vector
#[inline(always)]
pub fn widen(v: I16Vec3) -> IVec3 {
    IVec3::new(v.x as i32, v.y as i32, v.z as i32)
}

/// Narrow to 16 bits, wrapping like a register truncation
#[inline(always)]
pub fn narrow(v: IVec3) -> I16Vec3 {
    I16Vec3::new(v.x as i16, v.y as i16, v.z as i16)
}

/// Negate a 16-bit vector with register wrap-around
#[inline(always)]
pub fn negate16(v: I16Vec3) -> I16Vec3 {
    I16Vec3::new(v.x.wrapping_neg(), v.y.wrapping_neg(), v.z.wrapping_neg())
}

/// Normalise an 18.14 vector; zero vectors are returned unchanged
pub fn normalise(v: IVec3) -> IVec3 {
    let len_sq = dot(v, v);
    if len_sq > 0 {
        scale_vec(v, fixed_rcp_sqrt(len_sq))
    } else {
        v
    }
}

/// Normalise a 16-bit vector using only 16x16 multiplies
///
/// Intermediates live in 16-bit registers, so this is only meaningful for
/// inputs of magnitude below about 1.4.
pub fn normalise_16bit(v: I16Vec3) -> I16Vec3 {
    let square = |c: i16| fixed_mul_16x16(c as i32, c as i32) as i16;
    let len_sq = square(v.x).wrapping_add(square(v.y)).wrapping_add(square(v.z));
    if len_sq > 0 {
        let scale = fixed_rcp_sqrt(len_sq as i32) as i16 as i32;
        I16Vec3::new(
            fixed_mul_16x16(v.x as i32, scale) as i16,
            fixed_mul_16x16(v.y as i32, scale) as i16,
            fixed_mul_16x16(v.z as i32, scale) as i16,
        )
    } else {
        v
    }
}
