//! Core data types shared by the engine, the emulator and orchestration
//!
//! Author: Moroya Sakamoto

use glam::{I16Vec3, IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::fixed::{self, fixed_rcp, to_fixed_vec};

// ============================================================================
// Rays
// ============================================================================

/// Fixed-point ray as seen by the engine's uniform registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ray {
    /// Start point (18.14)
    pub origin: IVec3,
    /// Unit direction (2.14 in 16 bits)
    pub direction: I16Vec3,
    /// Per-axis reciprocal of the direction, used by the slab test
    pub direction_rcp: IVec3,
}

impl Ray {
    /// Create a ray; the direction is expected to be normalised already
    #[inline]
    pub fn new(origin: IVec3, direction: I16Vec3) -> Self {
        Self {
            origin,
            direction,
            direction_rcp: IVec3::new(
                fixed_rcp(direction.x as i32),
                fixed_rcp(direction.y as i32),
                fixed_rcp(direction.z as i32),
            ),
        }
    }

    /// Create a ray from float inputs
    ///
    /// The direction is normalised in float and quantised once to 2.14.
    /// Re-normalising the quantised vector through the hardware rsqrt would
    /// shorten it by the seed error.
    pub fn from_f32(origin: Vec3, direction: Vec3) -> Self {
        let d = direction.normalize_or_zero();
        let d16 = I16Vec3::new(
            fixed::to_fixed(d.x) as i16,
            fixed::to_fixed(d.y) as i16,
            fixed::to_fixed(d.z) as i16,
        );
        Self::new(to_fixed_vec(origin), d16)
    }

    /// Point at `depth` along the ray
    #[inline]
    pub fn at(&self, depth: i32) -> IVec3 {
        let d = fixed::widen(self.direction);
        self.origin.wrapping_add(fixed::scale_vec(d, depth))
    }
}

/// Ray classification; selects one of four branch-prediction histories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RayKind {
    /// Camera ray
    #[default]
    Primary,
    /// Occlusion ray from a primary hit
    PrimaryShadow,
    /// Reflection ray
    Secondary,
    /// Occlusion ray from a reflection hit
    SecondaryShadow,
}

impl RayKind {
    /// Occlusion rays stop at the first registered hit
    #[inline]
    pub fn is_shadow(self) -> bool {
        matches!(self, Self::PrimaryShadow | Self::SecondaryShadow)
    }

    /// Reflection rays and their shadows
    #[inline]
    pub fn is_secondary(self) -> bool {
        matches!(self, Self::Secondary | Self::SecondaryShadow)
    }

    /// Every kind, in phase order
    pub const ALL: [Self; 4] = [
        Self::Primary,
        Self::PrimaryShadow,
        Self::Secondary,
        Self::SecondaryShadow,
    ];

    /// Position in [`RayKind::ALL`]
    #[inline]
    pub fn index(self) -> usize {
        ((self.is_secondary() as usize) << 1) | self.is_shadow() as usize
    }

    /// Bit within a prediction-table byte that belongs to this kind
    #[inline]
    pub fn prediction_mask(self) -> u8 {
        1 << self.index()
    }
}

// ============================================================================
// Materials and hits
// ============================================================================

/// Surface properties attached by `RegisterHit` and `Checkerboard`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Material {
    /// RGB555, red in the low bits
    pub albedo: u16,
    /// 0 = matte, 255 = mirror
    pub reflectiveness: u8,
}

impl Material {
    /// Pure white, non-reflective
    pub const WHITE: Self = Self {
        albedo: 0x7FFF,
        reflectiveness: 0,
    };

    /// Build from 8-bit channels, dropping the low three bits of each
    pub const fn from_rgb(r: u8, g: u8, b: u8, reflectiveness: u8) -> Self {
        Self {
            albedo: (r as u16 >> 3) | ((g as u16 >> 3) << 5) | ((b as u16 >> 3) << 10),
            reflectiveness,
        }
    }

    /// Expand the albedo back to 8-bit channels
    #[inline]
    pub fn rgb(&self) -> [i32; 3] {
        let a = self.albedo as i32;
        [(a & 0x1F) << 3, ((a >> 5) & 0x1F) << 3, ((a >> 10) & 0x1F) << 3]
    }
}

/// Nearest hit registered for one ray
///
/// Position and normal keep their last values when `present` is false, exactly
/// like the hardware registers; compare `present` first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredHit {
    /// A hit was registered during the run
    pub present: bool,
    /// Depth along the ray (18.14)
    pub depth: i32,
    /// World-space hit point
    pub position: IVec3,
    /// Surface normal at the hit
    pub normal: I16Vec3,
    /// Surface material
    pub material: Material,
}

/// 8-bit RGB colour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb8 {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl Rgb8 {
    /// Black
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };

    /// Create a colour
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Saturate each channel into a byte
    #[inline]
    pub fn saturating(r: i32, g: i32, b: i32) -> Self {
        let c = |v: i32| v.clamp(0, 255) as u8;
        Self::new(c(r), c(g), c(b))
    }

    /// Channels as an array
    #[inline]
    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}
