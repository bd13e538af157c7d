//! Hit accumulation and registration
//!
//! [`HitState`] is the commit-stage register file: the CSG accumulator for the
//! object currently being built, the registered (nearest) hit for the ray, and
//! the flag read by the `ORH` condition. The engine and the emulator both drive
//! it through the same methods, so their final results cannot drift apart.
//!
//! Sub and And only handle whole, front and rear clips. Cutting the interior
//! out of an interval is not representable with a single entry/exit pair and is
//! left as a known limitation.
//!
//! Author: Moroya Sakamoto

use glam::{I16Vec3, IVec3};
use serde::{Deserialize, Serialize};

use crate::fixed::{negate16, FIXED_SHIFT};
use crate::intersect::Interval;
use crate::isa::{Condition, CsgOp};
use crate::types::{Material, Ray, RegisteredHit};

/// Running CSG interval for the object under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitAccumulator {
    /// Entry depth
    pub entry: i32,
    /// Exit depth
    pub exit: i32,
    /// Normal at the entry point
    pub normal: I16Vec3,
}

impl Default for HitAccumulator {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl HitAccumulator {
    /// No current hit
    pub const EMPTY: Self = Self {
        entry: Interval::FAR,
        exit: 0,
        normal: I16Vec3::ZERO,
    };

    /// Currently hit
    #[inline]
    pub fn is_hit(&self) -> bool {
        self.entry < self.exit
    }

    /// Clear the depth range, keeping the stale normal like the hardware does
    #[inline]
    pub fn clear(&mut self) {
        self.entry = Interval::FAR;
        self.exit = 0;
    }

    /// Merge a primitive's interval
    pub fn merge(&mut self, op: CsgOp, new: &Interval) {
        match op {
            CsgOp::Add => {
                if !new.is_hit() {
                    return;
                }
                if !self.is_hit() {
                    self.entry = new.entry;
                    self.exit = new.exit;
                    self.normal = new.entry_normal;
                    return;
                }
                if new.entry < self.entry {
                    self.entry = new.entry;
                    self.normal = new.entry_normal;
                }
                if new.exit > self.exit {
                    self.exit = new.exit;
                }
            }
            CsgOp::Sub => {
                if !self.is_hit() {
                    return;
                }
                if new.entry <= self.entry && new.exit >= self.exit {
                    self.clear();
                } else if new.entry < self.entry && new.exit > self.entry && new.exit <= self.exit {
                    // Front clip: the cut face looks back out of the subtracted volume
                    self.entry = new.exit;
                    self.normal = negate16(new.exit_normal);
                } else if new.entry > self.entry && new.entry < self.exit && new.exit >= self.exit {
                    self.exit = new.entry;
                }
            }
            CsgOp::And => {
                if !self.is_hit() {
                    return;
                }
                if !new.is_hit() {
                    self.clear();
                    return;
                }
                if new.entry > self.entry {
                    self.entry = new.entry;
                    self.normal = new.entry_normal;
                }
                if new.exit < self.exit {
                    self.exit = new.exit;
                }
            }
        }
    }
}

/// Commit-stage hit registers for one ray
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitState {
    /// CSG accumulator
    pub accumulator: HitAccumulator,
    /// World-space point at the accumulator's entry depth
    pub hit_point: IVec3,
    /// Nearest registered hit
    pub registered: RegisteredHit,
    /// The most recent executed `RegisterHit` won its Z-test
    pub registered_this_object: bool,
}

impl HitState {
    /// Evaluate an instruction condition against the current registers
    #[inline]
    pub fn condition_holds(&self, condition: Condition) -> bool {
        match condition {
            Condition::Always => true,
            Condition::OnHit => self.accumulator.is_hit(),
            Condition::NoHit => !self.accumulator.is_hit(),
            Condition::OnRegisteredHit => self.registered_this_object,
        }
    }

    /// `Start`: forget everything about the previous ray
    pub fn start(&mut self) {
        self.accumulator.clear();
        self.registered_this_object = false;
        self.registered.present = false;
    }

    /// `ResetHitState`
    #[inline]
    pub fn reset_accumulator(&mut self) {
        self.accumulator.clear();
    }

    /// Merge a geometry result and refresh the hit point
    pub fn merge(&mut self, op: CsgOp, interval: &Interval, ray: &Ray) {
        self.accumulator.merge(op, interval);
        self.hit_point = ray.at(self.accumulator.entry);
    }

    /// `Checkerboard`: overwrite the registered material on odd tiles
    pub fn checkerboard(&mut self, material: Material) {
        let tile = ((self.hit_point.x >> FIXED_SHIFT) & 1) ^ ((self.hit_point.z >> FIXED_SHIFT) & 1);
        if tile != 0 {
            self.registered.material = material;
        }
    }

    /// `RegisterHit`: nearest-wins Z-test of the accumulator
    ///
    /// Returns true when the registered hit was replaced. The accumulator is
    /// cleared afterwards if `reset` is set and there was something to test.
    pub fn register(&mut self, material: Material, reset: bool) -> bool {
        self.registered_this_object = false;
        if !self.accumulator.is_hit() {
            return false;
        }

        let won = !self.registered.present || self.accumulator.entry < self.registered.depth;
        if won {
            self.registered = RegisteredHit {
                present: true,
                depth: self.accumulator.entry,
                position: self.hit_point,
                normal: self.accumulator.normal,
                material,
            };
            self.registered_this_object = true;
        }
        if reset {
            self.accumulator.clear();
        }
        won
    }
}
