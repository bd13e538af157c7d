//! Per-pixel ray orchestration
//!
//! A pixel is shaded by up to four sequential phases, each one run of the
//! program on a [`RayTracer`]:
//!
//! ```text
//! Primary ──hit──▶ PrimaryShadow (only if the surface faces the light)
//!    │                  │
//!    └──reflective──────┴──▶ Secondary ──hit──▶ SecondaryShadow
//! ```
//!
//! Surfaces facing away from the light are presumed shadowed without
//! tracing. A phase whose ray would start outside the trace bound is skipped
//! and reports no hit.
//!
//! Author: Moroya Sakamoto

pub mod colour;
pub mod rays;

pub use colour::{blend, branch_rate_colour, lit_colour, sky_colour, specular};
pub use rays::{reflect, reflection_ray, shadow_ray, within_bounds};

use glam::{I16Vec3, IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::engine::{PerfCounters, RayOutcome, RayTracer};
use crate::error::EngineError;
use crate::fixed::{dot16, narrow, normalise, to_fixed, to_fixed_vec};
use crate::isa::Program;
use crate::types::{Ray, RayKind, RegisteredHit, Rgb8};

/// One pass of the pixel state machine; phases are the four ray kinds
pub type Phase = RayKind;

// ============================================================================
// Configuration
// ============================================================================

/// Lighting and debug options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadeConfig {
    /// Unit vector pointing towards the light (2.14)
    pub light_direction: I16Vec3,
    /// Rays starting further than this from the origin on any axis are not traced
    pub trace_bound: f32,
    /// Replace the pixel colour with the branch prediction hit rate
    pub show_branch_hit_rate: bool,
}

impl Default for ShadeConfig {
    fn default() -> Self {
        Self {
            light_direction: light_direction(Vec3::new(0.5, -1.0, -0.5)),
            trace_bound: 40.0,
            show_branch_hit_rate: false,
        }
    }
}

impl ShadeConfig {
    /// Default lighting with the branch prediction debug view
    pub fn debug_branches() -> Self {
        Self {
            show_branch_hit_rate: true,
            ..Self::default()
        }
    }

    /// Same options with the light moved to `direction`
    pub fn with_light(mut self, direction: Vec3) -> Self {
        self.light_direction = light_direction(direction);
        self
    }
}

/// Normalise a float direction into a 16-bit light vector
pub fn light_direction(direction: Vec3) -> I16Vec3 {
    narrow(normalise(to_fixed_vec(direction)))
}

// ============================================================================
// Result
// ============================================================================

/// Everything the state machine produced for one pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelResult {
    /// Final colour
    pub colour: Rgb8,
    /// Registered hit of each phase, indexed by [`RayKind::index`]
    pub hits: [RegisteredHit; 4],
    /// Whether each phase actually ran
    pub traced: [bool; 4],
    /// Primary hit is in shadow, traced or presumed
    pub primary_shadowed: bool,
    /// Reflected hit is in shadow, traced or presumed
    pub secondary_shadowed: bool,
    /// Counters summed over every traced phase
    pub counters: PerfCounters,
}

impl PixelResult {
    /// Registered hit of `phase`; not present if the phase did not run
    #[inline]
    pub fn hit(&self, phase: Phase) -> &RegisteredHit {
        &self.hits[phase.index()]
    }

    /// Whether `phase` ran on a tracer
    #[inline]
    pub fn was_traced(&self, phase: Phase) -> bool {
        self.traced[phase.index()]
    }

    fn record(&mut self, phase: Phase, outcome: &RayOutcome) {
        self.hits[phase.index()] = outcome.hit;
        self.traced[phase.index()] = true;
        self.counters.accumulate(&outcome.counters);
    }
}

// ============================================================================
// State machine
// ============================================================================

/// Run one phase, or skip it when the ray starts out of bounds
fn run_phase<R: RayTracer + ?Sized>(
    tracer: &mut R,
    program: &Program,
    ray: &Ray,
    phase: Phase,
    bound: i32,
    result: &mut PixelResult,
) -> Result<RegisteredHit, EngineError> {
    if !within_bounds(ray.origin, bound) {
        if phase == Phase::Primary {
            log::warn!("camera ray starts out of bounds at {:?}, not traced", ray.origin);
        } else {
            log::debug!("{phase:?} ray starts out of bounds at {:?}, skipped", ray.origin);
        }
        return Ok(RegisteredHit::default());
    }

    let outcome = tracer.trace(program, ray, phase)?;
    log::debug!(
        "{phase:?}: {} after {} cycles",
        if outcome.hit.present { "hit" } else { "miss" },
        outcome.counters.cycles
    );
    result.record(phase, &outcome);
    Ok(outcome.hit)
}

/// Shadow status of `hit`, tracing an occlusion ray only when it faces the light
fn occluded<R: RayTracer + ?Sized>(
    tracer: &mut R,
    program: &Program,
    hit: &RegisteredHit,
    phase: Phase,
    config: &ShadeConfig,
    result: &mut PixelResult,
) -> Result<bool, EngineError> {
    let light = config.light_direction;
    if dot16(hit.normal, light) > 0 {
        let ray = shadow_ray(hit, light);
        let blocker = run_phase(tracer, program, &ray, phase, to_fixed(config.trace_bound), result)?;
        Ok(blocker.present)
    } else {
        Ok(true)
    }
}

/// Shade one pixel whose camera ray starts at `origin` along `direction`
///
/// `direction` must already be normalised to 2.14.
pub fn shade_pixel<R: RayTracer + ?Sized>(
    tracer: &mut R,
    program: &Program,
    origin: IVec3,
    direction: I16Vec3,
    config: &ShadeConfig,
) -> Result<PixelResult, EngineError> {
    let light = config.light_direction;
    let bound = to_fixed(config.trace_bound);
    let mut result = PixelResult::default();

    let primary_ray = Ray::new(origin, direction);
    let primary = run_phase(tracer, program, &primary_ray, Phase::Primary, bound, &mut result)?;

    let mut colour = if primary.present {
        result.primary_shadowed =
            occluded(tracer, program, &primary, Phase::PrimaryShadow, config, &mut result)?;
        lit_colour(&primary, light, result.primary_shadowed, Some(direction))
    } else {
        sky_colour(direction, light)
    };

    let reflectiveness = primary.material.reflectiveness;
    if primary.present && reflectiveness > 0 {
        let ray = reflection_ray(&primary, direction);
        let secondary = run_phase(tracer, program, &ray, Phase::Secondary, bound, &mut result)?;
        let reflected = if secondary.present {
            result.secondary_shadowed =
                occluded(tracer, program, &secondary, Phase::SecondaryShadow, config, &mut result)?;
            lit_colour(&secondary, light, result.secondary_shadowed, None)
        } else {
            sky_colour(ray.direction, light)
        };
        colour = blend(colour, reflected, reflectiveness);
    }

    if config.show_branch_hit_rate {
        colour = branch_rate_colour(&result.counters);
    }
    result.colour = colour;
    Ok(result)
}

/// A tracer bundled with its shading options
///
/// Owning the tracer keeps the engine's prediction table warm from pixel to
/// pixel, the way one hardware ray unit would see consecutive rays.
#[derive(Debug, Clone, Default)]
pub struct PixelTracer<R: RayTracer> {
    tracer: R,
    config: ShadeConfig,
}

impl<R: RayTracer> PixelTracer<R> {
    /// Wrap `tracer`
    pub fn new(tracer: R, config: ShadeConfig) -> Self {
        Self { tracer, config }
    }

    /// Shading options
    #[inline]
    pub fn config(&self) -> &ShadeConfig {
        &self.config
    }

    /// Underlying backend
    #[inline]
    pub fn tracer(&self) -> &R {
        &self.tracer
    }

    /// Mutable access to the backend
    #[inline]
    pub fn tracer_mut(&mut self) -> &mut R {
        &mut self.tracer
    }

    /// Unwrap the backend
    pub fn into_inner(self) -> R {
        self.tracer
    }

    /// Shade one pixel
    pub fn shade(&mut self, program: &Program, origin: IVec3, direction: I16Vec3) -> Result<PixelResult, EngineError> {
        shade_pixel(&mut self.tracer, program, origin, direction, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::Emulator;
    use crate::engine::Engine;
    use crate::fixed::FIXED_ONE;
    use crate::isa::{CsgOp, Instruction};
    use crate::types::Material;

    const ONE: i16 = FIXED_ONE as i16;

    fn overhead_light() -> ShadeConfig {
        ShadeConfig {
            light_direction: I16Vec3::new(0, -ONE, 0),
            ..ShadeConfig::default()
        }
    }

    /// Floor at y = 1 facing -y, optionally with a ball hovering over (0, 1, 1)
    fn floor_scene(with_blocker: bool) -> Program {
        let mut code = vec![
            Instruction::start(),
            Instruction::plane(CsgOp::Add, Vec3::new(0.0, -1.0, 0.0), -1.0),
            Instruction::register_hit(Material::WHITE),
        ];
        if with_blocker {
            code.push(Instruction::sphere(CsgOp::Add, Vec3::new(0.0, 0.0, 1.0), 0.3));
            code.push(Instruction::register_hit(Material::WHITE));
        }
        code.push(Instruction::end());
        Program::from_instructions(&code).unwrap()
    }

    fn down_and_forward() -> I16Vec3 {
        I16Vec3::new(0, 11585, 11585)
    }

    #[test]
    fn test_miss_is_sky() {
        let program = Program::from_instructions(&[Instruction::start(), Instruction::end()]).unwrap();
        let config = overhead_light();
        let dir = I16Vec3::new(0, 0, ONE);
        let result = shade_pixel(&mut Emulator::new(), &program, IVec3::ZERO, dir, &config).unwrap();
        assert_eq!(result.colour, sky_colour(dir, config.light_direction));
        assert!(result.was_traced(Phase::Primary));
        assert!(!result.was_traced(Phase::PrimaryShadow));
        assert!(!result.hit(Phase::Primary).present);
    }

    #[test]
    fn test_unshadowed_floor() {
        let config = overhead_light();
        let result = shade_pixel(
            &mut Emulator::new(),
            &floor_scene(false),
            IVec3::ZERO,
            down_and_forward(),
            &config,
        )
        .unwrap();
        assert!(result.hit(Phase::Primary).present);
        assert!(result.was_traced(Phase::PrimaryShadow));
        assert!(!result.primary_shadowed);
        assert_eq!(result.colour, Rgb8::new(255, 255, 255));
    }

    #[test]
    fn test_blocker_casts_shadow() {
        let config = overhead_light();
        let result = shade_pixel(
            &mut Emulator::new(),
            &floor_scene(true),
            IVec3::ZERO,
            down_and_forward(),
            &config,
        )
        .unwrap();
        assert!(result.primary_shadowed);
        assert!(result.hit(Phase::PrimaryShadow).present);
        assert_eq!(result.colour, Rgb8::new(31, 31, 31));
    }

    #[test]
    fn test_mirror_reflects_sky() {
        let mirror = Material {
            reflectiveness: 255,
            ..Material::WHITE
        };
        let program = Program::from_instructions(&[
            Instruction::start(),
            Instruction::sphere(CsgOp::Add, Vec3::new(0.0, 0.0, 5.0), 1.0),
            Instruction::register_hit(mirror),
            Instruction::end(),
        ])
        .unwrap();
        let config = overhead_light();
        let result = shade_pixel(
            &mut Emulator::new(),
            &program,
            IVec3::ZERO,
            I16Vec3::new(0, 0, ONE),
            &config,
        )
        .unwrap();

        // Side-on to the light: presumed shadowed, no occlusion ray
        assert!(result.primary_shadowed);
        assert!(!result.was_traced(Phase::PrimaryShadow));
        assert!(result.was_traced(Phase::Secondary));
        assert!(!result.hit(Phase::Secondary).present);
        // Black primary blended fully with a horizontal sky
        assert_eq!(result.colour, Rgb8::new(127, 127, 189));
    }

    #[test]
    fn test_out_of_bounds_camera_not_traced() {
        let program = floor_scene(false);
        let config = overhead_light();
        let dir = down_and_forward();
        let result = shade_pixel(
            &mut Emulator::new(),
            &program,
            IVec3::new(0, 0, to_fixed(50.0)),
            dir,
            &config,
        )
        .unwrap();
        assert_eq!(result.traced, [false; 4]);
        assert_eq!(result.counters, PerfCounters::default());
        assert_eq!(result.colour, sky_colour(dir, config.light_direction));
    }

    #[test]
    fn test_debug_view_without_branches_is_black() {
        let config = ShadeConfig {
            light_direction: overhead_light().light_direction,
            ..ShadeConfig::debug_branches()
        };
        let mut tracer = PixelTracer::new(Engine::new(), config);
        let result = tracer
            .shade(&floor_scene(true), IVec3::ZERO, down_and_forward())
            .unwrap();
        assert_eq!(result.colour, Rgb8::BLACK);
        assert!(result.counters.cycles > 0);
    }

    #[test]
    fn test_backends_shade_identically() {
        let config = overhead_light();
        let program = floor_scene(true);
        let mut engine = PixelTracer::new(Engine::new(), config);
        let mut emulator = PixelTracer::new(Emulator::new(), config);
        for dir in [down_and_forward(), I16Vec3::new(0, 0, ONE), I16Vec3::new(0, ONE, 0)] {
            let a = engine.shade(&program, IVec3::ZERO, dir).unwrap();
            let b = emulator.shade(&program, IVec3::ZERO, dir).unwrap();
            assert_eq!(a.colour, b.colour);
            assert_eq!(a.hits, b.hits);
        }
    }

    #[test]
    fn test_default_light_is_unit_length() {
        let light = ShadeConfig::default().light_direction;
        let len_sq = dot16(light, light);
        assert!((len_sq - FIXED_ONE).abs() < FIXED_ONE / 20);
        assert!(light.y < 0);

        let moved = ShadeConfig::default().with_light(Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(moved.light_direction.x, 0);
        assert!(moved.light_direction.z > 0);
    }
}
