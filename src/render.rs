//! Frame rendering
//!
//! Generates one camera ray per pixel and shades every pixel through
//! [`shade_pixel`](crate::shade::shade_pixel). Rows are distributed over the
//! rayon pool; each worker builds its own tracer, so engine prediction tables
//! are never shared between threads.
//!
//! Author: Moroya Sakamoto

use glam::{I16Vec3, IVec3, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::emulator::{Emulator, EmulatorConfig};
use crate::engine::{Engine, EngineConfig, PerfCounters, RayOutcome, RayTracer};
use crate::error::EngineError;
use crate::fixed::{fixed_div, fixed_mul, narrow, normalise, normalise_16bit, to_fixed, to_fixed_vec, FIXED_ONE};
use crate::isa::Program;
use crate::shade::{PixelResult, PixelTracer, ShadeConfig};
use crate::types::{Ray, RayKind, Rgb8};

// ============================================================================
// Camera
// ============================================================================

/// Pinhole camera rotating about the vertical axis
///
/// The y axis points down the screen: the top row looks towards negative y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Eye position
    pub position: Vec3,
    /// Rotation about y, in degrees
    pub yaw_degrees: f32,
    /// Half the field of view, in degrees
    pub half_fov_degrees: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.375, 0.0),
            yaw_degrees: 0.0,
            half_fov_degrees: 45.0,
        }
    }
}

impl Camera {
    /// Camera at `position` looking along +z
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Same camera turned to `yaw_degrees`
    pub fn with_yaw(mut self, yaw_degrees: f32) -> Self {
        self.yaw_degrees = yaw_degrees;
        self
    }

    /// Eye position in 18.14
    #[inline]
    pub fn origin(&self) -> IVec3 {
        to_fixed_vec(self.position)
    }

    fn rotate(&self, v: IVec3) -> IVec3 {
        let (sin, cos) = self.yaw_degrees.to_radians().sin_cos();
        let (sin, cos) = (to_fixed(sin), to_fixed(cos));
        IVec3::new(
            fixed_mul(v.x, cos) + fixed_mul(v.z, sin),
            v.y,
            fixed_mul(v.z, cos) - fixed_mul(v.x, sin),
        )
    }

    /// Normalised camera ray directions, row-major
    ///
    /// Directions are stepped across the frustum in 16-bit registers the way
    /// the scan-out hardware does, then renormalised per pixel.
    pub fn ray_directions(&self, width: usize, height: usize) -> Vec<I16Vec3> {
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let extent = self.half_fov_degrees.to_radians().tan() * 0.5;
        let corner = |x: f32, y: f32| {
            self.rotate(normalise(IVec3::new(to_fixed(x), to_fixed(y), FIXED_ONE)))
        };
        let top_left = corner(-extent, -extent);
        let top_right = corner(extent, -extent);
        let bottom_left = corner(-extent, extent);

        let step = |to: IVec3, count: usize| {
            let span = to - top_left;
            let n = to_fixed(count as f32);
            narrow(IVec3::new(fixed_div(span.x, n), fixed_div(span.y, n), fixed_div(span.z, n)))
        };
        let x_step = step(top_right, width);
        let y_step = step(bottom_left, height);

        let mut directions = Vec::with_capacity(width * height);
        let mut row_start = narrow(top_left);
        for _ in 0..height {
            let mut dir = row_start;
            for _ in 0..width {
                directions.push(normalise_16bit(dir));
                dir = dir.wrapping_add(x_step);
            }
            row_start = row_start.wrapping_add(y_step);
        }
        directions
    }
}

// ============================================================================
// Backends
// ============================================================================

/// Which tracer implementation renders the frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Cycle-accurate pipeline
    Engine,
    /// Fast functional emulator
    #[default]
    Emulator,
}

/// Either backend behind one [`RayTracer`]
#[derive(Debug, Clone)]
enum BackendTracer {
    Engine(Engine),
    Emulator(Emulator),
}

impl BackendTracer {
    fn new(config: &RenderConfig) -> Self {
        match config.backend {
            Backend::Engine => Self::Engine(Engine::with_config(config.engine)),
            Backend::Emulator => Self::Emulator(Emulator::with_config(config.emulator)),
        }
    }
}

impl RayTracer for BackendTracer {
    fn trace(&mut self, program: &Program, ray: &Ray, kind: RayKind) -> Result<RayOutcome, EngineError> {
        match self {
            Self::Engine(engine) => engine.run(program, ray, kind),
            Self::Emulator(emulator) => emulator.run(program, ray, kind),
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Frame rendering options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Tracer implementation
    pub backend: Backend,
    /// Lighting and debug view
    pub shade: ShadeConfig,
    /// Limits for the engine backend
    pub engine: EngineConfig,
    /// Limits for the emulator backend
    pub emulator: EmulatorConfig,
    /// Distribute rows over the rayon pool
    pub parallel: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            shade: ShadeConfig::default(),
            engine: EngineConfig::default(),
            emulator: EmulatorConfig::default(),
            parallel: true,
        }
    }
}

impl RenderConfig {
    /// Cycle-accurate rendering
    pub fn cycle_accurate() -> Self {
        Self {
            backend: Backend::Engine,
            ..Self::default()
        }
    }

    /// Single-threaded rendering with the given backend
    pub fn sequential(backend: Backend) -> Self {
        Self {
            backend,
            parallel: false,
            ..Self::default()
        }
    }
}

/// Rendered image plus the work it took
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// Row-major colours
    pub pixels: Vec<Rgb8>,
    /// Counters summed over every pixel
    pub counters: PerfCounters,
}

impl Frame {
    /// Colour at `(x, y)`
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb8> {
        if x >= self.width {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// Packed RGB bytes, row-major
    pub fn rgb_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| p.to_array()).collect()
    }
}

/// Shade every pixel, returning the full per-pixel results
pub fn render_pixels(
    program: &Program,
    camera: &Camera,
    width: usize,
    height: usize,
    config: &RenderConfig,
) -> Result<Vec<PixelResult>, EngineError> {
    let origin = camera.origin();
    let directions = camera.ray_directions(width, height);
    if directions.is_empty() {
        return Ok(Vec::new());
    }
    let make_tracer = || PixelTracer::new(BackendTracer::new(config), config.shade);

    if config.parallel {
        let rows = directions
            .par_chunks(width)
            .map_init(make_tracer, |tracer, row| {
                row.iter()
                    .map(|&dir| tracer.shade(program, origin, dir))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().flatten().collect())
    } else {
        let mut tracer = make_tracer();
        directions
            .iter()
            .map(|&dir| tracer.shade(program, origin, dir))
            .collect()
    }
}

/// Render a `width` x `height` frame of `program`
pub fn render_frame(
    program: &Program,
    camera: &Camera,
    width: usize,
    height: usize,
    config: &RenderConfig,
) -> Result<Frame, EngineError> {
    let results = render_pixels(program, camera, width, height, config)?;
    let counters: PerfCounters = results.iter().map(|r| r.counters).sum();
    log::debug!(
        "rendered {width}x{height} with {:?}: {} cycles, {} branch misses",
        config.backend,
        counters.cycles,
        counters.branch_misses
    );
    Ok(Frame {
        width,
        height,
        pixels: results.iter().map(|r| r.colour).collect(),
        counters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{CsgOp, Instruction};
    use crate::types::Material;

    fn ball_on_floor() -> Program {
        Program::from_instructions(&[
            Instruction::start(),
            Instruction::plane(CsgOp::Add, Vec3::new(0.0, -1.0, 0.0), -1.0),
            Instruction::register_hit(Material::from_rgb(200, 200, 200, 0)),
            Instruction::sphere(CsgOp::Add, Vec3::new(0.0, 0.0, 4.0), 1.0),
            Instruction::register_hit(Material::from_rgb(255, 64, 64, 96)),
            Instruction::end(),
        ])
        .unwrap()
    }

    #[test]
    fn test_centre_ray_looks_forward() {
        let dirs = Camera::default().ray_directions(4, 4);
        assert_eq!(dirs.len(), 16);
        let centre = dirs[2 * 4 + 2];
        assert!(centre.x.abs() < 200, "{centre:?}");
        assert!(centre.y.abs() < 200, "{centre:?}");
        assert!(centre.z > 16000, "{centre:?}");
        // Top-left looks up and left
        assert!(dirs[0].x < 0 && dirs[0].y < 0);
    }

    #[test]
    fn test_yaw_turns_view() {
        let dirs = Camera::default().with_yaw(90.0).ray_directions(4, 4);
        let centre = dirs[2 * 4 + 2];
        assert!(centre.x > 16000, "{centre:?}");
        assert!(centre.z.abs() < 200, "{centre:?}");
    }

    #[test]
    fn test_empty_frame() {
        let frame = render_frame(&ball_on_floor(), &Camera::default(), 0, 3, &RenderConfig::default()).unwrap();
        assert!(frame.pixels.is_empty());
        assert!(frame.rgb_bytes().is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let program = ball_on_floor();
        let camera = Camera::default();
        let parallel = render_frame(&program, &camera, 12, 9, &RenderConfig::default()).unwrap();
        let sequential =
            render_frame(&program, &camera, 12, 9, &RenderConfig::sequential(Backend::Emulator)).unwrap();
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.rgb_bytes().len(), 12 * 9 * 3);
        assert_eq!(parallel.pixel(11, 8), parallel.pixels.last().copied());
        assert_eq!(parallel.pixel(12, 0), None);
    }

    #[test]
    fn test_engine_frame_matches_emulator() {
        let program = ball_on_floor();
        let camera = Camera::default();
        let engine = render_frame(&program, &camera, 8, 6, &RenderConfig::cycle_accurate()).unwrap();
        let emulator = render_frame(&program, &camera, 8, 6, &RenderConfig::default()).unwrap();
        assert_eq!(engine.pixels, emulator.pixels);
        assert!(engine.counters.cycles > emulator.counters.cycles);
    }
}
