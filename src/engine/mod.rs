//! Cycle-accurate instruction pipeline
//!
//! The engine clocks a fourteen-stage pipeline over a [`Program`]:
//! two-cycle instruction memory with branch prediction at fetch, the origin
//! register at stage 3, the intersection lanes in between and CSG merging,
//! hit registration and branch resolution at commit. Every ray starts from a
//! fresh [`PipelineState`]; only the [`BranchPredictor`] persists, so repeated
//! rays against the same program learn its branch bias.
//!
//! # Example
//!
//! ```
//! use alice_srt::prelude::*;
//! use glam::{I16Vec3, IVec3, Vec3};
//!
//! let program = Program::from_instructions(&[
//!     Instruction::start(),
//!     Instruction::sphere(CsgOp::Add, Vec3::new(0.0, 0.0, 5.0), 1.0),
//!     Instruction::register_hit(Material::WHITE),
//!     Instruction::end(),
//! ])
//! .unwrap();
//!
//! let mut engine = Engine::new();
//! let ray = Ray::new(IVec3::ZERO, I16Vec3::new(0, 0, 16384));
//! let outcome = engine.run(&program, &ray, RayKind::Primary).unwrap();
//! assert!(outcome.hit.present);
//! ```
//!
//! Author: Moroya Sakamoto

mod counters;
mod lanes;
mod predictor;
mod state;

pub use counters::PerfCounters;
pub use lanes::{AabbLane, Lanes, SpherePlaneLane, OPERAND_STAGE};
pub use predictor::BranchPredictor;
pub use state::{PipelineState, Slot, Uniforms};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::isa::Program;
use crate::trace::{NullTrace, TraceEvent, TraceSink};
use crate::types::{Ray, RayKind, RegisteredHit};

/// Pipeline depth
pub const STAGES: usize = 14;

// ============================================================================
// Backend interface
// ============================================================================

/// Result of tracing one ray
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RayOutcome {
    /// Final registered hit
    pub hit: RegisteredHit,
    /// Work spent on the ray
    pub counters: PerfCounters,
}

/// Anything that can run a program against a ray
///
/// Implemented by the cycle-accurate [`Engine`] and the fast
/// [`Emulator`](crate::emulator::Emulator); both must report identical hits.
pub trait RayTracer {
    /// Run `program` for one ray
    fn trace(&mut self, program: &Program, ray: &Ray, kind: RayKind) -> Result<RayOutcome, EngineError>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Engine limits and checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Clock ticks allowed per ray
    pub max_cycles: u64,
    /// Verify the memory unit answered for the address fetch expected
    pub strict_address_check: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cycles: 1 << 24,
            strict_address_check: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    /// Small cycle budget with every check on, for tests
    pub fn fast_fail() -> Self {
        Self {
            max_cycles: 100_000,
            strict_address_check: true,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Cycle-accurate backend
#[derive(Debug, Clone, Default)]
pub struct Engine<T: TraceSink = NullTrace> {
    config: EngineConfig,
    predictor: BranchPredictor,
    trace: T,
}

impl Engine {
    /// Engine with default limits and no tracing
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with custom limits and no tracing
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}

impl<T: TraceSink> Engine<T> {
    /// Engine reporting to `trace`
    pub fn with_trace(config: EngineConfig, trace: T) -> Self {
        Self {
            config,
            predictor: BranchPredictor::default(),
            trace,
        }
    }

    /// Limits in use
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Learned branch bias
    #[inline]
    pub fn predictor(&self) -> &BranchPredictor {
        &self.predictor
    }

    /// Mutable access to the prediction table, e.g. to reset it
    #[inline]
    pub fn predictor_mut(&mut self) -> &mut BranchPredictor {
        &mut self.predictor
    }

    /// Trace sink
    #[inline]
    pub fn trace_sink(&self) -> &T {
        &self.trace
    }

    /// Consume the engine, returning its trace sink
    pub fn into_trace_sink(self) -> T {
        self.trace
    }

    /// Trace one ray to completion
    pub fn run(&mut self, program: &Program, ray: &Ray, kind: RayKind) -> Result<RayOutcome, EngineError> {
        if self.predictor.prepare(program.len()) {
            log::debug!("prediction table sized for {} instruction words", program.len());
        }

        let uniforms = Uniforms {
            program,
            ray,
            kind,
            check_addresses: self.config.strict_address_check,
        };

        let mut state =
            PipelineState::default().tick(&uniforms, &mut self.predictor, true, &mut self.trace)?;
        while state.is_busy() {
            if state.counters().cycles >= self.config.max_cycles {
                return Err(EngineError::CycleBudgetExceeded(self.config.max_cycles));
            }
            state = state.tick(&uniforms, &mut self.predictor, false, &mut self.trace)?;
        }

        let counters = *state.counters();
        if self.trace.enabled() {
            self.trace.record(TraceEvent::Finish {
                steps: counters.cycles,
            });
        }
        Ok(RayOutcome {
            hit: state.registered(),
            counters,
        })
    }
}

impl<T: TraceSink> RayTracer for Engine<T> {
    fn trace(&mut self, program: &Program, ray: &Ray, kind: RayKind) -> Result<RayOutcome, EngineError> {
        self.run(program, ray, kind)
    }
}
