//! Fast functional emulator
//!
//! Executes one instruction at a time with no pipeline, no latency and no
//! prediction. Geometry goes through [`intersect`], which chains the same
//! stage functions the engine clocks through its lanes, and hits go through
//! the same [`HitState`], so the registered hit always matches the engine's.
//!
//! Author: Moroya Sakamoto

use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::csg::HitState;
use crate::engine::{PerfCounters, RayOutcome, RayTracer};
use crate::error::EngineError;
use crate::intersect::intersect;
use crate::isa::{Op, Program};
use crate::trace::{NullTrace, TraceEvent, TraceSink};
use crate::types::{Ray, RayKind};

/// Emulator limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Instructions allowed per ray
    pub max_instructions: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            max_instructions: 1 << 22,
        }
    }
}

/// Non-pipelined backend
#[derive(Debug, Clone, Default)]
pub struct Emulator<T: TraceSink = NullTrace> {
    config: EmulatorConfig,
    trace: T,
}

impl Emulator {
    /// Emulator with default limits and no tracing
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulator with custom limits and no tracing
    pub fn with_config(config: EmulatorConfig) -> Self {
        Self {
            config,
            trace: NullTrace,
        }
    }
}

impl<T: TraceSink> Emulator<T> {
    /// Emulator reporting to `trace`
    pub fn with_trace(config: EmulatorConfig, trace: T) -> Self {
        Self { config, trace }
    }

    /// Limits in use
    #[inline]
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Trace sink
    #[inline]
    pub fn trace_sink(&self) -> &T {
        &self.trace
    }

    /// Consume the emulator, returning its trace sink
    pub fn into_trace_sink(self) -> T {
        self.trace
    }

    /// Trace one ray to completion
    ///
    /// `cycles` in the returned counters is the number of instructions
    /// dispatched. Branches are not predicted, so branch counters stay zero.
    pub fn run(&mut self, program: &Program, ray: &Ray, kind: RayKind) -> Result<RayOutcome, EngineError> {
        let mut hits = HitState::default();
        let mut origin = IVec3::ZERO;
        let mut counters = PerfCounters::default();
        let mut pc: u32 = 0;

        loop {
            if counters.cycles >= self.config.max_instructions {
                return Err(EngineError::InstructionBudgetExceeded(self.config.max_instructions));
            }
            let instruction = program.instruction(pc).ok_or(EngineError::PcOutOfRange {
                pc,
                len: program.len(),
            })?;
            counters.cycles += 1;

            let execute = hits.condition_holds(instruction.condition);
            if execute && !instruction.is_nop() {
                counters.instructions_executed += 1;
            } else {
                counters.instructions_abandoned += 1;
            }
            if !instruction.is_nop() && self.trace.enabled() {
                self.trace.record(TraceEvent::Commit {
                    pc,
                    instruction,
                    execute,
                });
            }

            let mut next_pc = pc + 1;
            let mut finished = false;

            match instruction.op {
                Op::Start => {
                    // The pipelined origin register clears regardless of condition
                    origin = IVec3::ZERO;
                    if execute {
                        hits.start();
                    }
                }
                Op::Geometry { merge, shape } => {
                    if execute {
                        let interval = intersect(&shape, origin, ray);
                        hits.merge(merge, &interval, ray);
                    }
                }
                Op::Checkerboard(material) => {
                    if execute {
                        hits.checkerboard(material);
                    }
                }
                Op::RegisterHit { material, reset } => {
                    if execute && hits.register(material, reset) {
                        if self.trace.enabled() {
                            self.trace.record(TraceEvent::RegisterHit {
                                depth: hits.registered.depth,
                            });
                        }
                        finished = kind.is_shadow();
                    }
                }
                Op::ResetHitState => {
                    if execute {
                        hits.reset_accumulator();
                    }
                }
                Op::Jump {
                    target,
                    reset_hit_state,
                } => {
                    if reset_hit_state {
                        hits.reset_accumulator();
                    }
                    if execute {
                        next_pc = target as u32;
                    }
                }
                Op::Origin(offset) => origin = offset,
                Op::End => finished = execute,
                Op::Nop | Op::Reserved(_) => {}
            }

            if finished {
                break;
            }
            pc = next_pc;
        }

        if self.trace.enabled() {
            self.trace.record(TraceEvent::Finish {
                steps: counters.cycles,
            });
        }
        Ok(RayOutcome {
            hit: hits.registered,
            counters,
        })
    }
}

impl<T: TraceSink> RayTracer for Emulator<T> {
    fn trace(&mut self, program: &Program, ray: &Ray, kind: RayKind) -> Result<RayOutcome, EngineError> {
        self.run(program, ray, kind)
    }
}
