//! Pipeline snapshot and clock
//!
//! [`PipelineState`] holds every register of the engine. [`PipelineState::tick`]
//! reads only the current snapshot and returns the next one; the prediction
//! table is the single piece of state written in place, after it has been read
//! for the tick.
//!
//! Stage map:
//!
//! | Stage | Work |
//! |-------|------|
//! | 1 | fetch, branch prediction |
//! | 2 | decode register |
//! | 3 | origin register, geometry operands |
//! | 4-13 | intersection lanes |
//! | 14 | condition, CSG merge, hit registration, branch resolution |
//!
//! Author: Moroya Sakamoto

use glam::IVec3;

use super::counters::PerfCounters;
use super::lanes::{Lanes, OPERAND_STAGE};
use super::predictor::BranchPredictor;
use super::STAGES;
use crate::csg::HitState;
use crate::error::EngineError;
use crate::isa::{Condition, Instruction, Op, Program};
use crate::trace::{TraceEvent, TraceSink};
use crate::types::{Ray, RayKind, RegisteredHit};
use crate::units::MemoryReadUnit;

/// Fetch bubbles after any PC load: one bit per tick the ROM has not answered
const ROM_WAIT: u8 = 0b11;

/// Every in-flight instruction invalidated
const FLUSH_ALL: u32 = u32::MAX;

#[inline(always)]
const fn stage_bit(stage: usize) -> u32 {
    1 << (stage - 1)
}

/// Inputs that stay fixed for a whole ray
#[derive(Debug, Clone, Copy)]
pub struct Uniforms<'a> {
    /// Instruction memory
    pub program: &'a Program,
    /// Ray under test
    pub ray: &'a Ray,
    /// Ray classification, selects the prediction bit and shadow early-out
    pub kind: RayKind,
    /// Fail on memory reads tagged with an unexpected address
    pub check_addresses: bool,
}

/// One instruction slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot {
    /// Decoded instruction (NOP for bubbles)
    pub instruction: Instruction,
    /// Address it was fetched from
    pub pc: u32,
    /// Prediction-table byte read at fetch
    pub prediction: u8,
    /// Fetch redirected after this instruction
    pub predicted_taken: bool,
    /// Origin register before this instruction passed stage 3
    pub origin_before: IVec3,
    /// Fetched past the end of the program
    pub overrun: bool,
}

/// Complete engine register state at one clock edge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineState {
    busy: bool,

    // Fetch
    fetch_pc: u32,
    pc_fifo: u32,
    actual_pc: u32,
    rom_wait: u8,
    memory: MemoryReadUnit<u64>,
    prediction_port: MemoryReadUnit<u8>,

    // Commit to fetch and stage 3, valid for one tick
    finished: bool,
    load_pc: Option<u32>,
    restore_origin: Option<IVec3>,

    origin: IVec3,
    slots: [Slot; STAGES + 1],
    lanes: Lanes,
    invalidated: u32,
    hits: HitState,
    counters: PerfCounters,
}

impl PipelineState {
    /// Executing a ray
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Registered hit so far
    #[inline]
    pub fn registered(&self) -> RegisteredHit {
        self.hits.registered
    }

    /// Commit-stage hit registers
    #[inline]
    pub fn hit_state(&self) -> &HitState {
        &self.hits
    }

    /// Counters so far
    #[inline]
    pub fn counters(&self) -> &PerfCounters {
        &self.counters
    }

    /// Origin register
    #[inline]
    pub fn origin(&self) -> IVec3 {
        self.origin
    }

    /// Invalidation shift register; bit `n - 1` covers stage `n`
    #[inline]
    pub fn invalidated(&self) -> u32 {
        self.invalidated
    }

    /// Instruction slot at `stage` (2 to 14)
    #[inline]
    pub fn slot(&self, stage: usize) -> Option<&Slot> {
        (2..=STAGES).contains(&stage).then(|| &self.slots[stage])
    }

    /// Intersection lanes
    #[inline]
    pub fn lanes(&self) -> &Lanes {
        &self.lanes
    }

    /// Advance one clock
    ///
    /// `start` is the one-tick start pulse. `predictor` must already be sized
    /// for the program.
    pub fn tick<T: TraceSink>(
        &self,
        uniforms: &Uniforms<'_>,
        predictor: &mut BranchPredictor,
        start: bool,
        trace: &mut T,
    ) -> Result<Self, EngineError> {
        let mut next = self.clone();
        next.counters.cycles += 1;

        // Memory ports read before commit can update the prediction table
        next.memory = self.memory.tick(uniforms.program.words());
        next.prediction_port = self.prediction_port.tick(predictor.table());

        let operands = match &self.slots[OPERAND_STAGE].instruction.op {
            Op::Geometry { shape, .. } => Some(shape),
            _ => None,
        };
        next.lanes = self.lanes.tick(operands, self.origin, uniforms.ray);

        let fetched = self.fetch(&mut next, uniforms, start, trace)?;
        for stage in (3..=STAGES).rev() {
            next.slots[stage] = self.slots[stage - 1];
        }
        next.slots[2] = fetched;

        self.update_origin(&mut next);
        self.commit(&mut next, uniforms, predictor, trace)?;
        Ok(next)
    }

    /// Stage 1
    fn fetch<T: TraceSink>(
        &self,
        next: &mut Self,
        uniforms: &Uniforms<'_>,
        start: bool,
        trace: &mut T,
    ) -> Result<Slot, EngineError> {
        let mut slot = Slot {
            pc: self.actual_pc,
            ..Slot::default()
        };

        if start {
            next.fetch_pc = 0;
            next.rom_wait = ROM_WAIT;
            next.busy = true;
        } else if self.finished {
            next.busy = false;
        } else if let Some(target) = self.load_pc {
            next.fetch_pc = target;
            next.rom_wait = ROM_WAIT;
        } else {
            next.rom_wait = self.rom_wait >> 1;
            if self.busy {
                next.fetch_pc = self.fetch_pc.wrapping_add(1);
                if self.rom_wait & 1 == 0 {
                    let read = self.memory.read();
                    if uniforms.check_addresses && read.address != self.actual_pc {
                        return Err(EngineError::AddressMismatch {
                            expected: self.actual_pc,
                            actual: read.address,
                        });
                    }
                    match read.data {
                        Some(word) => {
                            slot.instruction = Instruction::decode(word);
                            if trace.enabled() {
                                trace.record(TraceEvent::Fetch {
                                    pc: self.actual_pc,
                                    instruction: slot.instruction,
                                });
                            }
                            self.predict(next, &mut slot, uniforms.kind, trace);
                        }
                        None => slot.overrun = true,
                    }
                }
            }
        }

        next.pc_fifo = self.fetch_pc;
        next.actual_pc = self.pc_fifo;
        next.memory.set_address(next.fetch_pc);
        next.prediction_port.set_address(next.fetch_pc >> 1);
        Ok(slot)
    }

    /// Redirect fetch for unconditional jumps and predicted-taken branches
    ///
    /// `AL` jumps are always taken without reading the prediction table, so
    /// they never mispredict, never flush and never train an entry.
    fn predict<T: TraceSink>(&self, next: &mut Self, slot: &mut Slot, kind: RayKind, trace: &mut T) {
        let Op::Jump { target, .. } = slot.instruction.op else {
            return;
        };

        let taken = if slot.instruction.condition == Condition::Always {
            true
        } else {
            let entry = self.prediction_port.read().data.unwrap_or(0);
            slot.prediction = entry;
            let taken = BranchPredictor::predicts_taken(entry, kind.prediction_mask(), slot.pc);
            if trace.enabled() {
                trace.record(TraceEvent::Predict { pc: slot.pc, taken });
            }
            taken
        };

        slot.predicted_taken = taken;
        if taken {
            next.fetch_pc = target as u32;
            next.rom_wait = ROM_WAIT;
        }
    }

    /// Stage 3
    fn update_origin(&self, next: &mut Self) {
        if let Some(origin) = self.restore_origin {
            next.origin = origin;
        }
        if self.invalidated & stage_bit(OPERAND_STAGE) == 0 {
            match self.slots[OPERAND_STAGE].instruction.op {
                Op::Start => next.origin = IVec3::ZERO,
                Op::Origin(origin) => next.origin = origin,
                _ => {}
            }
        }
        next.slots[OPERAND_STAGE + 1].origin_before = self.origin;
    }

    /// Stage 14
    fn commit<T: TraceSink>(
        &self,
        next: &mut Self,
        uniforms: &Uniforms<'_>,
        predictor: &mut BranchPredictor,
        trace: &mut T,
    ) -> Result<(), EngineError> {
        next.finished = false;
        next.load_pc = None;
        next.restore_origin = None;
        next.invalidated = self.invalidated << 1;

        let slot = self.slots[STAGES];
        let instruction = slot.instruction;
        let nop = instruction.is_nop();

        if self.invalidated & stage_bit(STAGES) != 0 {
            if !nop {
                if trace.enabled() {
                    trace.record(TraceEvent::Skip {
                        pc: slot.pc,
                        instruction,
                    });
                }
                return Ok(());
            }
        } else if slot.overrun {
            return Err(EngineError::PcOutOfRange {
                pc: slot.pc,
                len: uniforms.program.len(),
            });
        }

        let execute = self.hits.condition_holds(instruction.condition);
        if execute && !nop {
            next.counters.instructions_executed += 1;
        } else {
            next.counters.instructions_abandoned += 1;
        }
        if !nop && trace.enabled() {
            trace.record(TraceEvent::Commit {
                pc: slot.pc,
                instruction,
                execute,
            });
        }

        match instruction.op {
            Op::Start => {
                if execute {
                    next.hits.start();
                }
            }
            Op::Geometry { merge, shape } => {
                if execute {
                    let interval = self.lanes.result_for(&shape);
                    next.hits.merge(merge, &interval, uniforms.ray);
                }
            }
            Op::Checkerboard(material) => {
                if execute {
                    next.hits.checkerboard(material);
                }
            }
            Op::RegisterHit { material, reset } => {
                if execute && next.hits.register(material, reset) {
                    if trace.enabled() {
                        trace.record(TraceEvent::RegisterHit {
                            depth: next.hits.registered.depth,
                        });
                    }
                    if uniforms.kind.is_shadow() {
                        next.invalidated = FLUSH_ALL;
                        next.finished = true;
                    }
                }
            }
            Op::ResetHitState => {
                if execute {
                    next.hits.reset_accumulator();
                }
            }
            Op::Jump {
                target,
                reset_hit_state,
            } => {
                if reset_hit_state {
                    next.hits.reset_accumulator();
                }
                // AL jumps were redirected at fetch and always land here
                if execute == slot.predicted_taken {
                    next.counters.branch_hits += 1;
                } else {
                    let target = if execute { target as u32 } else { slot.pc + 1 };
                    log::debug!(
                        "branch at {} mispredicted ({}), refetching from {}",
                        slot.pc,
                        if execute { "taken" } else { "not taken" },
                        target
                    );
                    next.load_pc = Some(target);
                    next.invalidated = FLUSH_ALL;
                    next.restore_origin = Some(slot.origin_before);
                    predictor.flip(slot.pc, slot.prediction, uniforms.kind.prediction_mask());
                    next.counters.branch_misses += 1;
                    if trace.enabled() {
                        trace.record(TraceEvent::Mispredict { pc: slot.pc, target });
                    }
                }
            }
            Op::End => {
                if execute {
                    next.invalidated = FLUSH_ALL;
                    next.finished = true;
                }
            }
            Op::Origin(_) | Op::Nop | Op::Reserved(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::to_fixed;
    use crate::isa::CsgOp;
    use crate::trace::{NullTrace, RecordingTrace};
    use crate::types::Material;
    use glam::{I16Vec3, Vec3};

    fn forward_ray() -> Ray {
        Ray::new(IVec3::ZERO, I16Vec3::new(0, 0, 16384))
    }

    fn run_states(program: &Program, ray: &Ray, kind: RayKind) -> Vec<PipelineState> {
        let uniforms = Uniforms {
            program,
            ray,
            kind,
            check_addresses: true,
        };
        let mut predictor = BranchPredictor::for_program_len(program.len());
        let mut states = vec![PipelineState::default()];
        let mut start = true;
        while start || states.last().is_some_and(PipelineState::is_busy) {
            let state = states
                .last()
                .unwrap()
                .tick(&uniforms, &mut predictor, start, &mut NullTrace)
                .unwrap();
            states.push(state);
            start = false;
            assert!(states.len() < 1000);
        }
        states
    }

    fn sphere_program() -> Program {
        Program::from_instructions(&[
            Instruction::start(),
            Instruction::sphere(CsgOp::Add, Vec3::new(0.0, 0.0, 5.0), 1.0),
            Instruction::register_hit(Material::WHITE),
            Instruction::end(),
        ])
        .unwrap()
    }

    #[test]
    fn test_first_instruction_after_rom_latency() {
        let states = run_states(&sphere_program(), &forward_ray(), RayKind::Primary);
        // Start pulse, two ROM wait ticks, then the word reaches stage 2
        let first = states
            .iter()
            .position(|s| s.slot(2).is_some_and(|slot| slot.instruction.op == Op::Start))
            .unwrap();
        assert_eq!(first, 4);
    }

    #[test]
    fn test_sphere_registers_hit() {
        let states = run_states(&sphere_program(), &forward_ray(), RayKind::Primary);
        let last = states.last().unwrap();
        let hit = last.registered();
        assert!(hit.present);
        assert!((hit.depth - to_fixed(4.0)).abs() < to_fixed(0.05));
        assert_eq!(hit.material, Material::WHITE);
        assert_eq!(last.counters().instructions_executed, 4);
        assert_eq!(last.counters().branch_misses, 0);
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let program = sphere_program();
        let ray = forward_ray();
        let uniforms = Uniforms {
            program: &program,
            ray: &ray,
            kind: RayKind::Primary,
            check_addresses: true,
        };
        let mut predictor = BranchPredictor::for_program_len(program.len());
        let before = PipelineState::default();
        let copy = before.clone();
        let a = before
            .tick(&uniforms, &mut predictor, true, &mut NullTrace)
            .unwrap();
        let b = before
            .tick(&uniforms, &mut predictor, true, &mut NullTrace)
            .unwrap();
        assert_eq!(before, copy);
        assert_eq!(a, b);
    }

    #[test]
    fn test_origin_applied_at_stage_three() {
        let program = Program::from_instructions(&[
            Instruction::start(),
            Instruction::origin(Vec3::new(1.0, 2.0, 3.0)),
            Instruction::end(),
        ])
        .unwrap();
        let states = run_states(&program, &forward_ray(), RayKind::Primary);
        let at_stage3 = states
            .iter()
            .position(|s| {
                s.slot(3).is_some_and(|slot| matches!(slot.instruction.op, Op::Origin(_)))
            })
            .unwrap();
        assert_eq!(states[at_stage3].origin(), IVec3::ZERO);
        assert_eq!(
            states[at_stage3 + 1].origin(),
            IVec3::new(to_fixed(1.0), to_fixed(2.0), to_fixed(3.0))
        );
    }

    #[test]
    fn test_trace_sees_fetch_and_commit() {
        let program = sphere_program();
        let ray = forward_ray();
        let uniforms = Uniforms {
            program: &program,
            ray: &ray,
            kind: RayKind::Primary,
            check_addresses: true,
        };
        let mut predictor = BranchPredictor::for_program_len(program.len());
        let mut sink = RecordingTrace::new();
        let mut state = PipelineState::default()
            .tick(&uniforms, &mut predictor, true, &mut sink)
            .unwrap();
        while state.is_busy() {
            state = state
                .tick(&uniforms, &mut predictor, false, &mut sink)
                .unwrap();
        }
        let commits = sink
            .events
            .iter()
            .filter(|e| matches!(e, TraceEvent::Commit { .. }))
            .count();
        assert_eq!(commits, 4);
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::RegisterHit { .. })));
    }
}
