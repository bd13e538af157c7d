//! Execution trace sinks
//!
//! The engine and the emulator report what they do through a [`TraceSink`].
//! Events are only built when [`TraceSink::enabled`] returns true, so the
//! default [`NullTrace`] costs nothing in release builds.
//!
//! Author: Moroya Sakamoto

use std::fmt;

use crate::isa::Instruction;

/// Something observable happened while tracing a ray
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// An instruction word left instruction memory
    Fetch {
        /// Its address
        pc: u32,
        /// Decoded instruction
        instruction: Instruction,
    },
    /// A conditional branch was predicted at fetch
    Predict {
        /// Branch address
        pc: u32,
        /// Predicted outcome
        taken: bool,
    },
    /// An instruction reached commit
    Commit {
        /// Its address
        pc: u32,
        /// Decoded instruction
        instruction: Instruction,
        /// Condition outcome
        execute: bool,
    },
    /// A flushed instruction reached commit and was dropped
    Skip {
        /// Its address
        pc: u32,
        /// Decoded instruction
        instruction: Instruction,
    },
    /// A branch resolved differently from its prediction
    Mispredict {
        /// Branch address
        pc: u32,
        /// Corrected fetch address
        target: u32,
    },
    /// A hit won the Z-test
    RegisterHit {
        /// Registered depth (18.14)
        depth: i32,
    },
    /// The ray finished
    Finish {
        /// Cycles (engine) or instructions (emulator) spent
        steps: u64,
    },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch { pc, instruction } => write!(f, "fetch   [{pc:5}] {instruction}"),
            Self::Predict { pc, taken } => write!(
                f,
                "predict [{pc:5}] {}",
                if *taken { "taken" } else { "not taken" }
            ),
            Self::Commit {
                pc,
                instruction,
                execute,
            } => write!(
                f,
                "commit  [{pc:5}] {instruction}{}",
                if *execute { "" } else { " (not executing)" }
            ),
            Self::Skip { pc, instruction } => write!(f, "skip    [{pc:5}] {instruction}"),
            Self::Mispredict { pc, target } => write!(f, "flush   [{pc:5}] -> {target}"),
            Self::RegisterHit { depth } => {
                write!(f, "hit     depth {:.4}", crate::fixed::from_fixed(*depth))
            }
            Self::Finish { steps } => write!(f, "finish  after {steps}"),
        }
    }
}

/// Receiver for [`TraceEvent`]s
pub trait TraceSink {
    /// Whether events should be built at all
    #[inline]
    fn enabled(&self) -> bool {
        false
    }

    /// Receive one event
    fn record(&mut self, event: TraceEvent);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    #[inline(always)]
    fn record(&mut self, _event: TraceEvent) {}
}

/// Forwards events to `log::trace!`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTrace;

impl TraceSink for LogTrace {
    #[inline]
    fn enabled(&self) -> bool {
        log::log_enabled!(log::Level::Trace)
    }

    fn record(&mut self, event: TraceEvent) {
        log::trace!("{event}");
    }
}

/// Keeps every event, for tests and offline inspection
#[derive(Debug, Clone, Default)]
pub struct RecordingTrace {
    /// Events in arrival order
    pub events: Vec<TraceEvent>,
}

impl RecordingTrace {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop recorded events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl TraceSink for RecordingTrace {
    #[inline]
    fn enabled(&self) -> bool {
        true
    }

    fn record(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}

impl<S: TraceSink + ?Sized> TraceSink for &mut S {
    #[inline]
    fn enabled(&self) -> bool {
        (**self).enabled()
    }

    #[inline]
    fn record(&mut self, event: TraceEvent) {
        (**self).record(event);
    }
}
