//! Structured warn-and-continue channel.
//!
//! Runtime mishaps (bad push index, skipped reinit) must never abort the
//! tick loop, so they are recorded here instead of raised. Each event is
//! mirrored to `tracing` and buffered on the owning instance for the host
//! layer to inspect or drain.

use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

/// Oldest events are dropped past this point so a misconfigured instance
/// cannot grow its buffer without bound over a long simulation.
pub const MAX_BUFFERED_EVENTS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FunctionEvent {
    /// The expression text was re-set without any change.
    ExpressionUnchanged { expr: String },
    /// Compilation failed; the instance is now invalid.
    CompileFailed { expr: String, reason: String },
    /// A pushed value targeted a slot that does not exist; it was dropped.
    PushIndexOutOfRange { index: usize, value: f64 },
    /// `reinit` was invoked while the instance was invalid.
    ReinitSkipped { expr: String },
    /// The independent variable is not bound in the compiled expression.
    UnknownIndependent { name: String },
    /// A solver association was overwritten without a prior detach.
    SolverReplaced,
}

#[derive(Debug, Default)]
pub struct EventLog {
    events: VecDeque<FunctionEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: FunctionEvent) {
        match &event {
            FunctionEvent::ExpressionUnchanged { expr } => {
                warn!(%expr, "no changes in the expression");
            }
            FunctionEvent::CompileFailed { expr, reason } => {
                warn!(%expr, %reason, "expression failed to compile");
            }
            FunctionEvent::PushIndexOutOfRange { index, value } => {
                warn!(index = *index, value = *value, "input index out of range, value dropped");
            }
            FunctionEvent::ReinitSkipped { expr } => {
                warn!(%expr, "reinit on invalid function, skipped");
            }
            FunctionEvent::UnknownIndependent { name } => {
                warn!(%name, "independent variable is not bound");
            }
            FunctionEvent::SolverReplaced => {
                warn!("solver association replaced without detach");
            }
        }
        if self.events.len() == MAX_BUFFERED_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<FunctionEvent> {
        self.events.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
