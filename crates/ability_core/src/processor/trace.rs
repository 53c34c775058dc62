//! Audit records produced by the event processor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::Intent;
use crate::ids::{ActorId, HandlerId};

/// How much the processor records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TraceLevel {
    /// No records.
    #[default]
    Off,
    /// One record per call, without per-handler detail.
    Summary,
    /// One record per call including every handler's intent.
    Detailed,
}

/// Which phase a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Intent collection.
    Pre,
    /// Broadcast.
    Post,
}

/// What one pre-handler returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerTrace {
    /// Registration id.
    pub handler_id: HandlerId,
    /// Handler name.
    pub name: String,
    /// Owning actor.
    pub owner: ActorId,
    /// Intent as returned; `Pass` when the handler failed.
    pub intent: Intent,
    /// Error raised by the handler, if it failed.
    pub error: Option<String>,
}

/// One pre or post call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Phase.
    pub phase: Phase,
    /// Event kind name.
    pub event_kind: String,
    /// Depth at entry.
    pub depth: usize,
    /// Whether the depth bound cut this call short.
    pub truncated: bool,
    /// Handler results, in registration order. Empty below `Detailed`.
    pub handlers: Vec<HandlerTrace>,
    /// Field values before the pre phase.
    pub original_values: BTreeMap<String, f64>,
    /// Field values after the pre phase.
    pub final_values: BTreeMap<String, f64>,
    /// Cancelling handler.
    pub cancelled_by: Option<HandlerId>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
    /// Actors reached by a post broadcast.
    pub actors_reached: usize,
}

impl TraceRecord {
    pub(crate) fn new(phase: Phase, event_kind: String, depth: usize) -> Self {
        Self {
            phase,
            event_kind,
            depth,
            truncated: false,
            handlers: Vec::new(),
            original_values: BTreeMap::new(),
            final_values: BTreeMap::new(),
            cancelled_by: None,
            cancel_reason: None,
            actors_reached: 0,
        }
    }

    /// Serialize as a single JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
