//! Outbound event stream for recording and presentation layers.
//!
//! Every entry carries actor ids rather than references, so the stream can
//! be serialized as-is.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::event::GameEvent;
use crate::ids::{AbilityId, ActorId, ExecutionId, HandlerId};

/// Why an ability left its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevokeReason {
    /// Explicit revoke call.
    Manual,
    /// A component reported expiry.
    Expired,
    /// The owning actor was despawned.
    ActorDespawned,
}

/// One entry of the outbound stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// An attribute's current value changed.
    AttributeChanged {
        /// Owner.
        actor: ActorId,
        /// Attribute name.
        attribute: String,
        /// Previous current value.
        old_value: f64,
        /// New current value.
        new_value: f64,
    },
    /// A tag's total stack count changed.
    TagChanged {
        /// Owner.
        actor: ActorId,
        /// Tag name.
        tag: String,
        /// Previous total.
        old_stacks: u32,
        /// New total.
        new_stacks: u32,
    },
    /// An ability was attached.
    AbilityGranted {
        /// Owner.
        actor: ActorId,
        /// Instance id.
        ability: AbilityId,
        /// Template id.
        config_id: String,
    },
    /// An ability was detached.
    AbilityRevoked {
        /// Former owner.
        actor: ActorId,
        /// Instance id.
        ability: AbilityId,
        /// Why.
        reason: RevokeReason,
    },
    /// A trigger component reacted to an event.
    AbilityTriggered {
        /// Owner.
        actor: ActorId,
        /// Instance id.
        ability: AbilityId,
        /// Kind of the triggering event.
        event_kind: String,
    },
    /// A gated activation was denied.
    ActivationFailed {
        /// Owner.
        actor: ActorId,
        /// Instance id.
        ability: AbilityId,
        /// Failing condition or cost.
        reason: String,
    },
    /// A gated activation passed and paid its costs.
    ExecutionActivated {
        /// Owner.
        actor: ActorId,
        /// Instance id.
        ability: AbilityId,
        /// Execution instance.
        execution: ExecutionId,
        /// Timeline to play.
        timeline_id: String,
    },
    /// An execution ran past its duration.
    ExecutionCompleted {
        /// Owner.
        actor: ActorId,
        /// Instance id.
        ability: AbilityId,
        /// Execution instance.
        execution: ExecutionId,
    },
    /// An event finished its pre phase.
    EventResolved {
        /// Final event (or the original, if cancelled).
        event: GameEvent,
        /// Whether a pre handler cancelled it.
        cancelled: bool,
        /// Cancelling handler.
        cancelled_by: Option<HandlerId>,
    },
}

impl EngineEvent {
    /// Actor the entry belongs to, if any.
    #[must_use]
    pub const fn actor(&self) -> Option<ActorId> {
        match self {
            Self::AttributeChanged { actor, .. }
            | Self::TagChanged { actor, .. }
            | Self::AbilityGranted { actor, .. }
            | Self::AbilityRevoked { actor, .. }
            | Self::AbilityTriggered { actor, .. }
            | Self::ActivationFailed { actor, .. }
            | Self::ExecutionActivated { actor, .. }
            | Self::ExecutionCompleted { actor, .. } => Some(*actor),
            Self::EventResolved { .. } => None,
        }
    }
}

/// Shared append-only log handle.
///
/// Clones refer to the same buffer. Single-threaded by construction.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Rc<RefCell<Vec<EngineEvent>>>,
}

impl EventLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&self, event: EngineEvent) {
        self.entries.borrow_mut().push(event);
    }

    /// Remove and return every entry.
    #[must_use]
    pub fn drain(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }

    /// Copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EngineEvent> {
        self.entries.borrow().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_buffer() {
        let log = EventLog::new();
        let writer = log.clone();
        writer.push(EngineEvent::AbilityRevoked {
            actor: ActorId(1),
            ability: AbilityId(2),
            reason: RevokeReason::Manual,
        });
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].actor(), Some(ActorId(1)));
        assert_eq!(log.drain().len(), 1);
        assert!(writer.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let entry = EngineEvent::TagChanged {
            actor: ActorId(5),
            tag: "stun".into(),
            old_stacks: 0,
            new_stacks: 1,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"type\":\"TagChanged\""));
        let back: EngineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
