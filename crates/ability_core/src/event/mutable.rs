//! Intents, modifications and the in-flight event wrapper.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::GameEvent;
use crate::ids::HandlerId;

/// Field operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModOp {
    /// Replace the value. The last `Set` wins.
    Set,
    /// Add to the value.
    Add,
    /// Multiply the value.
    Multiply,
}

/// A field change as returned by a handler, before attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Operation.
    pub op: ModOp,
    /// Operand.
    pub value: f64,
}

impl FieldChange {
    /// Replace `field` with `value`.
    pub fn set(field: impl Into<String>, value: f64) -> Self {
        Self {
            field: field.into(),
            op: ModOp::Set,
            value,
        }
    }

    /// Add `value` to `field`.
    pub fn add(field: impl Into<String>, value: f64) -> Self {
        Self {
            field: field.into(),
            op: ModOp::Add,
            value,
        }
    }

    /// Multiply `field` by `value`.
    pub fn multiply(field: impl Into<String>, value: f64) -> Self {
        Self {
            field: field.into(),
            op: ModOp::Multiply,
            value,
        }
    }
}

/// A field change attributed to the handler that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    /// Field name.
    pub field: String,
    /// Operation.
    pub op: ModOp,
    /// Operand.
    pub value: f64,
    /// Handler that produced it.
    pub source_id: HandlerId,
    /// Handler name.
    pub source_name: String,
}

impl Modification {
    /// Attribute a handler's change.
    pub fn from_change(change: FieldChange, source_id: HandlerId, source_name: impl Into<String>) -> Self {
        Self {
            field: change.field,
            op: change.op,
            value: change.value,
            source_id,
            source_name: source_name.into(),
        }
    }
}

/// Result of a pre-phase handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    /// No opinion.
    Pass,
    /// Stop the event. Later handlers are not consulted.
    Cancel {
        /// Handler that cancelled.
        handler_id: HandlerId,
        /// Human readable reason.
        reason: String,
    },
    /// Contribute field changes.
    Modify {
        /// Handler that contributed.
        handler_id: HandlerId,
        /// Changes in application order.
        modifications: Vec<FieldChange>,
    },
}

impl Intent {
    /// Cancel intent.
    pub fn cancel(handler_id: HandlerId, reason: impl Into<String>) -> Self {
        Self::Cancel {
            handler_id,
            reason: reason.into(),
        }
    }

    /// Modify intent.
    #[must_use]
    pub const fn modify(handler_id: HandlerId, modifications: Vec<FieldChange>) -> Self {
        Self::Modify {
            handler_id,
            modifications,
        }
    }

    /// Short label for logs and traces.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Cancel { .. } => "cancel",
            Self::Modify { .. } => "modify",
        }
    }
}

/// An in-flight event: the untouched original plus accumulated changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutableEvent {
    original: GameEvent,
    modifications: Vec<Modification>,
    cancelled: bool,
    cancel_reason: Option<String>,
    cancelled_by: Option<HandlerId>,
}

impl MutableEvent {
    /// Wrap an event with no changes.
    #[must_use]
    pub const fn new(original: GameEvent) -> Self {
        Self {
            original,
            modifications: Vec::new(),
            cancelled: false,
            cancel_reason: None,
            cancelled_by: None,
        }
    }

    /// The event as constructed.
    #[must_use]
    pub const fn original(&self) -> &GameEvent {
        &self.original
    }

    /// Accumulated modifications in handler order.
    #[must_use]
    pub fn modifications(&self) -> &[Modification] {
        &self.modifications
    }

    /// Whether a handler cancelled the event.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Reason given by the cancelling handler.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// Handler that cancelled the event.
    #[must_use]
    pub const fn cancelled_by(&self) -> Option<HandlerId> {
        self.cancelled_by
    }

    /// Record a modification.
    pub fn push(&mut self, modification: Modification) {
        self.modifications.push(modification);
    }

    /// Mark the event cancelled. The first cancellation is kept.
    pub fn cancel(&mut self, handler_id: HandlerId, reason: impl Into<String>) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.cancelled_by = Some(handler_id);
        self.cancel_reason = Some(reason.into());
    }

    /// Resolved value of `field`.
    ///
    /// Starts from the last `Set` (or the original value), then adds every
    /// `Add`, then multiplies by every `Multiply`. Returns `None` when the
    /// field exists neither on the event nor in any `Set`.
    #[must_use]
    pub fn current_value(&self, field: &str) -> Option<f64> {
        let relevant = || self.modifications.iter().filter(move |m| m.field == field);

        let start = relevant()
            .filter(|m| m.op == ModOp::Set)
            .last()
            .map(|m| m.value)
            .or_else(|| self.original.field(field))?;

        let added = relevant()
            .filter(|m| m.op == ModOp::Add)
            .fold(start, |acc, m| acc + m.value);

        Some(
            relevant()
                .filter(|m| m.op == ModOp::Multiply)
                .fold(added, |acc, m| acc * m.value),
        )
    }

    /// Resolved value of every original or modified field.
    #[must_use]
    pub fn final_values(&self) -> BTreeMap<String, f64> {
        let mut names: Vec<String> = self.original.numeric_fields().into_keys().collect();
        for modification in &self.modifications {
            if !names.contains(&modification.field) {
                names.push(modification.field.clone());
            }
        }

        names
            .into_iter()
            .filter_map(|name| self.current_value(&name).map(|value| (name, value)))
            .collect()
    }

    /// New event carrying the resolved fields. The original is untouched.
    #[must_use]
    pub fn finalize(&self) -> GameEvent {
        if self.modifications.is_empty() {
            return self.original.clone();
        }
        self.final_values()
            .into_iter()
            .fold(self.original.clone(), |event, (name, value)| {
                event.with_field(&name, value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ActorId;

    fn attributed(change: FieldChange, id: u64) -> Modification {
        Modification::from_change(change, HandlerId(id), format!("h{id}"))
    }

    fn damage(amount: f64) -> MutableEvent {
        MutableEvent::new(GameEvent::damage(ActorId(1), ActorId(2), amount))
    }

    #[test]
    fn test_add_then_multiply() {
        let mut event = damage(100.0);
        event.push(attributed(FieldChange::add("amount", -10.0), 1));
        event.push(attributed(FieldChange::multiply("amount", 0.7), 2));
        let value = event.current_value("amount").unwrap();
        assert!((value - 63.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_applies_before_adds_regardless_of_order() {
        let mut event = damage(100.0);
        event.push(attributed(FieldChange::add("amount", 5.0), 1));
        event.push(attributed(FieldChange::multiply("amount", 2.0), 2));
        event.push(attributed(FieldChange::set("amount", 10.0), 3));
        event.push(attributed(FieldChange::set("amount", 50.0), 4));
        assert_eq!(event.current_value("amount"), Some(110.0));
    }

    #[test]
    fn test_finalize_leaves_original() {
        let mut event = damage(40.0);
        event.push(attributed(FieldChange::multiply("amount", 0.5), 1));
        let resolved = event.finalize();
        assert_eq!(resolved.field("amount"), Some(20.0));
        assert_eq!(event.original().field("amount"), Some(40.0));
        assert_eq!(event.final_values().get("amount"), Some(&20.0));
    }

    #[test]
    fn test_first_cancel_kept() {
        let mut event = damage(1.0);
        event.cancel(HandlerId(3), "immune");
        event.cancel(HandlerId(4), "dodged");
        assert!(event.is_cancelled());
        assert_eq!(event.cancelled_by(), Some(HandlerId(3)));
        assert_eq!(event.cancel_reason(), Some("immune"));
    }

    #[test]
    fn test_unknown_field() {
        let event = damage(1.0);
        assert_eq!(event.current_value("crit"), None);
    }
}
