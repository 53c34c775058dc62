//! Identifiers and the id generator.
//!
//! Instance ids are issued by an explicit [`IdGenerator`] owned by the world
//! root, so two worlds seeded the same way hand out the same ids and tests
//! can run in parallel without sharing counters.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw id.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Raw numeric value.
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Opaque actor identity. Carries no behavior.
    ActorId,
    "actor"
);
id_type!(
    /// Unique id of a granted ability instance.
    AbilityId,
    "ability"
);
id_type!(
    /// Registration id of a pre-phase handler, unique within its registry.
    HandlerId,
    "handler"
);
id_type!(
    /// Id of a running ability execution.
    ExecutionId,
    "exec"
);
id_type!(
    /// Id of a modifier, unique within the owning attribute set.
    ModifierId,
    "mod"
);

/// Sequential id source with injectable, resettable state.
///
/// All id kinds share one counter, so every id issued by a generator is
/// unique across kinds as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    /// Create a generator whose first id is `seed`.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { next: seed }
    }

    /// Reset the counter so the next id is `seed`.
    pub fn reset(&mut self, seed: u64) {
        self.next = seed;
    }

    /// The value the next call will return.
    #[must_use]
    pub const fn peek(&self) -> u64 {
        self.next
    }

    fn bump(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Issue an actor id.
    pub fn next_actor(&mut self) -> ActorId {
        ActorId(self.bump())
    }

    /// Issue an ability instance id.
    pub fn next_ability(&mut self) -> AbilityId {
        AbilityId(self.bump())
    }

    /// Issue an execution id.
    pub fn next_execution(&mut self) -> ExecutionId {
        ExecutionId(self.bump())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Monotonic logical clock in milliseconds.
///
/// Never derived from wall-clock time; the owner advances it explicitly so
/// replays see exactly the same timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalClock {
    now_ms: u64,
}

impl LogicalClock {
    /// Clock starting at `now_ms`.
    #[must_use]
    pub const fn starting_at(now_ms: u64) -> Self {
        Self { now_ms }
    }

    /// Current logical time.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now_ms
    }

    /// Move forward by `dt_ms`.
    pub fn advance(&mut self, dt_ms: u64) -> u64 {
        self.now_ms = self.now_ms.saturating_add(dt_ms);
        self.now_ms
    }

    /// Move to an absolute time. Going backwards is a programmer error.
    pub fn advance_to(&mut self, now_ms: u64) {
        debug_assert!(
            now_ms >= self.now_ms,
            "logical clock must not go backwards ({} -> {})",
            self.now_ms,
            now_ms
        );
        self.now_ms = self.now_ms.max(now_ms);
    }
}
