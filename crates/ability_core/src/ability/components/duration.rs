use super::super::component::{AbilityComponent, ComponentState};

/// Expires the owning ability after a fixed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationComponent {
    duration_ms: u64,
    elapsed_ms: u64,
}

impl DurationComponent {
    /// Expire after `duration_ms`.
    #[must_use]
    pub const fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            elapsed_ms: 0,
        }
    }

    /// Time left before expiry.
    #[must_use]
    pub const fn remaining_ms(&self) -> u64 {
        self.duration_ms.saturating_sub(self.elapsed_ms)
    }
}

impl AbilityComponent for DurationComponent {
    fn name(&self) -> &str {
        "duration"
    }

    fn on_tick(&mut self, dt_ms: u64) {
        self.elapsed_ms = self.elapsed_ms.saturating_add(dt_ms);
    }

    fn is_expired(&self) -> bool {
        self.elapsed_ms >= self.duration_ms
    }

    fn state(&self) -> ComponentState {
        ComponentState::Elapsed(self.elapsed_ms)
    }

    fn restore_state(&mut self, state: ComponentState) {
        if let ComponentState::Elapsed(elapsed) = state {
            self.elapsed_ms = elapsed;
        }
    }
}
