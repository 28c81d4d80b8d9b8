use crate::config::MatchConfig;
use crate::types::TimerSlot;

/// Token for one armed second of a slot. Re-arming or cancelling the slot
/// makes older handles stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerHandle {
    pub slot: TimerSlot,
    generation: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct SlotState {
    remaining: u32,
    armed: Option<u64>,
}

/// One countdown per phase slot, at most one outstanding handle each.
#[derive(Clone, Debug)]
pub struct PhaseTimers {
    slots: [SlotState; 4],
    next_generation: u64,
}

impl PhaseTimers {
    pub fn new(config: &MatchConfig) -> Self {
        let mut timers = Self {
            slots: [SlotState::default(); 4],
            next_generation: 1,
        };
        timers.reset(config);
        timers
    }

    /// Cancels everything and restores every counter to its configured total.
    pub fn reset(&mut self, config: &MatchConfig) {
        for slot in TimerSlot::ALL {
            self.slots[slot.index()] = SlotState {
                remaining: config.total_for(slot),
                armed: None,
            };
        }
    }

    pub fn remaining(&self, slot: TimerSlot) -> u32 {
        self.slots[slot.index()].remaining
    }

    pub fn set_remaining(&mut self, slot: TimerSlot, remaining: u32) {
        self.slots[slot.index()].remaining = remaining;
    }

    /// Counts one second down and returns what is left.
    pub fn decrement(&mut self, slot: TimerSlot) -> u32 {
        let state = &mut self.slots[slot.index()];
        state.remaining = state.remaining.saturating_sub(1);
        state.remaining
    }

    pub fn is_armed(&self, slot: TimerSlot) -> bool {
        self.slots[slot.index()].armed.is_some()
    }

    /// Arms the slot for the next second, replacing any outstanding handle.
    pub fn arm(&mut self, slot: TimerSlot) -> TimerHandle {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.slots[slot.index()].armed = Some(generation);
        TimerHandle { slot, generation }
    }

    /// Returns whether the slot had an outstanding handle.
    pub fn cancel(&mut self, slot: TimerSlot) -> bool {
        self.slots[slot.index()].armed.take().is_some()
    }

    pub fn cancel_all(&mut self) {
        for state in &mut self.slots {
            state.armed = None;
        }
    }

    /// Handles due at this second, in slot order.
    pub fn due(&self) -> Vec<TimerHandle> {
        TimerSlot::ALL
            .into_iter()
            .filter_map(|slot| {
                self.slots[slot.index()]
                    .armed
                    .map(|generation| TimerHandle { slot, generation })
            })
            .collect()
    }

    /// Consumes the handle. Stale handles are rejected.
    pub fn fire(&mut self, handle: TimerHandle) -> bool {
        let state = &mut self.slots[handle.slot.index()];
        if state.armed != Some(handle.generation) {
            return false;
        }
        state.armed = None;
        true
    }
}
