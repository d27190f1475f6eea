//! Delayed transitions.
//!
//! Each character owns one [`MovementTimers`] with a slot per kind of delayed
//! transition. Slots are one-shot: when a slot's timer finishes it is
//! removed and reported by [`MovementTimers::tick`], and the movement core
//! runs the matching callback on the simulation thread.
//!
//! Re-arming a slot never shortens it: the longer of the in-flight and the
//! requested duration wins.

use std::time::Duration;

use bevy::prelude::*;

use crate::mode::MovementMode;

/// The delayed transitions a character can have in flight.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// Grace window for a ground jump after walking off a ledge.
    Coyote,
    /// Window during which a held jump keeps accelerating.
    JumpHold,
    /// Launch duration before control may return.
    Deflect,
    /// Flight time back to the safe location.
    Recovery,
    /// Delay before mantling is re-enabled.
    MantleDebounce,
    /// Duration of a wall scramble.
    EdgeScramble,
    /// Dash cooldown.
    Dash,
}

impl TimerSlot {
    /// Every slot, in storage order.
    pub const ALL: [TimerSlot; 7] = [
        TimerSlot::Coyote,
        TimerSlot::JumpHold,
        TimerSlot::Deflect,
        TimerSlot::Recovery,
        TimerSlot::MantleDebounce,
        TimerSlot::EdgeScramble,
        TimerSlot::Dash,
    ];

    /// The mode this timer belongs to, if any.
    ///
    /// Leaving that mode cancels the timer so its callback cannot fire into
    /// an unrelated mode later.
    pub fn owning_mode(self) -> Option<MovementMode> {
        match self {
            Self::Coyote | Self::JumpHold | Self::EdgeScramble => Some(MovementMode::Falling),
            Self::Deflect => Some(MovementMode::Deflected),
            Self::Recovery => Some(MovementMode::Recover),
            Self::MantleDebounce | Self::Dash => None,
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// One-shot timers for a character, indexed by [`TimerSlot`].
#[derive(Debug, Clone, Default)]
pub struct MovementTimers {
    slots: [Option<Timer>; 7],
    paused: bool,
}

impl MovementTimers {
    /// Create an empty set of timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `slot` to fire after `seconds`.
    ///
    /// If the slot is already running with at least as much time remaining,
    /// it is left untouched. Returns whether the slot was (re)armed.
    pub fn schedule(&mut self, slot: TimerSlot, seconds: f32) -> bool {
        let seconds = seconds.max(0.0);
        if let Some(existing) = &self.slots[slot.index()] {
            if existing.remaining_secs() >= seconds {
                return false;
            }
        }
        let mut timer = Timer::from_seconds(seconds, TimerMode::Once);
        if self.paused {
            timer.pause();
        }
        self.slots[slot.index()] = Some(timer);
        true
    }

    /// Cancel `slot`. Returns whether it was running.
    pub fn cancel(&mut self, slot: TimerSlot) -> bool {
        self.slots[slot.index()].take().is_some()
    }

    /// Cancel every timer that belongs to `mode`.
    pub fn cancel_owned_by(&mut self, mode: MovementMode) {
        for slot in TimerSlot::ALL {
            if slot.owning_mode() == Some(mode) {
                self.cancel(slot);
            }
        }
    }

    /// Cancel every timer.
    pub fn cancel_all(&mut self) {
        self.slots = Default::default();
    }

    /// Pause every timer, keeping elapsed progress.
    pub fn pause_all(&mut self) {
        self.paused = true;
        for timer in self.slots.iter_mut().flatten() {
            timer.pause();
        }
    }

    /// Resume every timer from where it was paused.
    pub fn resume_all(&mut self) {
        self.paused = false;
        for timer in self.slots.iter_mut().flatten() {
            timer.unpause();
        }
    }

    /// Whether the timers are paused as a block.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether `slot` is in flight.
    pub fn is_active(&self, slot: TimerSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    /// Seconds until `slot` fires, or zero when it is not running.
    pub fn remaining(&self, slot: TimerSlot) -> f32 {
        self.slots[slot.index()]
            .as_ref()
            .map(Timer::remaining_secs)
            .unwrap_or(0.0)
    }

    /// Advance all timers by `dt` seconds and return the slots that fired.
    pub fn tick(&mut self, dt: f32) -> Vec<TimerSlot> {
        let delta = Duration::from_secs_f32(dt.max(0.0));
        let mut fired = Vec::new();
        for slot in TimerSlot::ALL {
            let entry = &mut self.slots[slot.index()];
            let Some(timer) = entry else {
                continue;
            };
            timer.tick(delta);
            if timer.finished() {
                *entry = None;
                fired.push(slot);
            }
        }
        fired
    }
}
