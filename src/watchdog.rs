// Inactivity watchdog
// Counts control ticks since the last accepted frame. Knows nothing about motion:
// the tick driver decides what expiry means (it stops the motors).

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchdog {
    countdown: u32,
    remaining_ticks: u32,
    armed: bool,
}

impl Watchdog {
    /// `countdown` is the window in ticks (timeout / tick period)
    pub fn new(countdown: u32) -> Self {
        Self {
            countdown,
            remaining_ticks: 0,
            armed: false,
        }
    }

    /// Arm and reload the full countdown
    pub fn reset(&mut self) {
        self.armed = true;
        self.remaining_ticks = self.countdown;
    }

    /// Disarm without signalling (used on disconnect)
    pub fn disarm(&mut self) {
        self.armed = false;
        self.remaining_ticks = 0;
    }

    /// Advance one tick. Returns true exactly once per expiry.
    pub fn tick(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        if self.remaining_ticks > 0 {
            self.remaining_ticks -= 1;
            return false;
        }

        self.armed = false;
        debug!("Watchdog expired after {} ticks", self.countdown);
        true
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn remaining_ticks(&self) -> u32 {
        self.remaining_ticks
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }
}
