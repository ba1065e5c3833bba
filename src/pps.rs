//! Pulse-per-second tracking.
//!
//! [`PpsTracker::on_pulse`] runs from the edge interrupt and only does
//! arithmetic and copies. Formatting and printing belong to whoever reads
//! a [`PpsSnapshot`].

use crate::state::{Clock, GnssState};

/// A perfect receiver pulses exactly this far apart.
pub const NOMINAL_INTERVAL_MS: u32 = 1000;

/// Distance of `interval_ms` from [`NOMINAL_INTERVAL_MS`].
pub fn jitter_ms(interval_ms: u32) -> u32 {
    interval_ms.abs_diff(NOMINAL_INTERVAL_MS)
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PpsTracker {
    pulse_count: u32,
    last_tick_ms: u32,
    interval_ms: u32,
    new_pulse: bool,
    synced_time: Clock,
    synced_date: Clock,
}

/// Everything the tracker knows, copied out for display.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PpsSnapshot {
    pub pulse_count: u32,
    pub last_tick_ms: u32,
    pub interval_ms: u32,
    pub synced_time: Clock,
    pub synced_date: Clock,
}

impl PpsSnapshot {
    /// `None` until two pulses have been seen.
    pub fn jitter_ms(&self) -> Option<u32> {
        if self.interval_ms == 0 {
            None
        } else {
            Some(jitter_ms(self.interval_ms))
        }
    }
}

impl Default for PpsTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn not_synced() -> Clock {
    Clock::try_from_str("N/A").unwrap_or_default()
}

impl PpsTracker {
    pub fn new() -> Self {
        Self {
            pulse_count: 0,
            last_tick_ms: 0,
            interval_ms: 0,
            new_pulse: false,
            synced_time: not_synced(),
            synced_date: not_synced(),
        }
    }

    /// Records an edge seen at `now_ms` on a millisecond clock that may wrap.
    pub fn on_pulse(&mut self, now_ms: u32, gnss: &GnssState) {
        self.pulse_count = self.pulse_count.wrapping_add(1);
        if self.pulse_count != 1 {
            self.interval_ms = now_ms.wrapping_sub(self.last_tick_ms);
        }
        self.last_tick_ms = now_ms;
        self.synced_time = *gnss.time_of_day();
        self.synced_date = *gnss.date();
        self.new_pulse = true;
    }

    /// Reads and clears the new-pulse flag. Pulses since the last call
    /// collapse into a single `true`.
    pub fn take_new_pulse(&mut self) -> bool {
        core::mem::take(&mut self.new_pulse)
    }

    pub fn pulse_count(&self) -> u32 {
        self.pulse_count
    }

    pub fn last_tick_ms(&self) -> u32 {
        self.last_tick_ms
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn has_new_pulse(&self) -> bool {
        self.new_pulse
    }

    pub fn synced_time(&self) -> &Clock {
        &self.synced_time
    }

    pub fn synced_date(&self) -> &Clock {
        &self.synced_date
    }

    pub fn snapshot(&self) -> PpsSnapshot {
        PpsSnapshot {
            pulse_count: self.pulse_count,
            last_tick_ms: self.last_tick_ms,
            interval_ms: self.interval_ms,
            synced_time: self.synced_time,
            synced_date: self.synced_date,
        }
    }
}
