//! Frequency cycling scheduler state
//!
//! Holds the ordered list of ranges and the dwell time. Every read and write
//! goes through one mutex so a snapshot always pairs `in_transition` with a
//! `current_frequency` that is either the pre- or post-switch range.
//!
//! Ranges that keep failing can be blacklisted; the cycle then steps over
//! them. The last usable range is never blacklisted.

use shared::{CycleConfigPayload, CycleState, FrequencyRange};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_millis(10_000);
pub const MIN_SWITCHING_TIME: Duration = Duration::from_millis(500);
pub const MAX_SWITCHING_TIME: Duration = Duration::from_millis(3_000);
/// Longest dwell accepted per range
pub const MAX_CYCLE_TIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Time spent inside a switch: a quarter of the dwell, clamped to 0.5-3 s
pub fn switching_time_for(cycle_time: Duration) -> Duration {
    (cycle_time / 4).clamp(MIN_SWITCHING_TIME, MAX_SWITCHING_TIME)
}

/// A switch in progress, returned by [`FrequencyCycler::begin_transition`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTransition {
    pub from: FrequencyRange,
    pub to: FrequencyRange,
    pub to_index: usize,
}

#[derive(Debug)]
struct CyclerInner {
    frequencies: Vec<FrequencyRange>,
    /// Parallel to `frequencies`
    blacklisted: Vec<bool>,
    index: usize,
    in_transition: bool,
    is_cycling: bool,
    cycle_time: Duration,
    switching_time: Duration,
}

impl CyclerInner {
    fn snapshot(&self) -> CycleState {
        CycleState {
            current_frequency: self.frequencies.get(self.index).copied(),
            index: self.index,
            in_transition: self.in_transition,
            is_cycling: self.is_cycling,
        }
    }

    fn is_usable(&self, index: usize) -> bool {
        index < self.frequencies.len() && !self.blacklisted.get(index).copied().unwrap_or(false)
    }

    /// Next usable range after the current one, wrapping
    fn next_index(&self) -> Option<usize> {
        let len = self.frequencies.len();
        (1..len).map(|step| (self.index + step) % len).find(|i| self.is_usable(*i))
    }

    fn usable_count(&self) -> usize {
        (0..self.frequencies.len()).filter(|i| self.is_usable(*i)).count()
    }

    fn blacklisted_ranges(&self) -> Vec<FrequencyRange> {
        self.frequencies
            .iter()
            .zip(&self.blacklisted)
            .filter(|(_, blacklisted)| **blacklisted)
            .map(|(range, _)| *range)
            .collect()
    }

    fn transition_to(&mut self, to_index: usize) -> Option<CycleTransition> {
        let from = *self.frequencies.get(self.index)?;
        let to = *self.frequencies.get(to_index)?;
        self.in_transition = true;
        Some(CycleTransition { from, to, to_index })
    }
}

#[derive(Debug)]
pub struct FrequencyCycler {
    inner: Mutex<CyclerInner>,
}

impl Default for FrequencyCycler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyCycler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CyclerInner {
                frequencies: Vec::new(),
                blacklisted: Vec::new(),
                index: 0,
                in_transition: false,
                is_cycling: false,
                cycle_time: DEFAULT_CYCLE_TIME,
                switching_time: switching_time_for(DEFAULT_CYCLE_TIME),
            }),
        }
    }

    // Mutations never leave partial state, so a poisoned guard is still usable
    fn lock(&self) -> MutexGuard<'_, CyclerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the range list and restart from the first entry.
    ///
    /// Cycling is only enabled when more than one range is configured.
    pub fn configure(
        &self,
        frequencies: Vec<FrequencyRange>,
        cycle_time: Duration,
        switching_time: Option<Duration>,
    ) -> CycleState {
        let mut inner = self.lock();
        inner.is_cycling = frequencies.len() > 1;
        inner.blacklisted = vec![false; frequencies.len()];
        inner.frequencies = frequencies;
        inner.index = 0;
        inner.in_transition = false;
        inner.cycle_time = cycle_time;
        inner.switching_time = switching_time.unwrap_or_else(|| switching_time_for(cycle_time));
        inner.snapshot()
    }

    /// Drop all configuration, back to the empty state
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.frequencies.clear();
        inner.blacklisted.clear();
        inner.index = 0;
        inner.in_transition = false;
        inner.is_cycling = false;
    }

    pub fn state(&self) -> CycleState {
        self.lock().snapshot()
    }

    pub fn current(&self) -> Option<FrequencyRange> {
        self.lock().snapshot().current_frequency
    }

    pub fn next_frequency(&self) -> Option<FrequencyRange> {
        let inner = self.lock();
        inner.next_index().and_then(|i| inner.frequencies.get(i).copied())
    }

    pub fn frequencies(&self) -> Vec<FrequencyRange> {
        self.lock().frequencies.clone()
    }

    pub fn cycle_time(&self) -> Duration {
        self.lock().cycle_time
    }

    pub fn switching_time(&self) -> Duration {
        self.lock().switching_time
    }

    pub fn is_cycling(&self) -> bool {
        self.lock().is_cycling
    }

    pub fn in_transition(&self) -> bool {
        self.lock().in_transition
    }

    /// Mark a switch as started without moving off the current range yet.
    ///
    /// Returns `None` when cycling is off, a switch is already running, or no
    /// other usable range is left.
    pub fn begin_transition(&self) -> Option<CycleTransition> {
        let mut inner = self.lock();
        if !inner.is_cycling || inner.in_transition {
            return None;
        }
        let to_index = inner.next_index()?;
        inner.transition_to(to_index)
    }

    /// Like [`begin_transition`](Self::begin_transition) but towards a chosen
    /// entry. Out of range, blacklisted or current targets are refused.
    pub fn skip_to(&self, index: usize) -> Option<CycleTransition> {
        let mut inner = self.lock();
        if inner.in_transition || index == inner.index || !inner.is_usable(index) {
            return None;
        }
        inner.transition_to(index)
    }

    /// Move onto the target range and clear the transition flag
    pub fn complete_transition(&self, transition: &CycleTransition) -> CycleState {
        let mut inner = self.lock();
        if transition.to_index < inner.frequencies.len() {
            inner.index = transition.to_index;
        }
        inner.in_transition = false;
        inner.snapshot()
    }

    /// Clear the transition flag and stay on the current range
    pub fn abort_transition(&self) -> CycleState {
        let mut inner = self.lock();
        inner.in_transition = false;
        inner.snapshot()
    }

    /// Begin and complete a switch with nothing in between
    pub fn advance(&self) -> CycleState {
        match self.begin_transition() {
            Some(transition) => self.complete_transition(&transition),
            None => self.state(),
        }
    }

    /// Change the dwell and switching pause while cycling. `None` keeps the
    /// current value; the new dwell applies from the next switch.
    pub fn update_timing(&self, cycle_time: Option<Duration>, switching_time: Option<Duration>) -> CycleState {
        let mut inner = self.lock();
        if let Some(cycle_time) = cycle_time {
            inner.cycle_time = cycle_time;
        }
        if let Some(switching_time) = switching_time {
            inner.switching_time = switching_time;
        }
        inner.snapshot()
    }

    /// Drop every entry equal to `range` from the cycle.
    ///
    /// Refused when it would leave nothing to sweep. If the current range is
    /// dropped outside a switch the cursor moves to the next usable entry.
    pub fn blacklist(&self, range: &FrequencyRange) -> bool {
        let mut inner = self.lock();
        let matching: Vec<usize> = (0..inner.frequencies.len())
            .filter(|i| inner.is_usable(*i) && inner.frequencies[*i] == *range)
            .collect();
        if matching.is_empty() || matching.len() >= inner.usable_count() {
            return false;
        }
        for i in matching {
            inner.blacklisted[i] = true;
        }
        if !inner.in_transition && !inner.is_usable(inner.index) {
            if let Some(next) = inner.next_index() {
                inner.index = next;
            }
        }
        true
    }

    pub fn is_blacklisted(&self, range: &FrequencyRange) -> bool {
        let inner = self.lock();
        inner
            .frequencies
            .iter()
            .zip(&inner.blacklisted)
            .any(|(r, blacklisted)| *blacklisted && r == range)
    }

    pub fn blacklisted(&self) -> Vec<FrequencyRange> {
        self.lock().blacklisted_ranges()
    }

    /// Payload for the `cycle_config` event
    pub fn config_payload(&self) -> CycleConfigPayload {
        let inner = self.lock();
        let cycle_time_ms = u64::try_from(inner.cycle_time.as_millis()).unwrap_or(u64::MAX);
        CycleConfigPayload {
            frequencies: inner.frequencies.clone(),
            current_index: inner.index,
            next_frequency: inner.next_index().and_then(|i| inner.frequencies.get(i).copied()),
            is_cycling: inner.is_cycling,
            cycle_time_ms,
            switching_time_ms: u64::try_from(inner.switching_time.as_millis()).unwrap_or(u64::MAX),
            total_cycle_time_ms: cycle_time_ms.saturating_mul(inner.usable_count() as u64),
            blacklisted: inner.blacklisted_ranges(),
        }
    }
}
