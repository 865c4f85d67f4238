//! Client-side snapshot history and interpolation between authoritative snapshots

use log::trace;
use shared::State;
use std::time::Instant;

#[derive(Debug, Clone)]
struct TimedSnapshot {
    index: u32,
    state: State,
    /// Local arrival time; the server's clock is never consulted
    received_at: Instant,
}

/// Keeps the two most recent snapshots and blends between them for rendering.
///
/// The blend fraction is derived from how long ago the newest snapshot arrived relative to the
/// gap between the last two arrivals, so the rendered world trails the server by about one
/// snapshot interval.
#[derive(Debug, Default)]
pub struct Reconciler {
    prev: Option<TimedSnapshot>,
    next: Option<TimedSnapshot>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a snapshot unless it is older than (or the same as) the last applied one.
    pub fn apply(&mut self, index: u32, state: State, now: Instant) -> bool {
        if let Some(next) = &self.next {
            if index <= next.index {
                trace!("Discarding stale snapshot {} (have {})", index, next.index);
                return false;
            }
        }

        self.prev = self.next.take();
        self.next = Some(TimedSnapshot {
            index,
            state,
            received_at: now,
        });
        true
    }

    pub fn last_index(&self) -> Option<u32> {
        self.next.as_ref().map(|snapshot| snapshot.index)
    }

    pub fn latest(&self) -> Option<&State> {
        self.next.as_ref().map(|snapshot| &snapshot.state)
    }

    /// Fraction of the way from `prev` to `next` the render should be at `now`.
    ///
    /// `None` until two snapshots with distinct arrival times are known.
    pub fn fraction(&self, now: Instant) -> Option<f64> {
        let (prev, next) = (self.prev.as_ref()?, self.next.as_ref()?);
        let gap = next.received_at.saturating_duration_since(prev.received_at);
        if gap.is_zero() {
            return None;
        }

        let elapsed = now.saturating_duration_since(next.received_at);
        Some((elapsed.as_secs_f64() / gap.as_secs_f64()).clamp(0.0, 1.0))
    }

    /// World state to render at `now`, or `None` before the first snapshot.
    pub fn interpolated(&self, now: Instant) -> Option<State> {
        let next = self.next.as_ref()?;
        match (self.prev.as_ref(), self.fraction(now)) {
            (Some(prev), Some(t)) => Some(prev.state.merge_interpolate(&next.state, t)),
            _ => Some(next.state.clone()),
        }
    }
}
