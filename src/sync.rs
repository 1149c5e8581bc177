//! Lock-mode crop synchronization.
//!
//! When lock mode is on, a user edit to one image (the *master*) is copied to
//! every other image. Drag events arrive at high frequency, so the fan-out is
//! debounced: edits inside the window collapse into one fan-out carrying the
//! latest rectangle.
//!
//! ```text
//! store.set(m, patch) ──► change queue ──► pump() ──► Debouncer
//!                                                      │ window elapsed
//!                                                      ▼
//!                               store.set_silent(i, rect)  for i != m
//! ```
//!
//! Fan-out writes go through the store's silent path, so they never show up
//! in the change queue and can't schedule another fan-out.
//!
//! Time is always passed in. Nothing here reads a clock, which keeps the
//! debounce behavior deterministic under test.

use crate::store::CropStore;
use crate::types::{CropRect, ImageIndex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Single-slot scheduled task with cancel-and-reschedule semantics.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace any pending value and restart the window at `now`.
    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.window));
    }

    /// Take the pending value if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, deadline)) if now >= *deadline => self.pending.take().map(|(v, _)| v),
            _ => None,
        }
    }

    /// Take the pending value regardless of its deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(v, _)| v)
    }

    /// Drop the pending value. Returns whether something was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, d)| *d)
    }
}

/// A fan-out waiting for its window to elapse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingFanOut {
    pub master: ImageIndex,
    pub rect: CropRect,
}

#[derive(Debug, Clone)]
pub struct CropSynchronizer {
    lock_mode: bool,
    debouncer: Debouncer<PendingFanOut>,
}

impl CropSynchronizer {
    pub fn new(window: Duration) -> Self {
        Self {
            lock_mode: false,
            debouncer: Debouncer::new(window),
        }
    }

    pub fn lock_mode(&self) -> bool {
        self.lock_mode
    }

    /// Turning lock mode off cancels a pending fan-out.
    pub fn set_lock_mode(&mut self, on: bool) {
        self.lock_mode = on;
        if !on && self.debouncer.cancel() {
            debug!("lock mode off, pending fan-out cancelled");
        }
    }

    /// Note a master edit. No-op unless lock mode is on.
    pub fn on_crop_changed(&mut self, master: ImageIndex, rect: CropRect, now: Instant) {
        if !self.lock_mode {
            return;
        }
        self.debouncer.schedule(PendingFanOut { master, rect }, now);
    }

    pub fn pending(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Drain user edits from the store, then run the fan-out if its window
    /// has elapsed. Returns the number of records rewritten.
    pub fn pump(&mut self, store: &mut CropStore, now: Instant) -> usize {
        for change in store.drain_changes() {
            self.on_crop_changed(change.index, change.rect, now);
        }
        match self.debouncer.take_due(now) {
            Some(fan_out) => Self::fan_out(store, fan_out),
            None => 0,
        }
    }

    /// Copy `x, y, width, height` from the master to every other record.
    fn fan_out(store: &mut CropStore, fan_out: PendingFanOut) -> usize {
        let PendingFanOut { master, rect } = fan_out;
        let mut updated = 0;
        for index in store.indices() {
            if index == master {
                continue;
            }
            if store.set_silent(index, rect).is_some() {
                updated += 1;
            }
        }
        debug!(master, updated, "crop fan-out applied");
        updated
    }

    /// Cancel any pending fan-out and drop edits the store queued since the
    /// last pump, so none of them can schedule a fan-out later.
    pub fn teardown(&mut self, store: &mut CropStore) {
        self.debouncer.cancel();
        let dropped = store.drain_changes().len();
        if dropped > 0 {
            debug!(dropped, "unpumped crop edits discarded");
        }
    }
}
