//! Process-wide limit of one concurrent read pipeline.
//!
//! A read holds a [`ReadPermit`] for its whole lifetime. The permit is an RAII
//! guard: dropping it (on success, failure, cancellation or unwinding) frees
//! the slot and wakes the next waiting read.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use log::trace;
use once_cell::sync::Lazy;

use super::pipeline::CancelToken;

/// A single-occupancy slot.
pub(crate) struct ReadSlot {
    busy: Mutex<bool>,
    released: Condvar,
}

impl ReadSlot {
    pub(crate) fn new() -> Self {
        Self {
            busy: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    /// Wait for the slot, re-checking `cancel` every `poll`.
    ///
    /// Returns `None` if cancelled before the slot became free.
    pub(crate) fn acquire(
        &'static self,
        cancel: &CancelToken,
        poll: Duration,
    ) -> Option<ReadPermit> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        while *busy {
            if cancel.is_cancelled() {
                return None;
            }
            let (guard, _) = self
                .released
                .wait_timeout(busy, poll)
                .unwrap_or_else(PoisonError::into_inner);
            busy = guard;
        }
        if cancel.is_cancelled() {
            return None;
        }
        *busy = true;
        trace!("Read permit acquired");
        Some(ReadPermit { slot: self })
    }

    pub(crate) fn try_acquire(&'static self) -> Option<ReadPermit> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if *busy {
            return None;
        }
        *busy = true;
        Some(ReadPermit { slot: self })
    }

    fn is_busy(&self) -> bool {
        *self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        *self.busy.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.released.notify_one();
        trace!("Read permit released");
    }
}

static READ_SLOT: Lazy<ReadSlot> = Lazy::new(ReadSlot::new);

/// Exclusive right to run a read pipeline in this process.
pub struct ReadPermit {
    slot: &'static ReadSlot,
}

impl ReadPermit {
    /// Wait for the process-wide slot. `None` if cancelled while waiting.
    pub fn acquire(cancel: &CancelToken, poll: Duration) -> Option<Self> {
        READ_SLOT.acquire(cancel, poll)
    }

    /// Take the slot only if it is free right now.
    pub fn try_acquire() -> Option<Self> {
        READ_SLOT.try_acquire()
    }
}

impl Drop for ReadPermit {
    fn drop(&mut self) {
        self.slot.release();
    }
}

/// True while some read pipeline holds the process-wide permit.
pub fn read_in_progress() -> bool {
    READ_SLOT.is_busy()
}
