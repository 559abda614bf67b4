//! Event group: a set of posted event bits plus a waiter
//!
//! Posting never blocks and may happen from interrupt context. Bits stay set until explicitly
//! cleared, so a waiter that wakes up late still observes every event posted in the meantime.
use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

/// Bitmask of pending events with a single waiter
pub struct EventGroup<M: RawMutex> {
    pending: Mutex<M, Cell<u32>>,
    signal: Signal<M, ()>,
}

impl<M: RawMutex> EventGroup<M> {
    /// Create a new event group with no pending events
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(0)),
            signal: Signal::new(),
        }
    }

    /// Set the given event bits and wake the waiter
    pub fn post(&self, events: u32) {
        self.pending.lock(|pending| pending.set(pending.get() | events));
        self.signal.signal(());
    }

    /// Clear the given event bits
    pub fn clear(&self, events: u32) {
        self.pending.lock(|pending| pending.set(pending.get() & !events));
    }

    /// Currently pending event bits
    pub fn pending(&self) -> u32 {
        self.pending.lock(|pending| pending.get())
    }

    /// Returns true if any of the given event bits is pending
    pub fn test(&self, events: u32) -> bool {
        self.pending() & events != 0
    }

    /// Wait until at least one bit in `mask` is pending, returns the pending bits within `mask`
    ///
    /// The returned bits are not cleared.
    pub async fn wait_any(&self, mask: u32) -> u32 {
        loop {
            // Reset before sampling so a post racing with the check still wakes us
            self.signal.reset();
            let pending = self.pending() & mask;
            if pending != 0 {
                return pending;
            }

            self.signal.wait().await;
        }
    }
}

impl<M: RawMutex> Default for EventGroup<M> {
    fn default() -> Self {
        Self::new()
    }
}
