//! Bounded concurrency for tile fetches.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A counting semaphore limiting how many tile fetches are in flight.
///
/// Waiters block on a condition variable until a permit is released.
#[derive(Debug)]
pub struct FetchGate {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl FetchGate {
    /// Returns a gate allowing `capacity` concurrent holders.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        }
    }

    /// Blocks until a permit is available.
    pub fn acquire(&self) -> Permit<'_> {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        Permit { gate: self }
    }

    /// Returns a permit if one is free without waiting.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut available = self.lock();
        if *available == 0 {
            None
        } else {
            *available -= 1;
            Some(Permit { gate: self })
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of permits not currently held.
    pub fn available(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // The counter is always left consistent, so a panic in
        // another holder does not invalidate it.
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        *self.lock() += 1;
        self.released.notify_one();
    }
}

/// Returns its slot to the [`FetchGate`] when dropped.
#[derive(Debug)]
pub struct Permit<'a> {
    gate: &'a FetchGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
