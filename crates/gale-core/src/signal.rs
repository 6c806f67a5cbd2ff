//! One-shot cross-thread completion signal
//!
//! A single-assignment cell paired with a condition variable. The value is
//! published at most once; every reader that observes it also observes
//! everything the producer wrote before publishing.
//!
//! Waiting with a timeout never consumes anything: a reader that gives up
//! can wait again later and still see the value.

use parking_lot::{Condvar, Mutex};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

pub(crate) struct Signal<T> {
    value: OnceLock<T>,
    lock: Mutex<()>,
    ready: Condvar,
}

impl<T> Signal<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: OnceLock::new(),
            lock: Mutex::new(()),
            ready: Condvar::new(),
        }
    }

    /// Publish the value and wake every waiter.
    ///
    /// A second call leaves the first value in place and hands the rejected
    /// value back.
    pub(crate) fn fulfill(&self, value: T) -> Result<(), T> {
        self.value.set(value)?;
        // Taking the lock orders this notify after any waiter's check-then-wait
        let _guard = self.lock.lock();
        self.ready.notify_all();
        Ok(())
    }

    /// Non-blocking check
    pub(crate) fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// Block until fulfilled
    pub(crate) fn wait(&self) -> &T {
        if let Some(value) = self.value.get() {
            return value;
        }
        let mut guard = self.lock.lock();
        loop {
            if let Some(value) = self.value.get() {
                return value;
            }
            self.ready.wait(&mut guard);
        }
    }

    /// Block until fulfilled or until `timeout` elapses
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<&T> {
        if let Some(value) = self.value.get() {
            return Some(value);
        }
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => return Some(self.wait()),
        };
        let mut guard = self.lock.lock();
        loop {
            if let Some(value) = self.value.get() {
                return Some(value);
            }
            if self.ready.wait_until(&mut guard, deadline).timed_out() {
                return self.value.get();
            }
        }
    }
}
