//! Process-wide admission control for collaborator calls.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::cancel::CancelToken;
use crate::error::LangspanError;

/// How often a waiting caller re-checks its cancel token.
pub(crate) const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct LimiterState {
    in_flight: usize,
    queued: usize,
}

/// Bounds concurrent OCR and translation calls across all documents.
///
/// Up to `max_in_flight` callers hold a permit at once. Further callers wait
/// in a queue of at most `max_queued`; anything beyond that is rejected with
/// [`LangspanError::Overloaded`] instead of piling up threads.
#[derive(Debug)]
pub struct CallLimiter {
    state: Mutex<LimiterState>,
    available: Condvar,
    max_in_flight: usize,
    max_queued: usize,
}

impl CallLimiter {
    /// Creates a limiter. `max_in_flight` is raised to at least 1.
    pub fn new(max_in_flight: usize, max_queued: usize) -> Self {
        Self {
            state: Mutex::new(LimiterState::default()),
            available: Condvar::new(),
            max_in_flight: max_in_flight.max(1),
            max_queued,
        }
    }

    /// A limiter sized for the machine: one call per CPU, with room for
    /// four times as many waiters.
    pub fn for_available_parallelism() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(cpus, cpus * 4)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    pub fn queued(&self) -> usize {
        self.state.lock().queued
    }

    /// Waits for a permit.
    ///
    /// # Errors
    /// - [`LangspanError::Overloaded`] when the wait queue is full.
    /// - [`LangspanError::Cancelled`] when `cancel` fires while waiting.
    pub fn acquire(&self, cancel: &CancelToken) -> Result<CallPermit<'_>, LangspanError> {
        cancel.check()?;

        let mut state = self.state.lock();
        if state.in_flight < self.max_in_flight {
            state.in_flight += 1;
            return Ok(CallPermit { limiter: self });
        }

        if state.queued >= self.max_queued {
            return Err(LangspanError::Overloaded {
                in_flight: state.in_flight,
                queued: state.queued,
            });
        }

        state.queued += 1;
        debug!(
            in_flight = state.in_flight,
            queued = state.queued,
            "waiting for call permit"
        );

        loop {
            if let Some(reason) = cancel.reason() {
                state.queued -= 1;
                return Err(LangspanError::Cancelled { reason });
            }
            if state.in_flight < self.max_in_flight {
                state.queued -= 1;
                state.in_flight += 1;
                return Ok(CallPermit { limiter: self });
            }
            self.available.wait_for(&mut state, CANCEL_POLL);
        }
    }

    /// Takes a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut state = self.state.lock();
        if state.in_flight < self.max_in_flight {
            state.in_flight += 1;
            Some(CallPermit { limiter: self })
        } else {
            None
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }
}

impl Default for CallLimiter {
    fn default() -> Self {
        Self::for_available_parallelism()
    }
}

/// RAII permit; releasing it wakes one queued caller.
#[derive(Debug)]
pub struct CallPermit<'a> {
    limiter: &'a CallLimiter,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn permits_are_counted_and_released() {
        let limiter = CallLimiter::new(2, 0);
        let cancel = CancelToken::new();
        let a = limiter.acquire(&cancel).unwrap();
        let b = limiter.acquire(&cancel).unwrap();
        assert_eq!(limiter.in_flight(), 2);
        assert!(limiter.try_acquire().is_none());
        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        drop(b);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[test]
    fn full_queue_rejects() {
        let limiter = CallLimiter::new(1, 0);
        let cancel = CancelToken::new();
        let _held = limiter.acquire(&cancel).unwrap();
        let err = limiter.acquire(&cancel).unwrap_err();
        assert!(matches!(
            err,
            LangspanError::Overloaded {
                in_flight: 1,
                queued: 0
            }
        ));
    }

    #[test]
    fn queued_caller_gets_permit_after_release() {
        let limiter = Arc::new(CallLimiter::new(1, 1));
        let cancel = CancelToken::new();
        let held = limiter.acquire(&cancel).unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            thread::spawn(move || {
                let cancel = CancelToken::new();
                let permit = limiter.acquire(&cancel);
                permit.is_ok()
            })
        };

        // Give the waiter time to enqueue before releasing.
        thread::sleep(Duration::from_millis(100));
        drop(held);
        assert!(waiter.join().unwrap());
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.queued(), 0);
    }

    #[test]
    fn cancelled_waiter_leaves_queue() {
        let limiter = Arc::new(CallLimiter::new(1, 4));
        let cancel = CancelToken::new();
        let _held = limiter.acquire(&cancel).unwrap();

        let waiter_cancel = CancelToken::new();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            let waiter_cancel = waiter_cancel.clone();
            thread::spawn(move || limiter.acquire(&waiter_cancel).map(|_| ()))
        };

        thread::sleep(Duration::from_millis(100));
        waiter_cancel.cancel();
        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(LangspanError::Cancelled { .. })));
        assert_eq!(limiter.queued(), 0);
    }
}
