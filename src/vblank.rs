//! Frame presentation pacing.
//!
//! [`VblankWatch`] is a one-slot rendezvous between a signaling thread
//! (driven by vblank/flip completion events) and a waiting thread (the
//! frame submission path). It keeps the producer from queueing frames to
//! the display pipe faster than vblank retires them.

use std::sync::{Condvar, Mutex};

use tracing::trace;

/// What happens when a signal arrives while one is still outstanding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignalPolicy {
    /// Drop the redundant signal, keeping the watch a strict one-slot
    /// rendezvous. The waiter can never observe more signals than waits.
    #[default]
    Single,
    /// Count every signal. A wait still consumes all outstanding signals
    /// at once, so queued signals never cause spurious extra wakeups.
    Counting,
}

/// A caller-owned single-slot rendezvous for frame pacing.
///
/// Designed for exactly one signaling thread and one waiting thread. There
/// is no timeout or cancellation, [`await_and_reset`] blocks until a signal
/// arrives.
///
/// [`await_and_reset`]: Self::await_and_reset
#[derive(Debug, Default)]
pub struct VblankWatch {
    outstanding: Mutex<u32>,
    signaled: Condvar,
    policy: SignalPolicy,
}

impl VblankWatch {
    /// Create a watch with the given signal policy
    pub fn new(policy: SignalPolicy) -> Self {
        VblankWatch {
            outstanding: Mutex::new(0),
            signaled: Condvar::new(),
            policy,
        }
    }

    /// Record that a frame has retired and wake the waiter.
    ///
    /// Returns `false` if the signal was dropped because a previous one is
    /// still outstanding under [`SignalPolicy::Single`].
    pub fn signal(&self) -> bool {
        let mut outstanding = match self.outstanding.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.policy == SignalPolicy::Single && *outstanding > 0 {
            trace!("dropping redundant vblank signal");
            return false;
        }
        *outstanding += 1;
        self.signaled.notify_one();
        true
    }

    /// Block until at least one signal has occurred, then consume all
    /// outstanding signals
    pub fn await_and_reset(&self) {
        let mut outstanding = match self.outstanding.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *outstanding == 0 {
            outstanding = match self.signaled.wait(outstanding) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        *outstanding = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn signal_then_await_returns() {
        let watch = VblankWatch::new(SignalPolicy::Single);
        assert!(watch.signal());
        watch.await_and_reset();
    }

    #[test]
    fn redundant_signal_is_dropped() {
        let watch = VblankWatch::new(SignalPolicy::Single);
        assert!(watch.signal());
        assert!(!watch.signal());
        // one wait matches both signals, a second wait would block
        watch.await_and_reset();
    }

    #[test]
    fn counting_accepts_queued_signals_but_reset_consumes_all() {
        let watch = VblankWatch::new(SignalPolicy::Counting);
        assert!(watch.signal());
        assert!(watch.signal());
        watch.await_and_reset();
        // both queued signals were consumed
        assert_eq!(0, *watch.outstanding.lock().unwrap());
    }

    #[test]
    fn waiter_wakes_on_threaded_signal() {
        let watch = Arc::new(VblankWatch::new(SignalPolicy::Single));

        let signaler = {
            let watch = watch.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                watch.signal();
            })
        };

        watch.await_and_reset();
        signaler.join().unwrap();
    }
}
