//! Device timeline and CPU-visible signals.
//!
//! Every submission gets a monotonically increasing timeline value. Backends
//! report completion by signalling that value; resources remember the value
//! of their last submission so waits and disposal can be expressed as
//! "value `n` has completed".

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::BackendError;

/// Monotonic submission timeline of one device.
#[derive(Debug, Default)]
pub(crate) struct Timeline {
    state: Mutex<TimelineState>,
    condvar: Condvar,
}

#[derive(Debug, Default)]
struct TimelineState {
    submitted: u64,
    completed: u64,
    /// First execution failure not yet reported to the caller.
    fault: Option<BackendError>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value the next submission will receive.
    pub fn peek_next(&self) -> u64 {
        self.state.lock().submitted + 1
    }

    /// Record that `value` has been handed to the backend.
    pub fn mark_submitted(&self, value: u64) {
        let mut state = self.state.lock();
        debug_assert!(value > state.submitted, "timeline values must increase");
        state.submitted = state.submitted.max(value);
    }

    /// Last value handed to the backend.
    pub fn last_submitted(&self) -> u64 {
        self.state.lock().submitted
    }

    /// Highest value known complete.
    pub fn completed(&self) -> u64 {
        self.state.lock().completed
    }

    pub fn is_complete(&self, value: u64) -> bool {
        self.completed() >= value
    }

    /// Mark every value up to and including `value` complete.
    pub fn signal(&self, value: u64) {
        let mut state = self.state.lock();
        if value > state.completed {
            state.completed = value;
            self.condvar.notify_all();
        }
    }

    /// Remember a failure of work already handed to the backend. Later
    /// failures are dropped until the first one has been taken.
    pub fn record_fault(&self, error: BackendError) {
        let mut state = self.state.lock();
        if state.fault.is_none() {
            state.fault = Some(error);
        }
    }

    pub fn take_fault(&self) -> Option<BackendError> {
        self.state.lock().fault.take()
    }

    /// Block until `value` completes.
    pub fn wait(&self, value: u64) {
        let mut state = self.state.lock();
        while state.completed < value {
            self.condvar.wait(&mut state);
        }
    }

    /// Block until `value` completes or the timeout expires.
    pub fn wait_timeout(&self, value: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.completed < value {
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                return state.completed >= value;
            }
        }
        true
    }
}

/// Binary signal shared between a [`Fence`](crate::Fence) and the backend
/// completing the submission it was attached to.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    state: Mutex<SignalState>,
}

#[derive(Debug, Default)]
struct SignalState {
    signaled: bool,
    /// Timeline value of the submission that will signal this.
    pending_value: u64,
}

impl Signal {
    pub fn new(signaled: bool) -> Self {
        Self {
            state: Mutex::new(SignalState {
                signaled,
                pending_value: 0,
            }),
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    pub fn set(&self) {
        self.state.lock().signaled = true;
    }

    pub fn reset(&self) {
        self.state.lock().signaled = false;
    }

    pub fn attach(&self, value: u64) {
        self.state.lock().pending_value = value;
    }

    pub fn pending_value(&self) -> u64 {
        self.state.lock().pending_value
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_timeline_signal_is_monotonic() {
        let timeline = Timeline::new();
        assert_eq!(timeline.peek_next(), 1);
        timeline.mark_submitted(1);
        timeline.mark_submitted(2);
        assert_eq!(timeline.last_submitted(), 2);

        timeline.signal(2);
        timeline.signal(1);
        assert_eq!(timeline.completed(), 2);
        assert!(timeline.is_complete(1));
        assert!(!timeline.is_complete(3));
    }

    #[test]
    fn test_timeline_wait_across_threads() {
        let timeline = Arc::new(Timeline::new());
        timeline.mark_submitted(1);
        let signaller = Arc::clone(&timeline);
        let handle = thread::spawn(move || signaller.signal(1));
        timeline.wait(1);
        handle.join().unwrap();
        assert!(timeline.is_complete(1));
    }

    #[test]
    fn test_timeline_wait_timeout() {
        let timeline = Timeline::new();
        timeline.mark_submitted(1);
        assert!(!timeline.wait_timeout(1, Duration::from_millis(5)));
        timeline.signal(1);
        assert!(timeline.wait_timeout(1, Duration::from_millis(5)));
    }

    #[test]
    fn test_signal() {
        let signal = Signal::new(false);
        assert!(!signal.is_signaled());
        signal.attach(4);
        signal.set();
        assert!(signal.is_signaled());
        assert_eq!(signal.pending_value(), 4);
        signal.reset();
        assert!(!signal.is_signaled());
    }
}
