//! Main-thread recovery gate (`WaitOnMainThread` in the source): a 3-state
//! handoff point a worker blocks on until the main thread runs recovery and
//! clears it, or the gate is destroyed out from under it.

use std::sync::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Clear,
    Waiting,
    Broken,
}

pub struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Clear),
            cond: Condvar::new(),
        }
    }

    /// Request main-thread attention and block until `clear()` releases this
    /// call, or the gate is destroyed. Returns `false` on destroy, in which
    /// case the caller should treat its pending work as failed rather than
    /// retry.
    pub fn signal(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == GateState::Broken {
            return false;
        }
        *state = GateState::Waiting;
        self.cond.notify_all();
        while *state == GateState::Waiting {
            state = self.cond.wait(state).unwrap();
        }
        *state != GateState::Broken
    }

    /// True if some thread is currently blocked in `signal()`.
    pub fn is_waiting(&self) -> bool {
        *self.state.lock().unwrap() == GateState::Waiting
    }

    /// Called from the main thread's pump after recovery succeeds.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == GateState::Waiting {
            *state = GateState::Clear;
            self.cond.notify_all();
        }
    }

    /// Poison the gate: every blocked and future `signal()` returns `false`
    /// immediately instead of waiting. Used on cancellation so no worker is
    /// left stuck requesting attention nobody will give.
    pub fn destroy(&self) {
        let mut state = self.state.lock().unwrap();
        *state = GateState::Broken;
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn signal_blocks_until_cleared() {
        let gate = Arc::new(Gate::new());
        let g = Arc::clone(&gate);
        let worker = thread::spawn(move || g.signal());

        while !gate.is_waiting() {
            thread::sleep(Duration::from_millis(1));
        }
        gate.clear();
        assert!(worker.join().unwrap());
    }

    #[test]
    fn destroy_releases_waiters_with_false() {
        let gate = Arc::new(Gate::new());
        let g = Arc::clone(&gate);
        let worker = thread::spawn(move || g.signal());

        while !gate.is_waiting() {
            thread::sleep(Duration::from_millis(1));
        }
        gate.destroy();
        assert!(!worker.join().unwrap());
    }

    #[test]
    fn signal_after_destroy_returns_false_immediately() {
        let gate = Gate::new();
        gate.destroy();
        assert!(!gate.signal());
    }
}
