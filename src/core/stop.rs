// src/core/stop.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::lock::lock_mutex;

/// Write-once cooperative shutdown flag shared by the orchestrator and
/// every capture worker. Once raised it stays raised.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    raised: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Returns `true` only for the call that flipped it.
    pub fn raise(&self) -> bool {
        let first = !self.inner.raised.swap(true, Ordering::SeqCst);
        // Taken so a waiter between its check and its wait cannot miss the notify.
        let _guard = lock_mutex(&self.inner.lock, "StopSignal::raise");
        self.inner.condvar.notify_all();
        first
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` or until the signal is raised, whichever comes
    /// first. Returns whether the signal is raised.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        self.wait_until(Instant::now() + duration)
    }

    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut guard = lock_mutex(&self.inner.lock, "StopSignal::wait");
        while !self.is_raised() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match self.inner.condvar.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Guard that raises the signal when dropped, unwinding included.
    pub fn raise_on_drop(&self) -> RaiseOnDrop<'_> {
        RaiseOnDrop(self)
    }
}

pub struct RaiseOnDrop<'a>(&'a StopSignal);

impl Drop for RaiseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.raise();
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("raised", &self.is_raised())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_is_write_once() {
        let stop = StopSignal::new();
        assert!(!stop.is_raised());
        assert!(stop.raise());
        assert!(!stop.raise());
        assert!(stop.is_raised());
    }

    #[test]
    fn test_wait_returns_early_when_raised() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.raise();
        });

        let started = Instant::now();
        assert!(stop.wait_timeout(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_times_out_when_not_raised() {
        let stop = StopSignal::new();
        assert!(!stop.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_guard_raises_on_unwind() {
        let stop = StopSignal::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = stop.raise_on_drop();
            assert!(!stop.is_raised());
            panic!("supervisor failed");
        }));
        assert!(result.is_err());
        assert!(stop.is_raised());
        assert!(!stop.raise());
    }

    #[test]
    fn test_never_observed_false_after_raise() {
        let stop = StopSignal::new();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let stop = stop.clone();
            handles.push(std::thread::spawn(move || {
                let mut seen_raised = false;
                for _ in 0..10_000 {
                    let now = stop.is_raised();
                    assert!(!(seen_raised && !now), "signal went back to false");
                    seen_raised |= now;
                }
            }));
        }
        stop.raise();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(stop.is_raised());
    }
}
