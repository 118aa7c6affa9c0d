//! Cooperative cancellation and sliced sleeping.
//!
//! The engine runs a single synchronous loop; every delay it takes must
//! remain responsive to an operator interrupt. Long sleeps are chopped into
//! short slices so a raised cancellation token is observed within roughly
//! 50ms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Maximum length of one uninterruptible sleep slice.
pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared cancellation flag, cloneable across the controlling thread and the
/// execution loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the token. Idempotent; the token cannot be lowered.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Abstraction over blocking delays so tests can run without real waits.
pub trait Sleeper: Send {
    /// Block for up to `duration`, returning early if `cancel` is raised.
    fn sleep(&mut self, duration: Duration, cancel: &CancelToken);
}

/// Production sleeper: sleeps in slices no longer than [`SLEEP_SLICE`],
/// checking the token between slices.
#[derive(Debug, Default)]
pub struct SlicedSleeper;

impl Sleeper for SlicedSleeper {
    fn sleep(&mut self, duration: Duration, cancel: &CancelToken) {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if cancel.is_cancelled() {
                return;
            }
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
}

/// Test sleeper: records every requested delay and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct InstantSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// All durations requested so far, in call order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }
}

impl Sleeper for InstantSleeper {
    fn sleep(&mut self, duration: Duration, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            return;
        }
        self.slept.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_token_starts_lowered() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sliced_sleeper_returns_early_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let mut sleeper = SlicedSleeper;
        let start = Instant::now();
        sleeper.sleep(Duration::from_secs(10), &token);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn test_sliced_sleeper_completes_short_sleep() {
        let token = CancelToken::new();
        let mut sleeper = SlicedSleeper;
        let start = Instant::now();
        sleeper.sleep(Duration::from_millis(20), &token);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_instant_sleeper_records_durations() {
        let token = CancelToken::new();
        let mut sleeper = InstantSleeper::new();
        sleeper.sleep(Duration::from_millis(100), &token);
        sleeper.sleep(Duration::from_millis(250), &token);
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_millis(100), Duration::from_millis(250)]
        );
        assert_eq!(sleeper.total(), Duration::from_millis(350));
    }

    #[test]
    fn test_instant_sleeper_skips_recording_after_cancel() {
        let token = CancelToken::new();
        let mut sleeper = InstantSleeper::new();
        sleeper.sleep(Duration::from_millis(10), &token);
        token.cancel();
        sleeper.sleep(Duration::from_millis(10), &token);
        assert_eq!(sleeper.slept().len(), 1);
    }
}
