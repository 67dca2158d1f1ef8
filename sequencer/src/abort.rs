//! Cooperative cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation flag shared between the run task and any external caller.
///
/// The runner clears the token at the start of a run and reads it at two
/// points only: before starting a new exposure, and right after a camera
/// call returns. External callers set it at most once per run. The token
/// carries no device knowledge; the paired hardware abort of the exposure
/// in flight lives in the runner's `abort()`.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    flag: Arc<AtomicBool>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe from any thread or task at any time.
    pub fn set(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Only the runner clears the token, at the start of a run.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let token = AbortToken::new();
        assert!(!token.is_set());

        token.set();
        assert!(token.is_set());

        token.clear();
        assert!(!token.is_set());
    }

    #[test]
    fn test_clones_share_the_flag() {
        let token = AbortToken::new();
        let remote = token.clone();

        let handle = std::thread::spawn(move || remote.set());
        handle.join().unwrap();

        assert!(token.is_set());
    }
}
