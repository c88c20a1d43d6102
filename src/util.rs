//! Backoff and cooperative-shutdown primitives shared by the engine tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Exponential backoff: min(cap, base * 2^attempt).
pub fn compute_backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let delay = base.as_secs_f64() * 2f64.powi(attempt.min(63) as i32);
    Duration::from_secs_f64(delay.min(cap.as_secs_f64()))
}

/// Explicit shared cancellation flag, checked at every blocking point.
///
/// Tasks never rely on abort; each suspension point races against
/// `cancelled()` so shutdown drains cooperatively.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

#[derive(Default)]
struct ShutdownInner {
    flag: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep that returns early on cancellation.
    pub async fn resilient_sleep(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);
        let delays: Vec<u64> = (0..7)
            .map(|a| compute_backoff(a, base, cap).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn backoff_never_exceeds_cap_on_large_attempts() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);
        assert_eq!(compute_backoff(200, base, cap), cap);
    }

    #[tokio::test]
    async fn resilient_sleep_returns_early_on_cancel() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move {
            waiter.resilient_sleep(Duration::from_secs(60)).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sleep did not observe cancellation")
            .unwrap();
    }
}
