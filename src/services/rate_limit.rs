// Minimum-interval throttle for external APIs
// Each client owns its own instance, so sources never share pacing state.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializes callers so consecutive calls start at least `min_interval` apart
#[derive(Debug)]
pub struct Throttle {
    name: &'static str,
    min_interval: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(name: &'static str, min_interval: Duration) -> Self {
        Self {
            name,
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    /// Wait until the next call is allowed, then reserve the following slot.
    /// The lock is held while sleeping so waiters queue up in order.
    pub async fn wait(&self) {
        let mut next = self.next_allowed.lock().await;

        if let Some(at) = *next {
            let now = Instant::now();
            if at > now {
                tracing::debug!("{} rate limit: waiting {:?}", self.name, at - now);
                tokio::time::sleep_until(at).await;
            }
        }

        *next = Some(Instant::now() + self.min_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let throttle = Throttle::new("test", Duration::from_millis(500));
        let start = Instant::now();
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_calls_are_spaced() {
        let throttle = Throttle::new("test", Duration::from_millis(500));
        let start = Instant::now();
        throttle.wait().await;
        throttle.wait().await;
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_has_passed() {
        let throttle = Throttle::new("test", Duration::from_millis(200));
        throttle.wait().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        let before = Instant::now();
        throttle.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let throttle = Arc::new(Throttle::new("test", Duration::from_millis(100)));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let t = throttle.clone();
                tokio::spawn(async move {
                    t.wait().await;
                    Instant::now()
                })
            })
            .collect();

        let mut times = Vec::new();
        for h in handles {
            times.push(h.await.unwrap());
        }
        times.sort();

        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_throttles_do_not_interact() {
        let a = Throttle::new("a", Duration::from_millis(1000));
        let b = Throttle::new("b", Duration::from_millis(1000));
        let start = Instant::now();
        a.wait().await;
        b.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
