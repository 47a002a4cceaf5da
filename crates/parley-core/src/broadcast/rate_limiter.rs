//! Token bucket limiting outbound campaign sends

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::trace;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Refills at `rate_per_second` up to `burst` tokens; each send takes one.
///
/// A non-positive rate disables limiting.
pub struct TokenBucket {
    rate_per_second: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate_per_second: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            rate_per_second,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available and take it
    pub async fn acquire(&self) {
        if self.rate_per_second <= 0.0 {
            return;
        }

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate_per_second).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                Duration::from_secs_f64((1.0 - state.tokens) / self.rate_per_second)
            };

            trace!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            sleep(wait).await;
        }
    }
}
