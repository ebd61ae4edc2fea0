//! Per-topic rate limiting: a token bucket refilled lazily on `acquire`
//! rather than by a background task, so idle topics cost nothing and the
//! bucket is trivially drivable under `tokio::time::pause`.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct State {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    per_second: f64,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(permits_per_second: u32) -> Self {
        let capacity = permits_per_second.max(1) as f64;
        RateLimiter {
            capacity,
            per_second: capacity,
            state: Mutex::new(State {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until one permit is available, refilling based on elapsed wall
    /// time since the last call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.per_second).min(self.capacity);
                state.last_refill = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.per_second))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}
