use std::time::Duration;

use rand::Rng;

const INITIAL_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 60_000;

/// Exponential backoff with jitter, 1s doubling to a 60s cap. Generalizes
/// the fixed `[1, 2, 4, 8, 16, 30]` cycling delay this codebase uses for its
/// cloud long-running-operation polling to true multiply-with-cap growth,
/// since the retry targets here (HTTP requests) can legitimately need
/// longer gaps than a 30s-ceiling poll loop.
pub struct Backoff {
    attempt: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    /// Delay before the next attempt, then advances internal state.
    pub fn next_delay(&mut self) -> Duration {
        let exp_ms = INITIAL_DELAY_MS.saturating_mul(1u64 << self.attempt.min(20));
        let capped_ms = exp_ms.min(MAX_DELAY_MS);
        self.attempt += 1;

        let jitter_ms = rand::thread_rng().gen_range(0..=capped_ms / 4);
        Duration::from_millis(capped_ms + jitter_ms)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let mut b = Backoff::new();
        let first = b.next_delay();
        assert!(first >= Duration::from_secs(1) && first < Duration::from_millis(1_250));

        let mut last = first;
        for _ in 0..10 {
            let d = b.next_delay();
            assert!(d <= Duration::from_millis(MAX_DELAY_MS + MAX_DELAY_MS / 4));
            last = d;
        }
        assert!(last >= Duration::from_secs(60));
    }

    #[test]
    fn reset_returns_to_initial_delay() {
        let mut b = Backoff::new();
        for _ in 0..5 {
            b.next_delay();
        }
        b.reset();
        let d = b.next_delay();
        assert!(d < Duration::from_millis(1_250));
    }
}
