//! Gate-wide throughput throttle backed by a lazily refilled token bucket.

// self
use crate::_prelude::*;

#[derive(Clone, Copy, Debug)]
struct BucketState {
	tokens: f64,
	last_refill: OffsetDateTime,
}

/// Refillable token bucket pacing outbound throughput across the whole gate.
///
/// Refill happens lazily at call time; the state mutates under a single async mutex so
/// concurrent acquirers serialize. [`TokenBucketLimiter::acquire`] rejects, never blocks;
/// [`TokenBucketLimiter::wait_for`] suspends, never fails.
#[derive(Debug)]
pub struct TokenBucketLimiter {
	state: AsyncMutex<BucketState>,
	max_tokens: f64,
	refill_rate: f64,
	backoff: StdDuration,
}
impl TokenBucketLimiter {
	/// Default backoff between [`wait_for`](Self::wait_for) retries.
	pub const DEFAULT_BACKOFF: StdDuration = StdDuration::from_millis(100);

	/// Creates a full bucket holding `max_tokens` refilled at `refill_rate` tokens per second.
	pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
		Self {
			state: AsyncMutex::new(BucketState {
				tokens: max_tokens,
				last_refill: OffsetDateTime::now_utc(),
			}),
			max_tokens,
			refill_rate,
			backoff: Self::DEFAULT_BACKOFF,
		}
	}

	/// Overrides the retry backoff used by [`wait_for`](Self::wait_for).
	pub fn with_backoff(mut self, backoff: StdDuration) -> Self {
		self.backoff = backoff;

		self
	}

	/// Attempts to take `cost` tokens against the current clock.
	pub async fn acquire(&self, cost: f64) -> bool {
		self.acquire_at(cost, OffsetDateTime::now_utc()).await
	}

	/// Attempts to take `cost` tokens as of `now`.
	///
	/// The bucket refills by `elapsed * refill_rate` capped at `max_tokens` before the check, so
	/// the balance never exceeds the ceiling and never goes negative.
	pub async fn acquire_at(&self, cost: f64, now: OffsetDateTime) -> bool {
		let mut state = self.state.lock().await;
		let elapsed = (now - state.last_refill).as_seconds_f64().max(0.0);

		state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.max_tokens);
		state.last_refill = now;

		if state.tokens >= cost {
			state.tokens -= cost;

			return true;
		}

		false
	}

	/// Suspends until `cost` tokens have been taken.
	pub async fn wait_for(&self, cost: f64) {
		while !self.acquire(cost).await {
			tokio::time::sleep(self.backoff).await;
		}
	}

	/// Current token balance, without refilling.
	pub async fn available(&self) -> f64 {
		self.state.lock().await.tokens
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[tokio::test]
	async fn balance_stays_within_bounds() {
		let bucket = TokenBucketLimiter::new(10.0, 5.0);
		let base = macros::datetime!(2025-01-01 00:00 UTC);

		assert!(bucket.acquire_at(10.0, base).await);
		assert!(!bucket.acquire_at(1.0, base).await, "empty bucket must reject");
		assert!(bucket.available().await >= 0.0);

		// An hour of refill still caps at max_tokens.
		assert!(bucket.acquire_at(10.0, base + Duration::hours(1)).await);
		assert!(!bucket.acquire_at(0.5, base + Duration::hours(1)).await);
	}

	#[tokio::test]
	async fn refill_is_proportional_to_elapsed_time() {
		let bucket = TokenBucketLimiter::new(10.0, 2.0);
		let base = macros::datetime!(2025-01-01 00:00 UTC);

		assert!(bucket.acquire_at(10.0, base).await);
		assert!(!bucket.acquire_at(3.0, base + Duration::seconds(1)).await);
		assert!(bucket.acquire_at(3.0, base + Duration::seconds(2)).await);
	}

	#[tokio::test]
	async fn wait_for_suspends_until_tokens_return() {
		let bucket = TokenBucketLimiter::new(1.0, 1000.0).with_backoff(StdDuration::from_millis(1));

		assert!(bucket.acquire(1.0).await);

		// Refills within a few milliseconds at this rate; wait_for must come back.
		bucket.wait_for(1.0).await;
	}
}
