//! Per-identity admission control over a trailing time window.

// self
use crate::{_prelude::*, id::IdentityId, task::BackgroundTask};

type WindowMap = Arc<RwLock<HashMap<IdentityId, VecDeque<OffsetDateTime>>>>;

/// Admits at most `max_requests` per identity within any trailing window.
///
/// Admission decisions for a single identity are linearizable: the whole limiter shares one
/// write lock, which is acceptable at chat-boundary request rates. Clones share the same
/// underlying windows.
#[derive(Clone, Debug)]
pub struct SlidingWindowLimiter {
	windows: WindowMap,
	max_requests: usize,
	window: Duration,
}
impl SlidingWindowLimiter {
	/// Creates a limiter admitting `max_requests` per identity per `window`.
	pub fn new(max_requests: usize, window: Duration) -> Self {
		Self { windows: Default::default(), max_requests, window }
	}

	/// Checks and records an admission attempt against the current clock.
	pub fn is_allowed(&self, identity: IdentityId) -> bool {
		self.is_allowed_at(identity, OffsetDateTime::now_utc())
	}

	/// Checks and records an admission attempt as of `now`.
	///
	/// Timestamps older than the trailing window are pruned first; the attempt is admitted (and
	/// recorded) only while fewer than `max_requests` admitted timestamps remain.
	pub fn is_allowed_at(&self, identity: IdentityId, now: OffsetDateTime) -> bool {
		let cutoff = now - self.window;
		let mut guard = self.windows.write();
		let requests = guard.entry(identity).or_default();

		while requests.front().is_some_and(|at| *at < cutoff) {
			requests.pop_front();
		}

		if requests.len() < self.max_requests {
			requests.push_back(now);

			return true;
		}

		false
	}

	/// Instant at which the identity's oldest admitted request leaves the window.
	///
	/// `None` when the identity has no recorded requests.
	pub fn reset_time(&self, identity: IdentityId) -> Option<OffsetDateTime> {
		let guard = self.windows.read();
		let oldest = guard.get(&identity)?.front()?;

		Some(*oldest + self.window)
	}

	/// Caller-facing wait until the next admission can succeed, as of the current clock.
	pub fn retry_after(&self, identity: IdentityId) -> Option<Duration> {
		self.retry_after_at(identity, OffsetDateTime::now_utc())
	}

	/// Caller-facing wait until the next admission can succeed, as of `now`.
	pub fn retry_after_at(&self, identity: IdentityId, now: OffsetDateTime) -> Option<Duration> {
		self.reset_time(identity).map(|at| (at - now).max(Duration::ZERO))
	}

	/// Number of identities currently holding a window.
	pub fn tracked_identities(&self) -> usize {
		self.windows.read().len()
	}

	/// Prunes stale timestamps and drops identities with empty windows, as of `now`.
	///
	/// Bounds memory independent of traffic skew; admission correctness never depends on it.
	pub fn sweep_at(&self, now: OffsetDateTime) -> usize {
		let cutoff = now - self.window;
		let mut guard = self.windows.write();

		guard.retain(|_, requests| {
			while requests.front().is_some_and(|at| *at < cutoff) {
				requests.pop_front();
			}

			!requests.is_empty()
		});

		guard.len()
	}

	/// Spawns the background sweep loop.
	pub fn spawn_sweeper(&self, every: StdDuration) -> BackgroundTask {
		let limiter = self.clone();

		BackgroundTask::spawn("window-sweeper", every, move || {
			let limiter = limiter.clone();

			async move {
				let remaining = limiter.sweep_at(OffsetDateTime::now_utc());

				#[cfg(feature = "tracing")]
				tracing::trace!(identities = remaining, "sliding-window sweep cycle");
				#[cfg(not(feature = "tracing"))]
				let _ = remaining;
			}
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn fourth_attempt_within_the_window_is_denied() {
		let limiter = SlidingWindowLimiter::new(3, Duration::seconds(60));
		let identity = IdentityId::new(7);
		let base = macros::datetime!(2025-01-01 00:00 UTC);
		let decisions: Vec<bool> = (0..4)
			.map(|tick| limiter.is_allowed_at(identity, base + Duration::milliseconds(tick * 250)))
			.collect();

		assert_eq!(decisions, [true, true, true, false]);

		let reset = limiter
			.reset_time(identity)
			.expect("Identity with admitted requests should report a reset time.");

		assert_eq!(reset, base + Duration::seconds(60));

		let retry = limiter
			.retry_after_at(identity, base + Duration::seconds(1))
			.expect("Denied identity should receive a retry-after duration.");

		assert_eq!(retry, Duration::seconds(59));
	}

	#[test]
	fn admissions_resume_once_the_oldest_request_ages_out() {
		let limiter = SlidingWindowLimiter::new(2, Duration::seconds(60));
		let identity = IdentityId::new(1);
		let base = macros::datetime!(2025-01-01 00:00 UTC);

		assert!(limiter.is_allowed_at(identity, base));
		assert!(limiter.is_allowed_at(identity, base + Duration::seconds(30)));
		assert!(!limiter.is_allowed_at(identity, base + Duration::seconds(59)));
		assert!(limiter.is_allowed_at(identity, base + Duration::seconds(61)));
	}

	#[test]
	fn identities_do_not_share_budgets() {
		let limiter = SlidingWindowLimiter::new(1, Duration::seconds(60));
		let base = macros::datetime!(2025-01-01 00:00 UTC);

		assert!(limiter.is_allowed_at(IdentityId::new(1), base));
		assert!(limiter.is_allowed_at(IdentityId::new(2), base));
		assert!(!limiter.is_allowed_at(IdentityId::new(1), base + Duration::seconds(1)));
	}

	#[test]
	fn sweep_drops_idle_identities() {
		let limiter = SlidingWindowLimiter::new(3, Duration::seconds(60));
		let base = macros::datetime!(2025-01-01 00:00 UTC);

		limiter.is_allowed_at(IdentityId::new(1), base);
		limiter.is_allowed_at(IdentityId::new(2), base + Duration::seconds(50));

		assert_eq!(limiter.tracked_identities(), 2);
		assert_eq!(limiter.sweep_at(base + Duration::seconds(70)), 1);
		assert_eq!(limiter.reset_time(IdentityId::new(1)), None);
	}
}
