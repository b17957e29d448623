//! Lightweight instrumentation observing the gate's request handling.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `content_gate.op` with the `op` (operation)
//!   and `stage` (call site) fields.
//! - Enable `metrics` to increment the `content_gate_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, cache::CacheStats, id::IdentityId};

/// Gate operations observed by the monitor, spans, and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Gated delivery request handling.
	Request,
	/// Credential redemption.
	Verify,
	/// Credential issuance.
	Issue,
	/// Scheduled shared-credential renewal.
	Refresh,
	/// Batch fan-out delivery.
	Deliver,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Request => "request",
			OpKind::Verify => "verify",
			OpKind::Issue => "issue",
			OpKind::Refresh => "refresh",
			OpKind::Deliver => "deliver",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to a gate operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

const DURATION_HISTORY: usize = 1_000;
const THROUGHPUT_WINDOW: Duration = Duration::minutes(1);

#[derive(Debug)]
struct MonitorState {
	durations: VecDeque<f64>,
	identities: HashSet<IdentityId>,
	requests_in_window: u64,
	window_started_at: OffsetDateTime,
	throughput: f64,
}

/// Aggregated performance view over the gate's recent activity.
///
/// Recording is purely observational and never alters a wrapped operation's result. The
/// distinct-identity set is exact and unbounded; a long-lived deployment that needs a hard bound
/// should swap in a retention window or an approximate cardinality structure.
#[derive(Debug)]
pub struct Monitor {
	started_at: OffsetDateTime,
	requests_total: AtomicU64,
	error_count: AtomicU64,
	store_queries: AtomicU64,
	cache_hits: AtomicU64,
	cache_misses: AtomicU64,
	state: Mutex<MonitorState>,
}
impl Monitor {
	/// Creates a monitor anchored at the current clock.
	pub fn new() -> Self {
		Self::starting_at(OffsetDateTime::now_utc())
	}

	/// Creates a monitor anchored at `started_at`.
	pub fn starting_at(started_at: OffsetDateTime) -> Self {
		Self {
			started_at,
			requests_total: AtomicU64::new(0),
			error_count: AtomicU64::new(0),
			store_queries: AtomicU64::new(0),
			cache_hits: AtomicU64::new(0),
			cache_misses: AtomicU64::new(0),
			state: Mutex::new(MonitorState {
				durations: VecDeque::with_capacity(DURATION_HISTORY),
				identities: HashSet::new(),
				requests_in_window: 0,
				window_started_at: started_at,
				throughput: 0.0,
			}),
		}
	}

	/// Records one handled request against the current clock.
	pub fn record_request(&self, duration: Duration, identity: IdentityId, success: bool) {
		self.record_request_at(duration, identity, success, OffsetDateTime::now_utc());
	}

	/// Records one handled request as of `now`.
	pub fn record_request_at(
		&self,
		duration: Duration,
		identity: IdentityId,
		success: bool,
		now: OffsetDateTime,
	) {
		self.requests_total.fetch_add(1, Ordering::Relaxed);

		if !success {
			self.error_count.fetch_add(1, Ordering::Relaxed);
		}

		let mut state = self.state.lock();

		if state.durations.len() == DURATION_HISTORY {
			state.durations.pop_front();
		}

		state.durations.push_back(duration.as_seconds_f64());
		state.identities.insert(identity);
		state.requests_in_window += 1;

		let elapsed = now - state.window_started_at;

		if elapsed >= THROUGHPUT_WINDOW {
			state.throughput = state.requests_in_window as f64 / elapsed.as_seconds_f64();
			state.requests_in_window = 0;
			state.window_started_at = now;
		}
	}

	/// Records one memoization hit.
	pub fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	/// Records one memoization miss.
	pub fn record_cache_miss(&self) {
		self.cache_misses.fetch_add(1, Ordering::Relaxed);
	}

	/// Records one persistent-store query.
	pub fn record_store_query(&self) {
		self.store_queries.fetch_add(1, Ordering::Relaxed);
	}

	/// Builds a snapshot against the current clock.
	pub fn snapshot(&self, cache: CacheStats) -> StatsSnapshot {
		self.snapshot_at(cache, OffsetDateTime::now_utc())
	}

	/// Builds a snapshot as of `now`.
	pub fn snapshot_at(&self, cache: CacheStats, now: OffsetDateTime) -> StatsSnapshot {
		let requests_total = self.requests_total.load(Ordering::Relaxed);
		let error_count = self.error_count.load(Ordering::Relaxed);
		let cache_hits = self.cache_hits.load(Ordering::Relaxed);
		let cache_misses = self.cache_misses.load(Ordering::Relaxed);
		let cache_total = cache_hits + cache_misses;
		let state = self.state.lock();
		let avg_response_time_ms = if state.durations.is_empty() {
			0.0
		} else {
			state.durations.iter().sum::<f64>() / state.durations.len() as f64 * 1_000.0
		};

		StatsSnapshot {
			uptime_seconds: (now - self.started_at).as_seconds_f64(),
			requests_total,
			requests_per_second: state.throughput,
			avg_response_time_ms,
			error_rate_percent: if requests_total == 0 {
				0.0
			} else {
				error_count as f64 / requests_total as f64 * 100.0
			},
			active_identity_count: state.identities.len(),
			store_queries: self.store_queries.load(Ordering::Relaxed),
			cache_hit_rate_percent: if cache_total == 0 {
				0.0
			} else {
				cache_hits as f64 / cache_total as f64 * 100.0
			},
			cache_size: cache.size,
			cache_max_size: cache.max_size,
		}
	}
}
impl Default for Monitor {
	fn default() -> Self {
		Self::new()
	}
}

/// Stable, serializable metrics snapshot safe to expose on an external status surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
	/// Seconds since the monitor was constructed.
	pub uptime_seconds: f64,
	/// Monotonic request counter.
	pub requests_total: u64,
	/// Most recent per-minute throughput figure.
	pub requests_per_second: f64,
	/// Mean response time over the bounded history, in milliseconds.
	pub avg_response_time_ms: f64,
	/// Rolling share of failed requests, in percent.
	pub error_rate_percent: f64,
	/// Count of distinct identities observed.
	pub active_identity_count: usize,
	/// Persistent-store queries observed.
	pub store_queries: u64,
	/// Memoization hit share, in percent.
	pub cache_hit_rate_percent: f64,
	/// Live cache entries at snapshot time.
	pub cache_size: usize,
	/// Configured cache capacity bound.
	pub cache_max_size: usize,
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	const CACHE: CacheStats = CacheStats { size: 3, max_size: 100 };

	#[test]
	fn snapshot_aggregates_counters() {
		let base = macros::datetime!(2025-01-01 00:00 UTC);
		let monitor = Monitor::starting_at(base);

		monitor.record_request_at(
			Duration::milliseconds(250),
			IdentityId::new(1),
			true,
			base + Duration::seconds(1),
		);
		monitor.record_request_at(
			Duration::milliseconds(750),
			IdentityId::new(2),
			false,
			base + Duration::seconds(2),
		);
		monitor.record_cache_hit();
		monitor.record_cache_hit();
		monitor.record_cache_miss();
		monitor.record_store_query();

		let snapshot = monitor.snapshot_at(CACHE, base + Duration::seconds(10));

		assert_eq!(snapshot.uptime_seconds, 10.0);
		assert_eq!(snapshot.requests_total, 2);
		assert_eq!(snapshot.avg_response_time_ms, 500.0);
		assert_eq!(snapshot.error_rate_percent, 50.0);
		assert_eq!(snapshot.active_identity_count, 2);
		assert_eq!(snapshot.store_queries, 1);
		assert!((snapshot.cache_hit_rate_percent - 200.0 / 3.0).abs() < 1e-9);
		assert_eq!(snapshot.cache_size, 3);
		assert_eq!(snapshot.cache_max_size, 100);
	}

	#[test]
	fn throughput_recomputes_once_per_minute() {
		let base = macros::datetime!(2025-01-01 00:00 UTC);
		let monitor = Monitor::starting_at(base);

		for tick in 0..60 {
			monitor.record_request_at(
				Duration::milliseconds(10),
				IdentityId::new(1),
				true,
				base + Duration::seconds(tick),
			);
		}

		// Still inside the first window: the figure has not been computed yet.
		assert_eq!(monitor.snapshot_at(CACHE, base + Duration::seconds(59)).requests_per_second, 0.0);

		monitor.record_request_at(
			Duration::milliseconds(10),
			IdentityId::new(1),
			true,
			base + Duration::seconds(61),
		);

		let snapshot = monitor.snapshot_at(CACHE, base + Duration::seconds(61));

		assert!((snapshot.requests_per_second - 1.0).abs() < 0.1);
	}

	#[test]
	fn duration_history_is_bounded() {
		let base = macros::datetime!(2025-01-01 00:00 UTC);
		let monitor = Monitor::starting_at(base);

		for _ in 0..(DURATION_HISTORY + 10) {
			monitor.record_request_at(Duration::seconds(2), IdentityId::new(1), true, base);
		}

		monitor.record_request_at(Duration::ZERO, IdentityId::new(1), true, base);

		let state_len = monitor.state.lock().durations.len();

		assert_eq!(state_len, DURATION_HISTORY);
	}

	#[test]
	fn snapshot_serializes_with_a_stable_field_set() {
		let monitor = Monitor::new();
		let payload = serde_json::to_value(monitor.snapshot(CACHE))
			.expect("Snapshot should serialize to JSON.");
		let object = payload.as_object().expect("Snapshot should serialize as an object.");

		for field in [
			"uptime_seconds",
			"requests_total",
			"requests_per_second",
			"avg_response_time_ms",
			"error_rate_percent",
			"active_identity_count",
			"store_queries",
			"cache_hit_rate_percent",
			"cache_size",
			"cache_max_size",
		] {
			assert!(object.contains_key(field), "snapshot must expose `{field}`");
		}
	}
}
