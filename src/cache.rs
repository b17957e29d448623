//! Generic TTL key/value cache with a bounded capacity and background reclamation.

// std
use std::{borrow::Borrow, hash::Hash};
// self
use crate::{_prelude::*, task::BackgroundTask};

#[derive(Clone, Debug)]
struct CacheEntry<V> {
	value: V,
	expires_at: OffsetDateTime,
	last_access_at: OffsetDateTime,
}

/// Point-in-time size statistics reported by [`TtlCache::stats`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
	/// Number of live entries.
	pub size: usize,
	/// Capacity bound enforced by the reclamation cycle.
	pub max_size: usize,
}

/// Counts reported by a single reclamation cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Entries dropped because their TTL elapsed.
	pub expired: usize,
	/// Entries evicted to restore the capacity bound.
	pub evicted: usize,
}

type EntryMap<K, V> = Arc<RwLock<HashMap<K, CacheEntry<V>>>>;

/// Thread-safe TTL cache with an LRU-style capacity bound.
///
/// Expiry is enforced at read time, so correctness never depends on the reclamation cycle; the
/// cycle exists to reclaim memory from entries nobody reads again and to enforce `max_size`.
/// Clones share the same underlying map.
pub struct TtlCache<K, V> {
	entries: EntryMap<K, V>,
	default_ttl: Duration,
	max_size: usize,
}
impl<K, V> Clone for TtlCache<K, V> {
	fn clone(&self) -> Self {
		Self {
			entries: self.entries.clone(),
			default_ttl: self.default_ttl,
			max_size: self.max_size,
		}
	}
}
impl<K, V> TtlCache<K, V>
where
	K: Clone + Eq + Hash,
	V: Clone,
{
	/// Creates an empty cache with the provided default TTL and capacity bound.
	pub fn new(default_ttl: Duration, max_size: usize) -> Self {
		Self { entries: Default::default(), default_ttl, max_size }
	}

	/// Returns the live value under `key`, refreshing its access time.
	pub fn get<Q>(&self, key: &Q) -> Option<V>
	where
		K: Borrow<Q>,
		Q: Eq + Hash + ?Sized,
	{
		self.get_at(key, OffsetDateTime::now_utc())
	}

	/// Returns the value under `key` as of `instant`, refreshing its access time.
	///
	/// An entry whose expiry has passed is removed on the spot and reported as absent.
	pub fn get_at<Q>(&self, key: &Q, instant: OffsetDateTime) -> Option<V>
	where
		K: Borrow<Q>,
		Q: Eq + Hash + ?Sized,
	{
		let mut guard = self.entries.write();

		match guard.get_mut(key) {
			None => return None,
			Some(entry) if instant < entry.expires_at => {
				entry.last_access_at = instant;

				return Some(entry.value.clone());
			},
			Some(_) => {},
		}

		guard.remove(key);

		None
	}

	/// Stores `value` under `key` with the default TTL.
	pub fn set(&self, key: K, value: V) {
		self.set_at(key, value, OffsetDateTime::now_utc());
	}

	/// Stores `value` under `key` with the default TTL, as of `instant`.
	pub fn set_at(&self, key: K, value: V, instant: OffsetDateTime) {
		self.set_with_ttl_at(key, value, self.default_ttl, instant);
	}

	/// Stores `value` under `key` with an explicit TTL.
	pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
		self.set_with_ttl_at(key, value, ttl, OffsetDateTime::now_utc());
	}

	/// Stores `value` under `key` with an explicit TTL, as of `instant`.
	///
	/// Overwriting replaces the previous entry outright.
	pub fn set_with_ttl_at(&self, key: K, value: V, ttl: Duration, instant: OffsetDateTime) {
		let entry = CacheEntry { value, expires_at: instant + ttl, last_access_at: instant };

		self.entries.write().insert(key, entry);
	}

	/// Removes the entry under `key`, reporting whether one was present.
	pub fn delete<Q>(&self, key: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: Eq + Hash + ?Sized,
	{
		self.entries.write().remove(key).is_some()
	}

	/// Drops every entry.
	pub fn clear(&self) {
		self.entries.write().clear();
	}

	/// Reports the current size against the configured bound.
	pub fn stats(&self) -> CacheStats {
		CacheStats { size: self.entries.read().len(), max_size: self.max_size }
	}

	/// Runs one reclamation cycle against the current clock.
	pub fn sweep(&self) -> SweepReport {
		self.sweep_at(OffsetDateTime::now_utc())
	}

	/// Runs one reclamation cycle as of `instant`.
	///
	/// Expired entries go first; if the map still exceeds `max_size`, the least-recently-accessed
	/// entries are evicted until the bound holds again.
	pub fn sweep_at(&self, instant: OffsetDateTime) -> SweepReport {
		let mut guard = self.entries.write();
		let before = guard.len();

		guard.retain(|_, entry| instant < entry.expires_at);

		let expired = before - guard.len();
		let mut evicted = 0;

		if guard.len() > self.max_size {
			let mut by_access: Vec<(K, OffsetDateTime)> =
				guard.iter().map(|(key, entry)| (key.clone(), entry.last_access_at)).collect();

			by_access.sort_by_key(|(_, last_access_at)| *last_access_at);

			let excess = guard.len() - self.max_size;

			for (key, _) in by_access.into_iter().take(excess) {
				guard.remove(&key);

				evicted += 1;
			}
		}

		SweepReport { expired, evicted }
	}
}
impl<K, V> TtlCache<K, V>
where
	K: Clone + Eq + Hash + Send + Sync + 'static,
	V: Clone + Send + Sync + 'static,
{
	/// Spawns the background reclamation loop.
	///
	/// The cycle cannot fail; its report is logged and the loop continues regardless of what a
	/// single cycle finds.
	pub fn spawn_reclaimer(&self, every: StdDuration) -> BackgroundTask {
		let cache = self.clone();

		BackgroundTask::spawn("cache-reclaimer", every, move || {
			let cache = cache.clone();

			async move {
				let report = cache.sweep();

				if report.expired > 0 || report.evicted > 0 {
					#[cfg(feature = "tracing")]
					tracing::debug!(
						expired = report.expired,
						evicted = report.evicted,
						remaining = cache.stats().size,
						"cache reclamation cycle"
					);
				}
			}
		})
	}
}
impl<K, V> Debug for TtlCache<K, V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TtlCache")
			.field("size", &self.entries.read().len())
			.field("default_ttl", &self.default_ttl)
			.field("max_size", &self.max_size)
			.finish()
	}
}
