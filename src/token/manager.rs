//! Shared-credential lifecycle: issuance, memoized verification, and scheduled renewal.
//!
//! The manager owns the credential side of the gate: [`TokenManager::issue`] mints and persists
//! tokens and announces them to observers, [`TokenManager::verify`] redeems secrets with a
//! short-TTL memo absorbing repeated-verification load, and
//! [`TokenManager::refresh_if_needed`] keeps one shared credential alive ahead of its expiry.
//! A renewal never mutates an existing token; it always mints a new one.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	cache::{CacheStats, TtlCache},
	id::IdentityId,
	obs::{self, Monitor, OpKind, OpOutcome, OpSpan},
	store::ContentStore,
	task::BackgroundTask,
	token::{AccessToken, TokenSecret},
};

/// Boxed future returned by [`TokenObserver::token_issued`].
pub type ObserverFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Hook notified with every freshly issued credential.
///
/// The boundary layer decides what an announcement means (pinning a message, mailing admins,
/// ...). Observers own their failure handling; nothing they do can fail the issue path.
pub trait TokenObserver
where
	Self: Send + Sync,
{
	/// Called after the token has been persisted.
	fn token_issued<'a>(&'a self, token: &'a AccessToken) -> ObserverFuture<'a>;
}

/// Policy knobs for credential issuance, memoization, and renewal.
#[derive(Clone, Copy, Debug)]
pub struct TokenPolicy {
	/// Credential validity from mint time.
	pub validity: Duration,
	/// Remaining-validity floor below which the shared credential is renewed.
	pub renewal_margin: Duration,
	/// Verification memoization TTL.
	pub verify_memo_ttl: Duration,
	/// Owner-credential memoization TTL.
	pub owner_memo_ttl: Duration,
	/// Default TTL for memo entries stored without an explicit one.
	pub memo_default_ttl: Duration,
	/// Capacity bound of the memoization cache.
	pub memo_capacity: usize,
}
impl Default for TokenPolicy {
	fn default() -> Self {
		Self {
			validity: Duration::hours(24),
			renewal_margin: Duration::hours(1),
			verify_memo_ttl: Duration::seconds(60),
			owner_memo_ttl: Duration::seconds(300),
			memo_default_ttl: Duration::seconds(300),
			memo_capacity: 10_000,
		}
	}
}

/// Result of a verification attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenValidity {
	/// The secret maps to a live credential owned by the contained identity.
	Valid(IdentityId),
	/// The secret is unknown, expired, or the store could not answer.
	Invalid,
}
impl TokenValidity {
	/// Returns `true` for [`TokenValidity::Valid`].
	pub const fn is_valid(&self) -> bool {
		matches!(self, TokenValidity::Valid(_))
	}
}

/// Outcome of a renewal check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// The current shared credential still has more than the safety margin remaining.
	Skipped,
	/// A new shared credential was minted and persisted.
	Issued,
}

/// Thread-safe counters for manager activity.
#[derive(Debug, Default)]
pub struct TokenMetrics {
	issued: AtomicU64,
	verifications: AtomicU64,
	renewals: AtomicU64,
	renewal_skips: AtomicU64,
}
impl TokenMetrics {
	/// Returns the number of credentials issued.
	pub fn issued(&self) -> u64 {
		self.issued.load(Ordering::Relaxed)
	}

	/// Returns the number of verification attempts that reached the store.
	pub fn verifications(&self) -> u64 {
		self.verifications.load(Ordering::Relaxed)
	}

	/// Returns the number of renewal cycles that minted a new shared credential.
	pub fn renewals(&self) -> u64 {
		self.renewals.load(Ordering::Relaxed)
	}

	/// Returns the number of renewal cycles that found the shared credential still fresh.
	pub fn renewal_skips(&self) -> u64 {
		self.renewal_skips.load(Ordering::Relaxed)
	}

	pub(crate) fn record_issued(&self) {
		self.issued.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_verification(&self) {
		self.verifications.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_renewal(&self) {
		self.renewals.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_renewal_skip(&self) {
		self.renewal_skips.fetch_add(1, Ordering::Relaxed);
	}
}

#[derive(Clone, Copy, Debug)]
enum MemoValue {
	Verify(TokenValidity),
	Owner(bool),
}

fn verify_key(secret: &str) -> String {
	format!("verify:{}", TokenSecret::new(secret).fingerprint())
}

fn owner_key(identity: IdentityId) -> String {
	format!("owner:{identity}")
}

/// Issues, verifies, and renews time-limited access credentials.
pub struct TokenManager {
	store: Arc<dyn ContentStore>,
	policy: TokenPolicy,
	memo: TtlCache<String, MemoValue>,
	observers: Vec<Arc<dyn TokenObserver>>,
	refresh_guard: AsyncMutex<()>,
	monitor: Option<Arc<Monitor>>,
	metrics: TokenMetrics,
}
impl TokenManager {
	/// Creates a manager over the provided store and policy.
	pub fn new(store: Arc<dyn ContentStore>, policy: TokenPolicy) -> Self {
		Self {
			store,
			policy,
			memo: TtlCache::new(policy.memo_default_ttl, policy.memo_capacity),
			observers: Vec::new(),
			refresh_guard: AsyncMutex::new(()),
			monitor: None,
			metrics: TokenMetrics::default(),
		}
	}

	/// Registers an observer notified with every issued credential.
	pub fn with_observer(mut self, observer: Arc<dyn TokenObserver>) -> Self {
		self.observers.push(observer);

		self
	}

	/// Attaches the shared monitor recording memo hits and store queries.
	pub fn with_monitor(mut self, monitor: Arc<Monitor>) -> Self {
		self.monitor = Some(monitor);

		self
	}

	/// Activity counters for this manager.
	pub fn metrics(&self) -> &TokenMetrics {
		&self.metrics
	}

	/// Size statistics of the memoization cache.
	pub fn memo_stats(&self) -> CacheStats {
		self.memo.stats()
	}

	/// Mints, persists, and announces a credential for `owner` against the current clock.
	pub async fn issue(&self, owner: IdentityId) -> Result<AccessToken> {
		self.issue_at(owner, OffsetDateTime::now_utc()).await
	}

	/// Mints, persists, and announces a credential for `owner` as of `now`.
	///
	/// A successful issue invalidates the memo entries it can render stale: the owner's entry
	/// for a personal credential, the whole owner memo for a shared one (a fresh shared
	/// credential flips every cached negative answer).
	pub async fn issue_at(&self, owner: IdentityId, now: OffsetDateTime) -> Result<AccessToken> {
		const KIND: OpKind = OpKind::Issue;

		let span = OpSpan::new(KIND, "issue");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let token = AccessToken::mint_at(owner, self.policy.validity, now);

				if let Some(monitor) = &self.monitor {
					monitor.record_store_query();
				}

				self.store.save_token(token.clone()).await?;
				self.metrics.record_issued();

				if owner.is_shared() {
					self.memo.clear();
				} else {
					self.memo.delete(&owner_key(owner));
				}

				for observer in &self.observers {
					observer.token_issued(&token).await;
				}

				Ok(token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	/// Redeems `secret` against the current clock.
	pub async fn verify(&self, secret: &str) -> TokenValidity {
		self.verify_at(secret, OffsetDateTime::now_utc()).await
	}

	/// Redeems `secret` as of `now`.
	///
	/// Answers are memoized for the policy's verify TTL under the secret's fingerprint; within
	/// that window repeated redemptions are absorbed without touching the store (and without
	/// moving the token's use count). A store failure reads as [`TokenValidity::Invalid`]; the
	/// caller decides whether to deny or retry.
	pub async fn verify_at(&self, secret: &str, now: OffsetDateTime) -> TokenValidity {
		let key = verify_key(secret);

		if let Some(MemoValue::Verify(validity)) = self.memo.get_at(&key, now) {
			if let Some(monitor) = &self.monitor {
				monitor.record_cache_hit();
			}

			return validity;
		}

		if let Some(monitor) = &self.monitor {
			monitor.record_cache_miss();
			monitor.record_store_query();
		}

		let validity = match self.store.consume_token(secret, now).await {
			Ok(Some(token)) => TokenValidity::Valid(token.owner),
			Ok(None) => TokenValidity::Invalid,
			Err(err) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %err, "credential verification hit a store failure");
				#[cfg(not(feature = "tracing"))]
				let _ = err;

				TokenValidity::Invalid
			},
		};

		self.metrics.record_verification();
		self.memo.set_with_ttl_at(key, MemoValue::Verify(validity), self.policy.verify_memo_ttl, now);

		validity
	}

	/// Reports whether a live credential covers `identity` against the current clock.
	pub async fn has_valid_token(&self, identity: IdentityId) -> bool {
		self.has_valid_token_at(identity, OffsetDateTime::now_utc()).await
	}

	/// Reports whether a live credential covers `identity` as of `now`.
	///
	/// True when the identity owns a live credential or any shared credential is live. Answers
	/// are memoized for the policy's owner TTL; a store failure reads as uncovered.
	pub async fn has_valid_token_at(&self, identity: IdentityId, now: OffsetDateTime) -> bool {
		let key = owner_key(identity);

		if let Some(MemoValue::Owner(covered)) = self.memo.get_at(&key, now) {
			if let Some(monitor) = &self.monitor {
				monitor.record_cache_hit();
			}

			return covered;
		}

		if let Some(monitor) = &self.monitor {
			monitor.record_cache_miss();
			monitor.record_store_query();
		}

		let covered = match self.store.live_token_for(identity, now).await {
			Ok(token) => token.is_some(),
			Err(err) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %err, "credential coverage check hit a store failure");
				#[cfg(not(feature = "tracing"))]
				let _ = err;

				false
			},
		};

		self.memo.set_with_ttl_at(key, MemoValue::Owner(covered), self.policy.owner_memo_ttl, now);

		covered
	}

	/// Drops the memoized coverage answer for `identity`.
	///
	/// Called after a successful redemption so the next coverage check sees the store's truth.
	pub fn forget_identity(&self, identity: IdentityId) {
		self.memo.delete(&owner_key(identity));
	}

	/// Renews the shared credential if warranted, against the current clock.
	pub async fn refresh_if_needed(&self) -> Result<RefreshOutcome> {
		self.refresh_if_needed_at(OffsetDateTime::now_utc()).await
	}

	/// Renews the shared credential if warranted, as of `now`.
	///
	/// Holds a singleflight guard so concurrent renewal attempts cannot double-issue. The
	/// current shared credential is kept while `expires_at - now >= renewal_margin`; otherwise a
	/// new shared credential is minted.
	pub async fn refresh_if_needed_at(&self, now: OffsetDateTime) -> Result<RefreshOutcome> {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "refresh_if_needed");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let _singleflight = self.refresh_guard.lock().await;

				if let Some(monitor) = &self.monitor {
					monitor.record_store_query();
				}

				match self.store.current_shared_token(now).await? {
					Some(current) if current.remaining_at(now) >= self.policy.renewal_margin => {
						self.metrics.record_renewal_skip();

						Ok(RefreshOutcome::Skipped)
					},
					_ => {
						self.issue_at(IdentityId::SHARED, now).await?;
						self.metrics.record_renewal();

						Ok(RefreshOutcome::Issued)
					},
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	/// Spawns the repeating renewal loop.
	///
	/// A failing cycle is logged and the loop continues; renewal gets another chance on the next
	/// interval.
	pub fn spawn_refresher(self: Arc<Self>, every: StdDuration) -> BackgroundTask {
		let manager = self;

		BackgroundTask::spawn("token-refresher", every, move || {
			let manager = manager.clone();

			async move {
				match manager.refresh_if_needed().await {
					Ok(outcome) => {
						#[cfg(feature = "tracing")]
						tracing::debug!(?outcome, "scheduled credential renewal cycle");
						#[cfg(not(feature = "tracing"))]
						let _ = outcome;
					},
					Err(err) => {
						#[cfg(feature = "tracing")]
						tracing::warn!(error = %err, "scheduled credential renewal failed");
						#[cfg(not(feature = "tracing"))]
						let _ = err;
					},
				}
			}
		})
	}

	/// Spawns the memoization cache's reclamation loop.
	pub fn spawn_memo_reclaimer(&self, every: StdDuration) -> BackgroundTask {
		self.memo.spawn_reclaimer(every)
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("policy", &self.policy)
			.field("observers", &self.observers.len())
			.field("memo", &self.memo.stats())
			.finish()
	}
}
