//! The gate registry object and its explicit request pipeline.
//!
//! [`Gate`] packages the limiters, credential manager, delivery engine, and monitor into one
//! context constructed at startup and passed wherever it is needed, with no module-level
//! singletons.
//! [`Gate::handle_request`] writes the cross-cutting concerns out as ordinary sequential calls:
//! admission, credential check, resolve, deliver, then one instrumentation record.

// self
use crate::{
	_prelude::*,
	config::GateConfig,
	delivery::{DeliveryEngine, DeliveryOutcome, DeliverySink, Destination, Resolution},
	id::IdentityId,
	limit::{SlidingWindowLimiter, TokenBucketLimiter},
	obs::{self, Monitor, OpKind, OpOutcome, OpSpan, StatsSnapshot},
	store::ContentStore,
	task::BackgroundTask,
	token::{TokenManager, TokenObserver, TokenPolicy, TokenValidity},
};

/// Decidable outcome of one gated delivery request.
///
/// Every request gets exactly one of these; the pipeline never hangs and never silently drops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateReply {
	/// The request was admitted and processed; partial failures ride inside the outcome.
	Delivered(DeliveryOutcome),
	/// The identity exceeded its sliding-window budget.
	RateLimited {
		/// Wait until the identity's oldest admitted request leaves the window.
		retry_after: Duration,
	},
	/// No valid credential covers the identity.
	Unauthorized,
	/// Nothing is stored under the requested reference.
	NotFound,
	/// The persistent store could not answer.
	Failed,
}

/// Decidable outcome of one credential-redemption request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyReply {
	/// The secret was accepted and is owned by the contained identity.
	Accepted(IdentityId),
	/// The secret is unknown or expired.
	Rejected,
	/// The identity exceeded its sliding-window budget.
	RateLimited {
		/// Wait until the identity's oldest admitted request leaves the window.
		retry_after: Duration,
	},
}

/// Registry object owning every gate component; constructed once at startup.
///
/// Collaborators arrive through the constructor, so lifetimes and test substitution stay
/// explicit.
pub struct Gate {
	/// Per-identity admission limiter.
	pub limiter: Arc<SlidingWindowLimiter>,
	/// Gate-wide throughput throttle pacing outbound deliveries.
	pub throttle: Arc<TokenBucketLimiter>,
	/// Credential lifecycle manager.
	pub tokens: Arc<TokenManager>,
	/// Fan-out delivery engine.
	pub engine: DeliveryEngine,
	/// Shared instrumentation.
	pub monitor: Arc<Monitor>,
	config: GateConfig,
}
impl Gate {
	/// Builds a gate over the provided collaborators after validating the configuration.
	pub fn new(
		store: Arc<dyn ContentStore>,
		sink: Arc<dyn DeliverySink>,
		config: GateConfig,
	) -> Result<Self> {
		Self::with_observers(store, sink, config, Vec::new())
	}

	/// Builds a gate whose credential manager announces new tokens to `observers`.
	pub fn with_observers(
		store: Arc<dyn ContentStore>,
		sink: Arc<dyn DeliverySink>,
		config: GateConfig,
		observers: Vec<Arc<dyn TokenObserver>>,
	) -> Result<Self> {
		config.validate()?;

		let monitor = Arc::new(Monitor::new());
		let limiter = Arc::new(SlidingWindowLimiter::new(
			config.limiter_max_requests,
			config.limiter_window(),
		));
		let throttle = Arc::new(TokenBucketLimiter::new(
			config.bucket_max_tokens,
			config.bucket_refill_rate,
		));
		let policy = TokenPolicy {
			validity: config.token_validity(),
			renewal_margin: config.token_renewal_margin(),
			verify_memo_ttl: config.verify_memo_ttl(),
			owner_memo_ttl: config.owner_memo_ttl(),
			memo_default_ttl: config.cache_default_ttl(),
			memo_capacity: config.cache_max_size,
		};
		let mut manager = TokenManager::new(store.clone(), policy).with_monitor(monitor.clone());

		for observer in observers {
			manager = manager.with_observer(observer);
		}

		let engine = DeliveryEngine::new(store, sink, config.chunk_size, config.chunk_delay())
			.with_throttle(throttle.clone())
			.with_monitor(monitor.clone());

		Ok(Self { limiter, throttle, tokens: Arc::new(manager), engine, monitor, config })
	}

	/// The configuration the gate was constructed with.
	pub fn config(&self) -> &GateConfig {
		&self.config
	}

	/// Runs the full pipeline for one delivery request.
	///
	/// Admission first (cheapest rejection), then the credential check, then resolution and
	/// delivery, then exactly one instrumentation record. Denials and missing references are
	/// expected outcomes and count as handled requests, not errors; only a store failure marks
	/// the request failed.
	pub async fn handle_request(
		&self,
		identity: IdentityId,
		destination: Destination,
		reference: &str,
	) -> GateReply {
		const KIND: OpKind = OpKind::Request;

		let started = OffsetDateTime::now_utc();
		let span = OpSpan::new(KIND, "handle_request");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let reply = span
			.instrument(async move {
				if !self.limiter.is_allowed(identity) {
					let retry_after =
						self.limiter.retry_after(identity).unwrap_or(Duration::ZERO);

					return GateReply::RateLimited { retry_after };
				}
				if !self.tokens.has_valid_token(identity).await {
					return GateReply::Unauthorized;
				}

				match self.engine.resolve(reference).await {
					Ok(Resolution::Item(item)) =>
						GateReply::Delivered(self.engine.deliver_item(destination, &item).await),
					Ok(Resolution::Batch(batch)) =>
						GateReply::Delivered(self.engine.deliver(destination, &batch.items).await),
					Ok(Resolution::NotFound) => GateReply::NotFound,
					Err(err) => {
						#[cfg(feature = "tracing")]
						tracing::warn!(error = %err, "reference resolution hit a store failure");
						#[cfg(not(feature = "tracing"))]
						let _ = err;

						GateReply::Failed
					},
				}
			})
			.await;
		let success = !matches!(reply, GateReply::Failed);

		self.monitor.record_request(OffsetDateTime::now_utc() - started, identity, success);
		obs::record_op_outcome(KIND, if success { OpOutcome::Success } else { OpOutcome::Failure });

		reply
	}

	/// Runs the pipeline for one credential redemption.
	///
	/// A rejected secret is an expected outcome; the request still records as handled. On
	/// acceptance the requester's memoized coverage answer is dropped so the next
	/// [`handle_request`](Self::handle_request) sees the store's truth.
	pub async fn verify_request(&self, identity: IdentityId, secret: &str) -> VerifyReply {
		const KIND: OpKind = OpKind::Verify;

		let started = OffsetDateTime::now_utc();
		let span = OpSpan::new(KIND, "verify_request");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let reply = span
			.instrument(async move {
				if !self.limiter.is_allowed(identity) {
					let retry_after =
						self.limiter.retry_after(identity).unwrap_or(Duration::ZERO);

					return VerifyReply::RateLimited { retry_after };
				}

				match self.tokens.verify(secret).await {
					TokenValidity::Valid(owner) => {
						self.tokens.forget_identity(identity);

						VerifyReply::Accepted(owner)
					},
					TokenValidity::Invalid => VerifyReply::Rejected,
				}
			})
			.await;

		self.monitor.record_request(OffsetDateTime::now_utc() - started, identity, true);
		obs::record_op_outcome(KIND, OpOutcome::Success);

		reply
	}

	/// Spawns the gate's background loops.
	pub fn spawn_background(&self) -> GateTasks {
		GateTasks {
			cache_reclaimer: self.tokens.spawn_memo_reclaimer(self.config.cache_reclaim_interval()),
			window_sweeper: self.limiter.spawn_sweeper(self.config.limiter_sweep_interval()),
			token_refresher: self.tokens.clone().spawn_refresher(self.config.token_refresh_interval()),
		}
	}

	/// Composes the monitor's counters with the cache's size statistics.
	pub fn stats_snapshot(&self) -> StatsSnapshot {
		self.monitor.snapshot(self.tokens.memo_stats())
	}
}
impl Debug for Gate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gate")
			.field("config", &self.config)
			.field("engine", &self.engine)
			.finish()
	}
}

/// Background loops owned by a running gate.
///
/// Hold on to these for the process lifetime and call [`GateTasks::shutdown`] during teardown;
/// it cancels each loop and awaits its termination so no cycle races the shutdown.
#[derive(Debug)]
pub struct GateTasks {
	/// Cache reclamation loop.
	pub cache_reclaimer: BackgroundTask,
	/// Sliding-window sweep loop.
	pub window_sweeper: BackgroundTask,
	/// Scheduled credential renewal loop.
	pub token_refresher: BackgroundTask,
}
impl GateTasks {
	/// Stops every loop and awaits their termination.
	pub async fn shutdown(self) {
		self.cache_reclaimer.stop().await;
		self.window_sweeper.stop().await;
		self.token_refresher.stop().await;
	}
}
