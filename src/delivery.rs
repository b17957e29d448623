//! Chunked, partially-fault-tolerant fan-out delivery.
//!
//! [`DeliveryEngine::resolve`] maps a raw reference to a single item or a batch job;
//! [`DeliveryEngine::deliver`] fans a batch out in fixed-size chunks, looking items up
//! concurrently within a chunk and pacing between chunks. Per-item failures are reported as
//! data, the `missing` list of a [`DeliveryOutcome`], and never abort the batch.

// crates.io
use futures::future;
// self
use crate::{
	_prelude::*,
	content::{BatchRecord, ItemRecord},
	id::{BatchId, ItemId},
	limit::TokenBucketLimiter,
	obs::{self, Monitor, OpKind, OpOutcome, OpSpan},
	store::ContentStore,
};

/// Boxed future returned by [`DeliverySink::deliver`].
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SinkError>> + 'a + Send>>;

/// Effectful capability that hands one resolved item to its destination.
///
/// Implementations own their retry/timeout policy; the engine treats any error as an item-level
/// failure.
pub trait DeliverySink
where
	Self: Send + Sync,
{
	/// Delivers one item to the destination.
	fn deliver<'a>(&'a self, destination: Destination, item: &'a ItemRecord) -> SinkFuture<'a>;
}

/// Error type produced by [`DeliverySink`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("Delivery failure: {message}.")]
pub struct SinkError {
	/// Human-readable error payload.
	pub message: String,
}
impl SinkError {
	/// Wraps a sink-specific failure message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Destination handle understood by the delivery sink (chat, channel, mailbox, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(i64);
impl Destination {
	/// Wraps a raw destination number.
	pub const fn new(value: i64) -> Self {
		Self(value)
	}

	/// Returns the raw destination number.
	pub const fn get(self) -> i64 {
		self.0
	}
}
impl From<i64> for Destination {
	fn from(value: i64) -> Self {
		Self(value)
	}
}
impl Display for Destination {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(&self.0, f)
	}
}

/// What a raw reference resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
	/// The reference names a single stored item.
	Item(ItemRecord),
	/// The reference names a batch job.
	Batch(BatchRecord),
	/// Nothing is stored under the reference.
	NotFound,
}

/// Per-attempt report of which item references were delivered and which failed.
///
/// Produced per delivery attempt and never persisted. `delivered` follows chunk-processing
/// order; within a chunk, completion order is not guaranteed to match the request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
	/// Item references delivered, in chunk-processing order.
	pub delivered: Vec<ItemId>,
	/// Item references that failed to resolve or deliver, in chunk-encounter order.
	pub missing: Vec<ItemId>,
}
impl DeliveryOutcome {
	/// Returns `true` when every requested item was delivered.
	pub fn is_complete(&self) -> bool {
		self.missing.is_empty()
	}

	/// Returns `true` when nothing was delivered despite a non-empty request.
	pub fn is_total_failure(&self) -> bool {
		self.delivered.is_empty() && !self.missing.is_empty()
	}
}

/// Fan-out engine resolving references and delivering items in paced chunks.
pub struct DeliveryEngine {
	store: Arc<dyn ContentStore>,
	sink: Arc<dyn DeliverySink>,
	throttle: Option<Arc<TokenBucketLimiter>>,
	monitor: Option<Arc<Monitor>>,
	chunk_size: usize,
	chunk_delay: StdDuration,
}
impl DeliveryEngine {
	/// Creates an engine delivering `chunk_size` items per chunk with `chunk_delay` between
	/// chunks.
	pub fn new(
		store: Arc<dyn ContentStore>,
		sink: Arc<dyn DeliverySink>,
		chunk_size: usize,
		chunk_delay: StdDuration,
	) -> Self {
		Self {
			store,
			sink,
			throttle: None,
			monitor: None,
			chunk_size: chunk_size.max(1),
			chunk_delay,
		}
	}

	/// Attaches the gate-wide throughput throttle; it takes precedence over the fixed delay as
	/// the pacing governor.
	pub fn with_throttle(mut self, throttle: Arc<TokenBucketLimiter>) -> Self {
		self.throttle = Some(throttle);

		self
	}

	/// Attaches the shared monitor recording store queries.
	pub fn with_monitor(mut self, monitor: Arc<Monitor>) -> Self {
		self.monitor = Some(monitor);

		self
	}

	/// Resolves a raw reference to a single item, a batch job, or nothing.
	///
	/// Item lookups are deliberately uncached: the store maintains access statistics
	/// transactionally on every fetch, and a memoized answer would freeze the counts. A
	/// reference that fails identifier validation cannot name anything and reads as not found.
	pub async fn resolve(&self, reference: &str) -> Result<Resolution> {
		let Ok(item_id) = ItemId::new(reference) else {
			return Ok(Resolution::NotFound);
		};

		if let Some(monitor) = &self.monitor {
			monitor.record_store_query();
		}
		if let Some(item) = self.store.fetch_item(&item_id).await? {
			return Ok(Resolution::Item(item));
		}

		let Ok(batch_id) = BatchId::new(reference) else {
			return Ok(Resolution::NotFound);
		};

		if let Some(monitor) = &self.monitor {
			monitor.record_store_query();
		}

		match self.store.fetch_batch(&batch_id).await? {
			Some(batch) => Ok(Resolution::Batch(batch)),
			None => Ok(Resolution::NotFound),
		}
	}

	/// Delivers one already-resolved item to `destination`.
	///
	/// Used for single-item references so the lookup that resolved the record is not repeated
	/// (and the item's access count not double-ticked).
	pub async fn deliver_item(&self, destination: Destination, item: &ItemRecord) -> DeliveryOutcome {
		if let Some(throttle) = &self.throttle {
			throttle.wait_for(1.0).await;
		}

		match self.sink.deliver(destination, item).await {
			Ok(()) => DeliveryOutcome { delivered: vec![item.id.clone()], missing: Vec::new() },
			Err(err) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(item = %item.id, error = %err, "item delivery failed");
				#[cfg(not(feature = "tracing"))]
				let _ = err;

				DeliveryOutcome { delivered: Vec::new(), missing: vec![item.id.clone()] }
			},
		}
	}

	/// Delivers the referenced items to `destination` in paced chunks.
	///
	/// Chunks are processed strictly in sequence; a chunk's lookups all run concurrently and
	/// its sends are issued in chunk order. Every per-item failure (lookup error, absent record,
	/// sink error) lands in `missing` and the batch carries on. Even a total failure comes back
	/// as data, letting the boundary layer own the phrasing.
	pub async fn deliver(&self, destination: Destination, items: &[ItemId]) -> DeliveryOutcome {
		const KIND: OpKind = OpKind::Deliver;

		let span = OpSpan::new(KIND, "deliver");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let outcome = span
			.instrument(async move {
				let mut outcome = DeliveryOutcome::default();
				let chunks: Vec<&[ItemId]> = items.chunks(self.chunk_size).collect();
				let total_chunks = chunks.len();

				for (index, chunk) in chunks.into_iter().enumerate() {
					if let Some(throttle) = &self.throttle {
						throttle.wait_for(chunk.len() as f64).await;
					}
					if let Some(monitor) = &self.monitor {
						for _ in chunk {
							monitor.record_store_query();
						}
					}

					let lookups = chunk.iter().map(|id| self.store.fetch_item(id));
					let records = future::join_all(lookups).await;

					for (id, fetched) in chunk.iter().zip(records) {
						match fetched {
							Ok(Some(record)) =>
								match self.sink.deliver(destination, &record).await {
									Ok(()) => outcome.delivered.push(id.clone()),
									Err(err) => {
										#[cfg(feature = "tracing")]
										tracing::warn!(
											item = %id,
											error = %err,
											"batch item delivery failed"
										);
										#[cfg(not(feature = "tracing"))]
										let _ = err;

										outcome.missing.push(id.clone());
									},
								},
							Ok(None) => outcome.missing.push(id.clone()),
							Err(err) => {
								#[cfg(feature = "tracing")]
								tracing::warn!(
									item = %id,
									error = %err,
									"batch item lookup failed"
								);
								#[cfg(not(feature = "tracing"))]
								let _ = err;

								outcome.missing.push(id.clone());
							},
						}
					}

					if index + 1 < total_chunks {
						tokio::time::sleep(self.chunk_delay).await;
					}
				}

				outcome
			})
			.await;

		if outcome.is_total_failure() {
			obs::record_op_outcome(KIND, OpOutcome::Failure);
		} else {
			obs::record_op_outcome(KIND, OpOutcome::Success);
		}

		outcome
	}
}
impl Debug for DeliveryEngine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeliveryEngine")
			.field("throttled", &self.throttle.is_some())
			.field("chunk_size", &self.chunk_size)
			.field("chunk_delay", &self.chunk_delay)
			.finish()
	}
}
