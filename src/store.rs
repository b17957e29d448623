//! Persistence contracts consumed by the gate core.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	content::{BatchRecord, ItemRecord},
	id::{BatchId, IdentityId, ItemId},
	token::AccessToken,
};

/// Boxed future returned by [`ContentStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for content items, batch jobs, and access tokens.
///
/// Every operation resolves to a three-way outcome: success, absence (`None`), or
/// [`StoreError`]. Callers must handle each case explicitly. The core never retries a failed
/// operation; retry policy, if any, belongs to the implementation.
pub trait ContentStore
where
	Self: Send + Sync,
{
	/// Fetches item metadata, updating its access statistics atomically.
	fn fetch_item<'a>(&'a self, id: &'a ItemId) -> StoreFuture<'a, Option<ItemRecord>>;

	/// Fetches batch metadata, updating its access statistics atomically.
	fn fetch_batch<'a>(&'a self, id: &'a BatchId) -> StoreFuture<'a, Option<BatchRecord>>;

	/// Persists new item metadata; an existing record under the same id is an error.
	fn save_item(&self, record: ItemRecord) -> StoreFuture<'_, ()>;

	/// Persists a new batch job; an existing record under the same id is an error.
	fn save_batch(&self, record: BatchRecord) -> StoreFuture<'_, ()>;

	/// Persists a freshly minted token; an existing record under the same secret is an error.
	fn save_token(&self, token: AccessToken) -> StoreFuture<'_, ()>;

	/// Atomically verifies and counts one use of `secret`.
	///
	/// Returns the record (with updated use statistics) only while it is valid at `now`;
	/// unknown and expired secrets are both absent.
	fn consume_token<'a>(
		&'a self,
		secret: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<AccessToken>>;

	/// Returns a token valid at `now` owned by `owner` or by the shared identity.
	fn live_token_for(
		&self,
		owner: IdentityId,
		now: OffsetDateTime,
	) -> StoreFuture<'_, Option<AccessToken>>;

	/// Returns the shared token with the latest expiry still valid at `now`.
	fn current_shared_token(&self, now: OffsetDateTime) -> StoreFuture<'_, Option<AccessToken>>;
}

/// Error type produced by [`ContentStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// A record with the same identifier already exists.
	#[error("Duplicate record: {id}.")]
	Duplicate {
		/// Identifier of the conflicting record.
		id: String,
	},
	/// Serialization failures (e.g., serde/bincode) surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
