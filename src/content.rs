//! Content-item and batch-job records persisted by the content store.

// self
use crate::{
	_prelude::*,
	id::{BatchId, IdentityId, ItemId},
};

/// Metadata describing one stored content item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
	/// Unique item reference.
	pub id: ItemId,
	/// Opaque locator the delivery sink understands (message handle, object key, ...).
	pub locator: String,
	/// Optional human-facing label attached on delivery.
	pub label: Option<String>,
	/// Identity that stored the item.
	pub created_by: IdentityId,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Number of times the item has been fetched.
	pub access_count: u64,
	/// Instant of the most recent fetch.
	pub last_access_at: Option<OffsetDateTime>,
}
impl ItemRecord {
	/// Creates a fresh record with zeroed access statistics.
	pub fn new(
		id: ItemId,
		locator: impl Into<String>,
		created_by: IdentityId,
		created_at: OffsetDateTime,
	) -> Self {
		Self {
			id,
			locator: locator.into(),
			label: None,
			created_by,
			created_at,
			access_count: 0,
			last_access_at: None,
		}
	}

	/// Attaches a human-facing label.
	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());

		self
	}

	/// Records one fetch against the access statistics.
	pub fn record_access(&mut self, instant: OffsetDateTime) {
		self.access_count += 1;
		self.last_access_at = Some(instant);
	}
}

/// Batch job grouping an ordered sequence of item references.
///
/// The reference list is immutable after creation; only the store-side access statistics move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
	/// Unique batch reference.
	pub id: BatchId,
	/// Ordered item references delivered on redemption.
	pub items: Vec<ItemId>,
	/// Identity that created the batch.
	pub created_by: IdentityId,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Number of times the batch has been fetched.
	pub access_count: u64,
	/// Instant of the most recent fetch.
	pub last_access_at: Option<OffsetDateTime>,
}
impl BatchRecord {
	/// Creates a fresh record with zeroed access statistics.
	pub fn new(
		id: BatchId,
		items: Vec<ItemId>,
		created_by: IdentityId,
		created_at: OffsetDateTime,
	) -> Self {
		Self { id, items, created_by, created_at, access_count: 0, last_access_at: None }
	}

	/// Number of item references in the batch.
	pub fn len(&self) -> usize {
		self.items.len()
	}

	/// Returns `true` when the batch references nothing.
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Records one fetch against the access statistics.
	pub fn record_access(&mut self, instant: OffsetDateTime) {
		self.access_count += 1;
		self.last_access_at = Some(instant);
	}
}
