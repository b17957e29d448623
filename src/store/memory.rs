//! Thread-safe in-memory [`ContentStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	content::{BatchRecord, ItemRecord},
	id::{BatchId, IdentityId, ItemId},
	store::{ContentStore, StoreError, StoreFuture},
	token::AccessToken,
};

type Shared = Arc<RwLock<MemoryInner>>;

#[derive(Debug, Default)]
struct MemoryInner {
	items: HashMap<ItemId, ItemRecord>,
	batches: HashMap<BatchId, BatchRecord>,
	tokens: HashMap<String, AccessToken>,
}

/// Thread-safe storage backend that keeps records in-process for tests and demos.
///
/// Access statistics are stamped with the wall clock on fetch, matching what a server-side
/// backend would do; token validity checks take the caller's instant.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Shared);
impl MemoryStore {
	fn fetch_item_now(inner: Shared, id: ItemId) -> Option<ItemRecord> {
		let mut guard = inner.write();
		let record = guard.items.get_mut(&id)?;

		record.record_access(OffsetDateTime::now_utc());

		Some(record.clone())
	}

	fn fetch_batch_now(inner: Shared, id: BatchId) -> Option<BatchRecord> {
		let mut guard = inner.write();
		let record = guard.batches.get_mut(&id)?;

		record.record_access(OffsetDateTime::now_utc());

		Some(record.clone())
	}

	fn save_item_now(inner: Shared, record: ItemRecord) -> Result<(), StoreError> {
		let mut guard = inner.write();

		if guard.items.contains_key(&record.id) {
			return Err(StoreError::Duplicate { id: record.id.to_string() });
		}

		guard.items.insert(record.id.clone(), record);

		Ok(())
	}

	fn save_batch_now(inner: Shared, record: BatchRecord) -> Result<(), StoreError> {
		let mut guard = inner.write();

		if guard.batches.contains_key(&record.id) {
			return Err(StoreError::Duplicate { id: record.id.to_string() });
		}

		guard.batches.insert(record.id.clone(), record);

		Ok(())
	}

	fn save_token_now(inner: Shared, token: AccessToken) -> Result<(), StoreError> {
		let mut guard = inner.write();
		let key = token.secret.expose().to_owned();

		if guard.tokens.contains_key(&key) {
			return Err(StoreError::Duplicate { id: token.secret.fingerprint() });
		}

		guard.tokens.insert(key, token);

		Ok(())
	}

	fn consume_token_now(inner: Shared, secret: String, now: OffsetDateTime) -> Option<AccessToken> {
		let mut guard = inner.write();
		let token = guard.tokens.get_mut(&secret).filter(|token| token.is_valid_at(now))?;

		token.record_use(now);

		Some(token.clone())
	}

	fn live_token_for_now(
		inner: Shared,
		owner: IdentityId,
		now: OffsetDateTime,
	) -> Option<AccessToken> {
		let guard = inner.read();

		guard
			.tokens
			.values()
			.filter(|token| token.owner == owner || token.is_shared())
			.filter(|token| token.is_valid_at(now))
			.max_by_key(|token| token.expires_at)
			.cloned()
	}

	fn current_shared_token_now(inner: Shared, now: OffsetDateTime) -> Option<AccessToken> {
		let guard = inner.read();

		guard
			.tokens
			.values()
			.filter(|token| token.is_shared() && token.is_valid_at(now))
			.max_by_key(|token| token.expires_at)
			.cloned()
	}
}
impl ContentStore for MemoryStore {
	fn fetch_item<'a>(&'a self, id: &'a ItemId) -> StoreFuture<'a, Option<ItemRecord>> {
		let inner = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move { Ok(Self::fetch_item_now(inner, id)) })
	}

	fn fetch_batch<'a>(&'a self, id: &'a BatchId) -> StoreFuture<'a, Option<BatchRecord>> {
		let inner = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move { Ok(Self::fetch_batch_now(inner, id)) })
	}

	fn save_item(&self, record: ItemRecord) -> StoreFuture<'_, ()> {
		let inner = self.0.clone();

		Box::pin(async move { Self::save_item_now(inner, record) })
	}

	fn save_batch(&self, record: BatchRecord) -> StoreFuture<'_, ()> {
		let inner = self.0.clone();

		Box::pin(async move { Self::save_batch_now(inner, record) })
	}

	fn save_token(&self, token: AccessToken) -> StoreFuture<'_, ()> {
		let inner = self.0.clone();

		Box::pin(async move { Self::save_token_now(inner, token) })
	}

	fn consume_token<'a>(
		&'a self,
		secret: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<AccessToken>> {
		let inner = self.0.clone();
		let secret = secret.to_owned();

		Box::pin(async move { Ok(Self::consume_token_now(inner, secret, now)) })
	}

	fn live_token_for(
		&self,
		owner: IdentityId,
		now: OffsetDateTime,
	) -> StoreFuture<'_, Option<AccessToken>> {
		let inner = self.0.clone();

		Box::pin(async move { Ok(Self::live_token_for_now(inner, owner, now)) })
	}

	fn current_shared_token(&self, now: OffsetDateTime) -> StoreFuture<'_, Option<AccessToken>> {
		let inner = self.0.clone();

		Box::pin(async move { Ok(Self::current_shared_token_now(inner, now)) })
	}
}
