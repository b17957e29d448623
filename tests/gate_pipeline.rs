// std
use std::{
	sync::{Arc, Mutex},
	time::Duration as StdDuration,
};
// crates.io
use time::{Duration, macros};
// self
use content_gate::{
	config::GateConfig,
	content::{BatchRecord, ItemRecord},
	delivery::{DeliverySink, Destination, SinkFuture},
	error::Error,
	id::{BatchId, IdentityId, ItemId},
	pipeline::{Gate, GateReply, VerifyReply},
	store::{ContentStore, MemoryStore},
	token::AccessToken,
};

const DESTINATION: Destination = Destination::new(42);

#[derive(Default)]
struct RecordingSink(Mutex<Vec<String>>);
impl RecordingSink {
	fn delivered(&self) -> Vec<String> {
		self.0.lock().expect("Sink mutex should not be poisoned.").clone()
	}
}
impl DeliverySink for RecordingSink {
	fn deliver<'a>(&'a self, _: Destination, item: &'a ItemRecord) -> SinkFuture<'a> {
		Box::pin(async move {
			self.0.lock().expect("Sink mutex should not be poisoned.").push(item.id.to_string());

			Ok(())
		})
	}
}

fn quick_config() -> GateConfig {
	GateConfig { chunk_delay_ms: 0, ..Default::default() }
}

async fn seed_item(store: &MemoryStore, id: &str) {
	let created = macros::datetime!(2025-06-01 00:00 UTC);
	let record = ItemRecord::new(
		ItemId::new(id).expect("Item fixture should be valid."),
		format!("locator-{id}"),
		IdentityId::new(1),
		created,
	);

	store.save_item(record).await.expect("Seeding an item should succeed.");
}

async fn authorize_everyone(store: &MemoryStore) {
	let shared = AccessToken::mint(IdentityId::SHARED, Duration::hours(24));

	store.save_token(shared).await.expect("Seeding the shared token should succeed.");
}

fn gate_over(store: &MemoryStore, sink: Arc<RecordingSink>, config: GateConfig) -> Gate {
	Gate::new(Arc::new(store.clone()), sink, config).expect("Gate construction should succeed.")
}

#[tokio::test]
async fn uncredentialed_requests_are_turned_away() {
	let store = MemoryStore::default();
	let sink = Arc::new(RecordingSink::default());

	seed_item(&store, "item1").await;

	let gate = gate_over(&store, sink.clone(), quick_config());
	let reply = gate.handle_request(IdentityId::new(7), DESTINATION, "item1").await;

	assert_eq!(reply, GateReply::Unauthorized);
	assert!(sink.delivered().is_empty());
}

#[tokio::test]
async fn credentialed_requests_flow_through_to_delivery() {
	let store = MemoryStore::default();
	let sink = Arc::new(RecordingSink::default());

	seed_item(&store, "item1").await;
	authorize_everyone(&store).await;

	let gate = gate_over(&store, sink.clone(), quick_config());
	let reply = gate.handle_request(IdentityId::new(7), DESTINATION, "item1").await;

	match reply {
		GateReply::Delivered(outcome) => {
			assert!(outcome.is_complete());
			assert_eq!(outcome.delivered.len(), 1);
		},
		other => panic!("expected a delivery, got {other:?}"),
	}

	assert_eq!(sink.delivered(), ["item1"]);

	let snapshot = gate.stats_snapshot();

	assert_eq!(snapshot.requests_total, 1);
	assert_eq!(snapshot.error_rate_percent, 0.0);
	assert_eq!(snapshot.active_identity_count, 1);
	assert!(snapshot.store_queries >= 2, "coverage check and resolve must hit the store");
}

#[tokio::test]
async fn batches_deliver_with_partial_failures_reported() {
	let store = MemoryStore::default();
	let sink = Arc::new(RecordingSink::default());

	seed_item(&store, "item1").await;
	seed_item(&store, "item3").await;
	authorize_everyone(&store).await;

	let batch = BatchRecord::new(
		BatchId::new("batch1").expect("Batch fixture should be valid."),
		["item1", "item2", "item3"]
			.into_iter()
			.map(|id| ItemId::new(id).expect("Item fixture should be valid."))
			.collect(),
		IdentityId::new(1),
		macros::datetime!(2025-06-01 00:00 UTC),
	);

	store.save_batch(batch).await.expect("Seeding the batch should succeed.");

	let gate = gate_over(&store, sink.clone(), quick_config());
	let reply = gate.handle_request(IdentityId::new(7), DESTINATION, "batch1").await;

	match reply {
		GateReply::Delivered(outcome) => {
			assert_eq!(outcome.delivered.len(), 2);
			assert_eq!(outcome.missing.len(), 1);
		},
		other => panic!("expected a delivery, got {other:?}"),
	}
}

#[tokio::test]
async fn the_window_limiter_rejects_before_anything_else() {
	let store = MemoryStore::default();
	let sink = Arc::new(RecordingSink::default());
	let config = GateConfig { limiter_max_requests: 3, ..quick_config() };
	let gate = gate_over(&store, sink, config);
	let identity = IdentityId::new(7);

	for _ in 0..3 {
		assert_eq!(
			gate.handle_request(identity, DESTINATION, "item1").await,
			GateReply::Unauthorized,
			"admitted requests still fail the credential check",
		);
	}

	match gate.handle_request(identity, DESTINATION, "item1").await {
		GateReply::RateLimited { retry_after } => {
			assert!(retry_after > Duration::seconds(55), "retry-after should be almost a minute");
			assert!(retry_after <= Duration::seconds(60));
		},
		other => panic!("expected a rate-limit denial, got {other:?}"),
	}

	// A different identity is unaffected.
	assert_eq!(
		gate.handle_request(IdentityId::new(8), DESTINATION, "item1").await,
		GateReply::Unauthorized,
	);
}

#[tokio::test]
async fn missing_references_read_as_not_found() {
	let store = MemoryStore::default();
	let sink = Arc::new(RecordingSink::default());

	authorize_everyone(&store).await;

	let gate = gate_over(&store, sink, quick_config());

	assert_eq!(
		gate.handle_request(IdentityId::new(7), DESTINATION, "ghost").await,
		GateReply::NotFound,
	);
}

#[tokio::test]
async fn redemption_accepts_live_secrets_and_rejects_the_rest() {
	let store = MemoryStore::default();
	let sink = Arc::new(RecordingSink::default());
	let gate = gate_over(&store, sink, quick_config());
	let requester = IdentityId::new(9);
	let token =
		gate.tokens.issue(requester).await.expect("Issuing a personal token should succeed.");
	let accepted = gate.verify_request(requester, token.secret.expose()).await;

	assert_eq!(accepted, VerifyReply::Accepted(requester));
	assert_eq!(
		gate.verify_request(requester, "not-a-secret").await,
		VerifyReply::Rejected,
	);
}

#[tokio::test]
async fn accepted_redemption_unlocks_the_requester() {
	let store = MemoryStore::default();
	let sink = Arc::new(RecordingSink::default());

	seed_item(&store, "item1").await;

	let gate = gate_over(&store, sink, quick_config());
	let requester = IdentityId::new(9);

	// Prime a negative coverage answer, then redeem a fresh personal token.
	assert_eq!(
		gate.handle_request(requester, DESTINATION, "item1").await,
		GateReply::Unauthorized,
	);

	let token =
		gate.tokens.issue(requester).await.expect("Issuing a personal token should succeed.");

	assert_eq!(
		gate.verify_request(requester, token.secret.expose()).await,
		VerifyReply::Accepted(requester),
	);

	match gate.handle_request(requester, DESTINATION, "item1").await {
		GateReply::Delivered(outcome) => assert!(outcome.is_complete()),
		other => panic!("expected a delivery after redemption, got {other:?}"),
	}
}

#[tokio::test]
async fn background_loops_start_and_shut_down() {
	let store = MemoryStore::default();
	let sink = Arc::new(RecordingSink::default());
	let gate = gate_over(&store, sink, quick_config());
	let tasks = gate.spawn_background();

	// The refresher's first cycle fires immediately and bootstraps the shared credential.
	tokio::time::sleep(StdDuration::from_millis(100)).await;

	assert!(
		gate.tokens.has_valid_token(IdentityId::new(123)).await,
		"the refresher should have minted a shared credential",
	);

	tasks.shutdown().await;
}

#[tokio::test]
async fn invalid_configuration_is_rejected_loudly() {
	let store = MemoryStore::default();
	let sink = Arc::new(RecordingSink::default());
	let config = GateConfig { chunk_size: 0, ..Default::default() };
	let denied = Gate::new(Arc::new(store.clone()), sink, config);

	assert!(matches!(denied, Err(Error::Config(_))));
}
