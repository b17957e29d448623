//! Access-credential domain types and the shared-credential lifecycle manager.

pub mod manager;
pub mod record;
pub mod secret;

pub use manager::{
	ObserverFuture, RefreshOutcome, TokenManager, TokenMetrics, TokenObserver, TokenPolicy,
	TokenValidity,
};
pub use record::{AccessToken, TokenStatus};
pub use secret::TokenSecret;
