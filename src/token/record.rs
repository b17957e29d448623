//! Access-token records and lifecycle helpers.

// self
use crate::{_prelude::*, id::IdentityId, token::TokenSecret};

/// Lifecycle status of an access token at a given instant.
///
/// There is no path back from [`TokenStatus::Expired`]; renewal mints a new token instead of
/// resurrecting an old one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is currently valid.
	Valid,
	/// Token reached its expiry instant.
	Expired,
}

/// Time-limited access credential persisted by the content store.
///
/// `expires_at` is fixed at mint time and never extended. Expired records are never deleted by
/// the core; they age out under store-side garbage collection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Globally unique credential secret.
	pub secret: TokenSecret,
	/// Owning identity; [`IdentityId::SHARED`] marks a credential valid for any requester.
	pub owner: IdentityId,
	/// Mint instant.
	pub issued_at: OffsetDateTime,
	/// Expiry instant, set once at mint time.
	pub expires_at: OffsetDateTime,
	/// Number of successful verifications recorded against this token.
	pub used_count: u64,
	/// Instant of the most recent successful verification.
	pub last_used_at: Option<OffsetDateTime>,
}
impl AccessToken {
	/// Mints a fresh token for `owner`, valid for `valid_for` from the current clock.
	pub fn mint(owner: IdentityId, valid_for: Duration) -> Self {
		Self::mint_at(owner, valid_for, OffsetDateTime::now_utc())
	}

	/// Mints a fresh token for `owner`, valid for `valid_for` from `now`.
	pub fn mint_at(owner: IdentityId, valid_for: Duration, now: OffsetDateTime) -> Self {
		Self {
			secret: TokenSecret::mint(),
			owner,
			issued_at: now,
			expires_at: now + valid_for,
			used_count: 0,
			last_used_at: None,
		}
	}

	/// Computes the lifecycle status at the given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}

		TokenStatus::Valid
	}

	/// Convenience helper that checks the status using the current UTC instant.
	pub fn status(&self) -> TokenStatus {
		self.status_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` while the token is valid at the provided instant.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Valid)
	}

	/// Returns `true` while the token is valid relative to the current clock.
	pub fn is_valid(&self) -> bool {
		matches!(self.status(), TokenStatus::Valid)
	}

	/// Returns `true` for credentials owned by the shared identity.
	pub fn is_shared(&self) -> bool {
		self.owner.is_shared()
	}

	/// Remaining validity at the provided instant; zero once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		(self.expires_at - instant).max(Duration::ZERO)
	}

	/// Records one successful verification.
	pub fn record_use(&mut self, instant: OffsetDateTime) {
		self.used_count += 1;
		self.last_used_at = Some(instant);
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("owner", &self.owner)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("used_count", &self.used_count)
			.field("last_used_at", &self.last_used_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn status_flips_exactly_at_expiry() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = AccessToken::mint_at(IdentityId::new(5), Duration::hours(24), issued);

		assert_eq!(token.status_at(issued), TokenStatus::Valid);
		assert_eq!(token.status_at(issued + Duration::hours(23)), TokenStatus::Valid);
		assert_eq!(token.status_at(issued + Duration::hours(24)), TokenStatus::Expired);
		assert!(!token.is_valid_at(issued + Duration::hours(25)));
	}

	#[test]
	fn remaining_validity_floors_at_zero() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = AccessToken::mint_at(IdentityId::SHARED, Duration::hours(1), issued);

		assert!(token.is_shared());
		assert_eq!(token.remaining_at(issued + Duration::minutes(30)), Duration::minutes(30));
		assert_eq!(token.remaining_at(issued + Duration::hours(2)), Duration::ZERO);
	}

	#[test]
	fn use_statistics_accumulate() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let mut token = AccessToken::mint_at(IdentityId::new(5), Duration::hours(24), issued);

		token.record_use(issued + Duration::minutes(1));
		token.record_use(issued + Duration::minutes(2));

		assert_eq!(token.used_count, 2);
		assert_eq!(token.last_used_at, Some(issued + Duration::minutes(2)));
	}

	#[test]
	fn debug_output_redacts_the_secret() {
		let token = AccessToken::mint(IdentityId::new(5), Duration::hours(1));
		let rendered = format!("{token:?}");

		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains(token.secret.expose()));
	}
}
