//! Strongly typed identifiers for requesters, stored items, and batch jobs.

// std
use std::{borrow::Borrow, ops::Deref, str::FromStr};
// self
use crate::_prelude::*;

macro_rules! def_ref {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new reference after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, ReferenceError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = ReferenceError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = ReferenceError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const REFERENCE_MAX_LEN: usize = 128;

/// Error returned when reference validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum ReferenceError {
	/// The reference was empty.
	#[error("{kind} reference cannot be empty.")]
	Empty {
		/// Kind of reference (item, batch).
		kind: &'static str,
	},
	/// The reference contains whitespace characters.
	#[error("{kind} reference contains whitespace.")]
	ContainsWhitespace {
		/// Kind of reference (item, batch).
		kind: &'static str,
	},
	/// The reference exceeded the allowed character count.
	#[error("{kind} reference exceeds {max} characters.")]
	TooLong {
		/// Kind of reference (item, batch).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_ref! { ItemId, "Unique reference for a stored content item.", "Item" }
def_ref! { BatchId, "Unique reference for a stored batch job.", "Batch" }

fn validate_view(kind: &'static str, view: &str) -> Result<(), ReferenceError> {
	if view.is_empty() {
		return Err(ReferenceError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(ReferenceError::ContainsWhitespace { kind });
	}
	if view.len() > REFERENCE_MAX_LEN {
		return Err(ReferenceError::TooLong { kind, max: REFERENCE_MAX_LEN });
	}

	Ok(())
}

/// Numeric identity of a requester.
///
/// [`IdentityId::SHARED`] (zero) denotes the system-wide identity; credentials owned by it are
/// valid for any requester.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityId(i64);
impl IdentityId {
	/// The system-wide identity whose credentials cover every requester.
	pub const SHARED: Self = Self(0);

	/// Wraps a raw identity number.
	pub const fn new(value: i64) -> Self {
		Self(value)
	}

	/// Returns the raw identity number.
	pub const fn get(self) -> i64 {
		self.0
	}

	/// Returns `true` for the system-wide identity.
	pub const fn is_shared(self) -> bool {
		self.0 == Self::SHARED.0
	}
}
impl From<i64> for IdentityId {
	fn from(value: i64) -> Self {
		Self(value)
	}
}
impl Debug for IdentityId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Identity({})", self.0)
	}
}
impl Display for IdentityId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(&self.0, f)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn references_reject_whitespace_and_empties() {
		assert!(ItemId::new("").is_err());
		assert!(ItemId::new("with space").is_err());
		assert!(BatchId::new(" leading").is_err());

		let item = ItemId::new("item-42").expect("Item fixture should be considered valid.");

		assert_eq!(item.as_ref(), "item-42");
	}

	#[test]
	fn references_enforce_length_limits() {
		let exact = "a".repeat(REFERENCE_MAX_LEN);

		ItemId::new(&exact).expect("Exact length should succeed.");

		let too_long = "a".repeat(REFERENCE_MAX_LEN + 1);

		assert!(ItemId::new(&too_long).is_err());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let item: ItemId =
			serde_json::from_str("\"item-7\"").expect("Item should deserialize successfully.");

		assert_eq!(item.as_ref(), "item-7");
		assert!(serde_json::from_str::<ItemId>("\"with space\"").is_err());
	}

	#[test]
	fn shared_identity_is_zero() {
		assert!(IdentityId::SHARED.is_shared());
		assert!(!IdentityId::new(7).is_shared());
		assert_eq!(IdentityId::new(7).get(), 7);
		assert_eq!(format!("{:?}", IdentityId::new(7)), "Identity(7)");
	}

	#[test]
	fn references_support_str_lookup() {
		let map: HashMap<ItemId, u8> = HashMap::from_iter([(
			ItemId::new("item-123").expect("Item used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("item-123"), Some(&7));
	}
}
