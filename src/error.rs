//! Gate-level error types shared across the cache, limiter, token, and delivery layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical gate error exposed by public APIs.
///
/// Expected outcomes (expired credentials, admission denials, missing references, partial batch
/// failures) are modeled as ordinary values, not errors. Only collaborator failures and local
/// configuration problems surface here.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Configuration and validation failures raised at construction time.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A setting that must be positive was zero or negative.
	#[error("Setting `{setting}` must be greater than zero.")]
	NonPositive {
		/// Name of the offending setting.
		setting: &'static str,
	},
	/// Configuration payload contained malformed JSON.
	#[error("Configuration payload is malformed.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;
	use std::error::Error as StdError;

	#[test]
	fn store_error_converts_into_gate_error_with_source() {
		let store_error = StoreError::Backend { message: "store unreachable".into() };
		let gate_error: Error = store_error.clone().into();

		assert!(matches!(gate_error, Error::Storage(_)));
		assert!(gate_error.to_string().contains("store unreachable"));

		let source = StdError::source(&gate_error)
			.expect("Gate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn config_error_names_the_setting() {
		let error = ConfigError::NonPositive { setting: "chunk_size" };

		assert!(error.to_string().contains("chunk_size"));
	}
}
