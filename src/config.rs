//! Configuration values consumed by the gate core.

// self
use crate::{_prelude::*, error::ConfigError};

/// Value-only configuration for every gate component.
///
/// Where the values come from (environment, file, flags) is the boundary layer's concern; any
/// `serde` format works, and [`GateConfig::default`] carries the design defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
	/// Default cache entry TTL, in seconds.
	pub cache_default_ttl_secs: u64,
	/// Cache capacity bound enforced by the reclamation cycle.
	pub cache_max_size: usize,
	/// Interval between cache reclamation cycles, in seconds.
	pub cache_reclaim_interval_secs: u64,
	/// Admitted requests per identity within the sliding window.
	pub limiter_max_requests: usize,
	/// Sliding-window length, in seconds.
	pub limiter_window_secs: u64,
	/// Interval between sliding-window sweeps, in seconds.
	pub limiter_sweep_interval_secs: u64,
	/// Token-bucket capacity.
	pub bucket_max_tokens: f64,
	/// Token-bucket refill rate, in tokens per second.
	pub bucket_refill_rate: f64,
	/// Shared-credential validity, in seconds.
	pub token_validity_secs: u64,
	/// Remaining-validity floor below which the shared credential is renewed, in seconds.
	pub token_renewal_margin_secs: u64,
	/// Verification memoization TTL, in seconds.
	pub verify_memo_ttl_secs: u64,
	/// Owner-credential memoization TTL, in seconds.
	pub owner_memo_ttl_secs: u64,
	/// Items delivered per fan-out chunk.
	pub chunk_size: usize,
	/// Delay between fan-out chunks, in milliseconds.
	pub chunk_delay_ms: u64,
}
impl Default for GateConfig {
	fn default() -> Self {
		Self {
			cache_default_ttl_secs: 300,
			cache_max_size: 10_000,
			cache_reclaim_interval_secs: 60,
			limiter_max_requests: 30,
			limiter_window_secs: 60,
			limiter_sweep_interval_secs: 30,
			bucket_max_tokens: 100.0,
			bucket_refill_rate: 10.0,
			token_validity_secs: 86_400,
			token_renewal_margin_secs: 3_600,
			verify_memo_ttl_secs: 60,
			owner_memo_ttl_secs: 300,
			chunk_size: 5,
			chunk_delay_ms: 500,
		}
	}
}
impl GateConfig {
	/// Parses and validates a JSON payload, reporting the path of the first malformed field.
	pub fn from_json_slice(payload: &[u8]) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_slice(payload);
		let config: Self = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Rejects values the core cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.cache_default_ttl_secs == 0 {
			return Err(ConfigError::NonPositive { setting: "cache_default_ttl_secs" });
		}
		if self.cache_max_size == 0 {
			return Err(ConfigError::NonPositive { setting: "cache_max_size" });
		}
		if self.cache_reclaim_interval_secs == 0 {
			return Err(ConfigError::NonPositive { setting: "cache_reclaim_interval_secs" });
		}
		if self.limiter_max_requests == 0 {
			return Err(ConfigError::NonPositive { setting: "limiter_max_requests" });
		}
		if self.limiter_window_secs == 0 {
			return Err(ConfigError::NonPositive { setting: "limiter_window_secs" });
		}
		if self.limiter_sweep_interval_secs == 0 {
			return Err(ConfigError::NonPositive { setting: "limiter_sweep_interval_secs" });
		}
		if self.bucket_max_tokens <= 0.0 {
			return Err(ConfigError::NonPositive { setting: "bucket_max_tokens" });
		}
		if self.bucket_refill_rate <= 0.0 {
			return Err(ConfigError::NonPositive { setting: "bucket_refill_rate" });
		}
		if self.token_validity_secs == 0 {
			return Err(ConfigError::NonPositive { setting: "token_validity_secs" });
		}
		if self.verify_memo_ttl_secs == 0 {
			return Err(ConfigError::NonPositive { setting: "verify_memo_ttl_secs" });
		}
		if self.owner_memo_ttl_secs == 0 {
			return Err(ConfigError::NonPositive { setting: "owner_memo_ttl_secs" });
		}
		if self.chunk_size == 0 {
			return Err(ConfigError::NonPositive { setting: "chunk_size" });
		}

		Ok(())
	}

	/// Default cache entry TTL.
	pub fn cache_default_ttl(&self) -> Duration {
		Duration::seconds(self.cache_default_ttl_secs as i64)
	}

	/// Interval between cache reclamation cycles.
	pub fn cache_reclaim_interval(&self) -> StdDuration {
		StdDuration::from_secs(self.cache_reclaim_interval_secs)
	}

	/// Sliding-window length.
	pub fn limiter_window(&self) -> Duration {
		Duration::seconds(self.limiter_window_secs as i64)
	}

	/// Interval between sliding-window sweeps.
	pub fn limiter_sweep_interval(&self) -> StdDuration {
		StdDuration::from_secs(self.limiter_sweep_interval_secs)
	}

	/// Shared-credential validity.
	pub fn token_validity(&self) -> Duration {
		Duration::seconds(self.token_validity_secs as i64)
	}

	/// Remaining-validity floor below which the shared credential is renewed.
	pub fn token_renewal_margin(&self) -> Duration {
		Duration::seconds(self.token_renewal_margin_secs as i64)
	}

	/// Interval between renewal checks: half the validity, so a renewal never races the margin.
	pub fn token_refresh_interval(&self) -> StdDuration {
		StdDuration::from_secs((self.token_validity_secs / 2).max(1))
	}

	/// Verification memoization TTL.
	pub fn verify_memo_ttl(&self) -> Duration {
		Duration::seconds(self.verify_memo_ttl_secs as i64)
	}

	/// Owner-credential memoization TTL.
	pub fn owner_memo_ttl(&self) -> Duration {
		Duration::seconds(self.owner_memo_ttl_secs as i64)
	}

	/// Delay between fan-out chunks.
	pub fn chunk_delay(&self) -> StdDuration {
		StdDuration::from_millis(self.chunk_delay_ms)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_validate() {
		GateConfig::default().validate().expect("Design defaults should validate.");
	}

	#[test]
	fn json_payloads_fill_in_defaults() {
		let config = GateConfig::from_json_slice(br#"{ "chunk_size": 10 }"#)
			.expect("Partial payload should parse with defaults.");

		assert_eq!(config.chunk_size, 10);
		assert_eq!(config.cache_max_size, GateConfig::default().cache_max_size);
	}

	#[test]
	fn malformed_payloads_report_the_offending_path() {
		let error = GateConfig::from_json_slice(br#"{ "chunk_size": "ten" }"#)
			.expect_err("Malformed payload should be rejected.");

		match error {
			ConfigError::Parse { source } =>
				assert_eq!(source.path().to_string(), "chunk_size"),
			other => panic!("expected a parse error, got {other:?}"),
		}
	}

	#[test]
	fn zero_chunk_size_is_rejected() {
		let config = GateConfig { chunk_size: 0, ..Default::default() };

		assert!(matches!(
			config.validate(),
			Err(ConfigError::NonPositive { setting: "chunk_size" })
		));
	}
}
