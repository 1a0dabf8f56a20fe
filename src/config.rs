//! Resolved metadata-service configuration.
//!
//! The provider builder collapses its settings into one immutable [`ImdsConfig`] value
//! before anything else is constructed. The two administrative disable switches are the
//! exception: unless explicitly overridden they are re-read from the environment on
//! every use, because operators flip them at runtime.

// std
use std::{env, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::ConfigError};

/// Environment variable that disables all local credential loading.
pub const METADATA_DISABLED_ENV: &str = "AWS_EC2_METADATA_DISABLED";
/// Environment variable that disables the version-1 (tokenless) fallback.
pub const V1_DISABLED_ENV: &str = "AWS_EC2_METADATA_V1_DISABLED";
/// Profile-file key that disables the version-1 (tokenless) fallback.
pub const V1_DISABLED_PROFILE_KEY: &str = "ec2_metadata_v1_disabled";
/// Environment variable overriding the metadata service endpoint.
pub const ENDPOINT_ENV: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";
/// Environment variable selecting the metadata service endpoint mode.
pub const ENDPOINT_MODE_ENV: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT_MODE";

const IPV4_ENDPOINT: &str = "http://169.254.169.254";
const IPV6_ENDPOINT: &str = "http://[fd00:ec2::254]";

/// Address family used to reach the metadata service when no explicit endpoint is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EndpointMode {
	/// Use the well-known IPv4 link-local address.
	#[default]
	IpV4,
	/// Use the well-known IPv6 unique-local address.
	IpV6,
}
impl EndpointMode {
	/// Returns the well-known endpoint for this mode.
	pub const fn default_endpoint(self) -> &'static str {
		match self {
			EndpointMode::IpV4 => IPV4_ENDPOINT,
			EndpointMode::IpV6 => IPV6_ENDPOINT,
		}
	}

	/// Parses the mode from its environment representation, defaulting to IPv4.
	pub fn from_env() -> Self {
		match env::var(ENDPOINT_MODE_ENV) {
			Ok(value) if value.eq_ignore_ascii_case("ipv6") => EndpointMode::IpV6,
			_ => EndpointMode::IpV4,
		}
	}
}

/// Immutable metadata-service configuration consumed by the protocol layer.
#[derive(Clone, Debug)]
pub struct ImdsConfig {
	/// Explicit endpoint override; wins over the environment and the endpoint mode.
	pub endpoint: Option<String>,
	/// Address family used when no explicit endpoint is configured.
	pub endpoint_mode: EndpointMode,
	/// Connection timeout applied independently to each metadata request.
	pub connect_timeout: StdDuration,
	/// Time-to-live requested for session tokens, in seconds.
	pub token_ttl_secs: u64,
	/// Overrides the [`METADATA_DISABLED_ENV`] switch when set.
	pub metadata_disabled: Option<bool>,
	/// Overrides the [`V1_DISABLED_ENV`] switch when set.
	pub v1_fallback_disabled: Option<bool>,
}
impl ImdsConfig {
	/// Default connection timeout for each metadata request.
	pub const DEFAULT_CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(1);
	/// Default session-token time-to-live, in seconds.
	pub const DEFAULT_TOKEN_TTL_SECS: u64 = 21_600;

	/// Resolves the metadata endpoint: explicit override, then the environment, then the
	/// endpoint-mode default. The trailing slash, if any, is trimmed so resource paths
	/// can be appended verbatim.
	pub fn resolve_endpoint(&self) -> Result<String, ConfigError> {
		let raw = match &self.endpoint {
			Some(endpoint) => endpoint.clone(),
			None => env::var(ENDPOINT_ENV)
				.unwrap_or_else(|_| self.endpoint_mode.default_endpoint().to_owned()),
		};
		let trimmed = raw.trim_end_matches('/');

		// Validate eagerly so a bad override fails before the first request is issued.
		Url::parse(trimmed)
			.map_err(|e| ConfigError::InvalidEndpoint { endpoint: trimmed.to_owned(), source: e })?;

		Ok(trimmed.to_owned())
	}

	/// Returns `true` when local credential loading is administratively disabled.
	///
	/// Re-reads the environment on every call unless the builder supplied an override.
	pub fn is_metadata_disabled(&self) -> bool {
		self.metadata_disabled.unwrap_or_else(|| env_flag(METADATA_DISABLED_ENV))
	}

	/// Returns `true` when the version-1 (tokenless) fallback is administratively
	/// disabled.
	pub fn is_v1_fallback_disabled(&self) -> bool {
		self.v1_fallback_disabled.unwrap_or_else(|| env_flag(V1_DISABLED_ENV))
	}
}
impl Default for ImdsConfig {
	fn default() -> Self {
		Self {
			endpoint: None,
			endpoint_mode: EndpointMode::from_env(),
			connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
			token_ttl_secs: Self::DEFAULT_TOKEN_TTL_SECS,
			metadata_disabled: None,
			v1_fallback_disabled: None,
		}
	}
}

fn env_flag(name: &str) -> bool {
	env::var(name).map(|value| value.trim().eq_ignore_ascii_case("true")).unwrap_or(false)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn config_with_endpoint(endpoint: &str) -> ImdsConfig {
		ImdsConfig { endpoint: Some(endpoint.into()), ..ImdsConfig::default() }
	}

	#[test]
	fn endpoint_override_trims_trailing_slash() {
		let config = config_with_endpoint("http://127.0.0.1:8080/");

		assert_eq!(
			config.resolve_endpoint().expect("Endpoint override should resolve."),
			"http://127.0.0.1:8080"
		);
	}

	#[test]
	fn invalid_endpoint_override_is_rejected() {
		let config = config_with_endpoint("not a url");
		let err = config.resolve_endpoint().expect_err("Invalid endpoint should be rejected.");

		assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
	}

	#[test]
	fn endpoint_modes_map_to_well_known_addresses() {
		assert_eq!(EndpointMode::IpV4.default_endpoint(), "http://169.254.169.254");
		assert_eq!(EndpointMode::IpV6.default_endpoint(), "http://[fd00:ec2::254]");
	}

	#[test]
	fn builder_overrides_win_over_the_environment() {
		let config = ImdsConfig {
			metadata_disabled: Some(true),
			v1_fallback_disabled: Some(false),
			..ImdsConfig::default()
		};

		assert!(config.is_metadata_disabled());
		assert!(!config.is_v1_fallback_disabled());
	}
}
