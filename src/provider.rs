//! The externally visible credentials-provider facade.
//!
//! [`InstanceProfileCredentialsProvider`] wires configuration into a refresh function,
//! owns one [`CachedSupplier`] over it, and exposes
//! [`resolve_credentials`](InstanceProfileCredentialsProvider::resolve_credentials) and
//! [`close`](InstanceProfileCredentialsProvider::close). The staleness and prefetch
//! scheduling math lives here because it is derived from the credential expiration the
//! protocol reports.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	cache::{
		CachedSupplier, PrefetchStrategy, Refresh, RefreshFuture, RefreshMetrics, RefreshOutcome,
		StaleValuePolicy,
	},
	config::{EndpointMode, ImdsConfig},
	credentials::Credentials,
	http::MetadataClient,
	imds::CredentialsLoader,
};

/// Default name for the background refresh worker.
pub const DEFAULT_WORKER_NAME: &str = "instance-profile-credentials-provider";

/// Buffer subtracted from the expiration to form the staleness instant.
const DEFAULT_STALE_BUFFER: Duration = Duration::seconds(1);
/// Lower bound on the prefetch delay when an expiration is known.
const PREFETCH_FLOOR: Duration = Duration::minutes(5);
/// Prefetch delay used when the service reports no expiration at all.
const UNKNOWN_EXPIRATION_PREFETCH: Duration = Duration::minutes(60);

/// Credentials provider backed by the instance metadata service.
///
/// One provider owns one cache slot. Concurrent
/// [`resolve_credentials`](Self::resolve_credentials) calls share the cached bundle and
/// collapse into a single metadata round trip when a refresh is needed.
pub struct InstanceProfileCredentialsProvider {
	config: ImdsConfig,
	cache: CachedSupplier<Credentials>,
}
impl InstanceProfileCredentialsProvider {
	/// Returns a builder with default settings.
	pub fn builder() -> InstanceProfileCredentialsProviderBuilder {
		InstanceProfileCredentialsProviderBuilder::default()
	}

	/// Resolves credentials, serving the cached bundle whenever it is still fresh.
	///
	/// The administrative disable switch is re-checked on every call, before any cache
	/// or network work, because operators flip it at runtime.
	pub async fn resolve_credentials(&self) -> Result<Credentials> {
		if self.config.is_metadata_disabled() {
			return Err(Error::MetadataDisabled);
		}

		self.cache.get().await
	}

	/// Returns the refresh counters maintained by the underlying cache.
	pub fn metrics(&self) -> &RefreshMetrics {
		self.cache.metrics()
	}

	/// Stops the background refresh worker and releases its resources.
	///
	/// Foreground resolution keeps working after close.
	pub fn close(&self) {
		self.cache.close();
	}
}
impl Debug for InstanceProfileCredentialsProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InstanceProfileCredentialsProvider")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

/// Builder for [`InstanceProfileCredentialsProvider`].
#[derive(Default)]
pub struct InstanceProfileCredentialsProviderBuilder {
	client: Option<Arc<dyn MetadataClient>>,
	endpoint: Option<String>,
	endpoint_mode: Option<EndpointMode>,
	connect_timeout: Option<StdDuration>,
	token_ttl_secs: Option<u64>,
	stale_buffer: Option<Duration>,
	stale_value_policy: StaleValuePolicy,
	async_refresh_enabled: bool,
	worker_name: Option<String>,
	metadata_disabled: Option<bool>,
	v1_fallback_disabled: Option<bool>,
}
impl InstanceProfileCredentialsProviderBuilder {
	/// Supplies a custom HTTP transport.
	///
	/// Defaults to [`ReqwestMetadataClient`](crate::http::ReqwestMetadataClient) when
	/// the `reqwest` feature is enabled.
	pub fn client(mut self, client: Arc<dyn MetadataClient>) -> Self {
		self.client = Some(client);

		self
	}

	/// Overrides the metadata service endpoint, winning over the environment and the
	/// endpoint mode.
	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = Some(endpoint.into());

		self
	}

	/// Selects the address family used when no explicit endpoint is configured.
	pub fn endpoint_mode(mut self, mode: EndpointMode) -> Self {
		self.endpoint_mode = Some(mode);

		self
	}

	/// Sets the per-request connection timeout (defaults to 1 second).
	pub fn connect_timeout(mut self, timeout: StdDuration) -> Self {
		self.connect_timeout = Some(timeout);

		self
	}

	/// Sets the session-token time-to-live in seconds (defaults to 21600).
	pub fn token_ttl_secs(mut self, ttl: u64) -> Self {
		self.token_ttl_secs = Some(ttl);

		self
	}

	/// Configures how long before expiration credentials are considered stale
	/// (defaults to 1 second).
	///
	/// A larger buffer refreshes earlier and can ride out short metadata-service
	/// outages at the cost of more frequent requests.
	pub fn stale_buffer(mut self, buffer: Duration) -> Self {
		self.stale_buffer = Some(buffer);

		self
	}

	/// Selects the stale-value policy (defaults to [`StaleValuePolicy::Allow`]).
	pub fn stale_value_policy(mut self, policy: StaleValuePolicy) -> Self {
		self.stale_value_policy = policy;

		self
	}

	/// Enables or disables the background refresh worker (defaults to disabled).
	pub fn async_refresh_enabled(mut self, enabled: bool) -> Self {
		self.async_refresh_enabled = enabled;

		self
	}

	/// Names the background refresh worker (defaults to [`DEFAULT_WORKER_NAME`]).
	pub fn worker_name(mut self, name: impl Into<String>) -> Self {
		self.worker_name = Some(name.into());

		self
	}

	/// Overrides the `AWS_EC2_METADATA_DISABLED` switch instead of reading the
	/// environment per call.
	pub fn metadata_disabled(mut self, disabled: bool) -> Self {
		self.metadata_disabled = Some(disabled);

		self
	}

	/// Overrides the `AWS_EC2_METADATA_V1_DISABLED` switch instead of reading the
	/// environment per refresh.
	pub fn v1_fallback_disabled(mut self, disabled: bool) -> Self {
		self.v1_fallback_disabled = Some(disabled);

		self
	}

	/// Builds the provider.
	///
	/// With `async_refresh_enabled`, the background worker is spawned here and an
	/// ambient tokio runtime is required.
	pub fn build(self) -> Result<InstanceProfileCredentialsProvider> {
		let client = match self.client {
			Some(client) => client,
			#[cfg(feature = "reqwest")]
			None => Arc::new(crate::http::ReqwestMetadataClient::metadata_default()?),
			#[cfg(not(feature = "reqwest"))]
			None => return Err(crate::error::ConfigError::MissingClient.into()),
		};
		let config = ImdsConfig {
			endpoint: self.endpoint,
			endpoint_mode: self.endpoint_mode.unwrap_or_else(EndpointMode::from_env),
			connect_timeout: self.connect_timeout.unwrap_or(ImdsConfig::DEFAULT_CONNECT_TIMEOUT),
			token_ttl_secs: self.token_ttl_secs.unwrap_or(ImdsConfig::DEFAULT_TOKEN_TTL_SECS),
			metadata_disabled: self.metadata_disabled,
			v1_fallback_disabled: self.v1_fallback_disabled,
		};
		let refresh = Arc::new(CredentialsRefresh {
			loader: CredentialsLoader::new(client, config.clone()),
			config: config.clone(),
			stale_buffer: self.stale_buffer.unwrap_or(DEFAULT_STALE_BUFFER),
		});
		let strategy = if self.async_refresh_enabled {
			PrefetchStrategy::non_blocking(
				self.worker_name.unwrap_or_else(|| DEFAULT_WORKER_NAME.into()),
			)
		} else {
			PrefetchStrategy::OneCallerBlocks
		};
		let cache = CachedSupplier::builder(refresh as Arc<dyn Refresh<Credentials>>)
			.name(DEFAULT_WORKER_NAME)
			.stale_value_policy(self.stale_value_policy)
			.prefetch_strategy(strategy)
			.build()?;

		Ok(InstanceProfileCredentialsProvider { config, cache })
	}
}

/// Adapts the token protocol into the cache's refresh contract.
struct CredentialsRefresh {
	loader: CredentialsLoader,
	config: ImdsConfig,
	stale_buffer: Duration,
}
impl Refresh<Credentials> for CredentialsRefresh {
	fn refresh(&self) -> RefreshFuture<'_, Credentials> {
		Box::pin(async move {
			// Guards the background worker too: a provider disabled at runtime stops
			// refreshing even though its worker keeps ticking.
			if self.config.is_metadata_disabled() {
				return Err(Error::MetadataDisabled);
			}

			let credentials = self.loader.load().await?;
			let now = OffsetDateTime::now_utc();
			let expiration = credentials.expiration();

			#[cfg(feature = "tracing")]
			tracing::debug!(?expiration, "Loaded credentials from the metadata service.");

			Ok(RefreshOutcome::new(credentials)
				.with_stale_time(stale_time(expiration, self.stale_buffer))
				.with_prefetch_time(prefetch_time(expiration, now)))
		})
	}
}

fn stale_time(expiration: Option<OffsetDateTime>, buffer: Duration) -> Option<OffsetDateTime> {
	expiration.map(|instant| instant - buffer)
}

fn prefetch_time(expiration: Option<OffsetDateTime>, now: OffsetDateTime) -> Option<OffsetDateTime> {
	let Some(expiration) = expiration else {
		return Some(now + UNKNOWN_EXPIRATION_PREFETCH);
	};
	let remaining = expiration - now;

	if remaining.is_negative() {
		// The service reported an expiration in the past. We are already stale; the
		// next blocking read handles it instead of a pointless proactive refresh.
		return None;
	}

	Some(now + (remaining / 2i32).max(PREFETCH_FLOOR))
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	const NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

	#[test]
	fn stale_time_subtracts_the_buffer() {
		let expiration = NOW + Duration::minutes(20);

		assert_eq!(
			stale_time(Some(expiration), DEFAULT_STALE_BUFFER),
			Some(expiration - Duration::seconds(1))
		);
		assert_eq!(stale_time(None, DEFAULT_STALE_BUFFER), None);
	}

	#[test]
	fn prefetch_time_halves_the_remaining_lifetime() {
		// 20 minutes remaining: half of it stays above the 5-minute floor.
		assert_eq!(
			prefetch_time(Some(NOW + Duration::minutes(20)), NOW),
			Some(NOW + Duration::minutes(10))
		);
	}

	#[test]
	fn prefetch_time_respects_the_floor() {
		// 6 minutes remaining: half of it would undercut the floor.
		assert_eq!(
			prefetch_time(Some(NOW + Duration::minutes(6)), NOW),
			Some(NOW + Duration::minutes(5))
		);
	}

	#[test]
	fn already_expired_expiration_disables_prefetching() {
		assert_eq!(prefetch_time(Some(NOW - Duration::minutes(5)), NOW), None);
	}

	#[test]
	fn unknown_expiration_prefetches_after_an_hour() {
		assert_eq!(prefetch_time(None, NOW), Some(NOW + Duration::minutes(60)));
	}

	#[cfg(feature = "reqwest")]
	#[tokio::test]
	async fn disabled_switch_short_circuits_resolution() {
		let provider = InstanceProfileCredentialsProvider::builder()
			.endpoint("http://127.0.0.1:1")
			.metadata_disabled(true)
			.build()
			.expect("Provider should build.");
		let err = provider
			.resolve_credentials()
			.await
			.expect_err("Disabled provider must fail before any network attempt.");

		assert!(matches!(err, Error::MetadataDisabled));
	}
}
