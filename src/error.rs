//! Crate-level error types shared across the transport, protocol, and cache layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Everything below the cached supplier is wrapped into one of these variants with the
/// original cause retained for diagnostics. The cache itself never invents failures; it
/// only decides whether to propagate or suppress them per the stale-value policy.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Local credential loading has been administratively turned off.
	#[error(
		"IMDS credentials have been disabled by the {} environment variable.",
		crate::config::METADATA_DISABLED_ENV
	)]
	MetadataDisabled,
	/// The metadata service actively refused the token request with HTTP 400.
	///
	/// This is a hard failure; the version-1 fallback never applies.
	#[error("Unable to fetch a metadata token: the service rejected the request (HTTP 400).")]
	TokenRejected,
	/// A token could not be obtained and the version-1 fallback is disabled.
	#[error(
		"Failed to retrieve a metadata token, and fallback to IMDS v1 is disabled via the {} \
		 environment variable or the {} configuration file profile setting.",
		crate::config::V1_DISABLED_ENV,
		crate::config::V1_DISABLED_PROFILE_KEY
	)]
	FallbackDisabled {
		/// Underlying token-retrieval failure.
		#[source]
		source: Box<Error>,
	},
	/// The role list returned by the metadata service was empty.
	#[error("Unable to load a credentials path: the metadata service returned no role names.")]
	NoCredentialsPath,
	/// The metadata service answered a resource fetch with a non-success status.
	#[error("Metadata service returned HTTP {status} for `{resource}`.")]
	UnexpectedStatus {
		/// Resource path that produced the status.
		resource: String,
		/// HTTP status code returned by the service.
		status: u16,
	},
	/// The role-credentials document could not be parsed.
	#[error("Credentials document returned by the metadata service is malformed.")]
	MalformedCredentials {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Resolved metadata endpoint is not a valid URL.
	#[error("Metadata endpoint `{endpoint}` is not a valid URL.")]
	InvalidEndpoint {
		/// Offending endpoint string.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// No HTTP transport is available.
	#[error("No metadata client was supplied and the `reqwest` feature is disabled.")]
	MissingClient,
	/// Background refresh was requested with an empty worker name.
	#[error("Background refresh requires a non-empty worker name.")]
	MissingWorkerName,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the metadata service.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the metadata service.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
