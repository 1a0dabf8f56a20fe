//! Transport primitives for metadata-service requests.
//!
//! The module exposes [`MetadataClient`], the crate's only dependency on an HTTP stack.
//! A client executes exactly one request and reports either the status/body pair or a
//! typed transport failure; everything above it (token protocol, caching) is
//! transport-agnostic. The built-in [`ReqwestMetadataClient`] is available behind the
//! default-on `reqwest` feature.

// std
use std::{ops::Deref, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`MetadataClient::execute`].
pub type MetadataFuture<'a> =
	Pin<Box<dyn Future<Output = Result<MetadataResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing one metadata request.
///
/// Implementations must be `Send + Sync` so one client can serve concurrent foreground
/// callers and the background prefetch worker. A non-success HTTP status is not a
/// transport error; it is reported through [`MetadataResponse::status`] so the protocol
/// layer can apply its own fallback rules (notably the HTTP 400 token rejection).
pub trait MetadataClient
where
	Self: Send + Sync,
{
	/// Executes a single request, honoring [`MetadataRequest::timeout`].
	///
	/// No retries; retry discipline, if any, belongs to the next refresh cycle.
	fn execute(&self, request: MetadataRequest) -> MetadataFuture<'_>;
}

/// HTTP method used for metadata requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataMethod {
	/// `GET`, used for the role list and role-credentials resources.
	Get,
	/// `PUT`, used for token acquisition.
	Put,
}
impl MetadataMethod {
	/// Returns the wire representation of the method.
	pub const fn as_str(self) -> &'static str {
		match self {
			MetadataMethod::Get => "GET",
			MetadataMethod::Put => "PUT",
		}
	}
}

/// One fully described metadata-service request.
#[derive(Clone, Debug)]
pub struct MetadataRequest {
	/// HTTP method.
	pub method: MetadataMethod,
	/// Absolute request URL.
	pub url: Url,
	/// Request headers as static-name/value pairs.
	pub headers: Vec<(&'static str, String)>,
	/// Timeout applied to this request alone.
	pub timeout: StdDuration,
}
impl MetadataRequest {
	/// Creates a request with no headers.
	pub fn new(method: MetadataMethod, url: Url, timeout: StdDuration) -> Self {
		Self { method, url, headers: Vec::new(), timeout }
	}

	/// Appends a header to the request.
	pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
		self.headers.push((name, value.into()));

		self
	}
}

/// Status and body text of a completed metadata request.
#[derive(Clone, Debug)]
pub struct MetadataResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body decoded as text.
	pub body: String,
}
impl MetadataResponse {
	/// Returns `true` for 2xx statuses.
	pub const fn is_success(&self) -> bool {
		self.status >= 200 && self.status < 300
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestMetadataClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestMetadataClient {
	/// Builds the stock metadata client.
	///
	/// The metadata service answers directly at fixed paths and never redirects
	/// legitimately, so redirect following is disabled here. Custom clients passed to
	/// [`with_client`](Self::with_client) should do the same.
	pub fn metadata_default() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(crate::error::ConfigError::http_client_build)?;

		Ok(Self(client))
	}

	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestMetadataClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestMetadataClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl MetadataClient for ReqwestMetadataClient {
	fn execute(&self, request: MetadataRequest) -> MetadataFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				MetadataMethod::Get => reqwest::Method::GET,
				MetadataMethod::Put => reqwest::Method::PUT,
			};
			let mut builder = client.request(method, request.url).timeout(request.timeout);

			for (name, value) in &request.headers {
				builder = builder.header(*name, value);
			}

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let body = response.text().await.map_err(TransportError::from)?;

			Ok(MetadataResponse { status, body })
		})
	}
}
