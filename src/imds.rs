//! The token-based metadata credential-retrieval protocol.
//!
//! One [`CredentialsLoader::load`] call performs up to three HTTP requests against a
//! single resolved hostname: a version-2 token acquisition (`PUT /latest/api/token`),
//! the role-name listing, and the role-credentials fetch. An HTTP 400 on the token
//! request fails the whole operation; any other token failure falls back to the
//! tokenless version-1 variant unless that fallback is administratively disabled.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	config::ImdsConfig,
	credentials::Credentials,
	error::ConfigError,
	http::{MetadataClient, MetadataMethod, MetadataRequest, MetadataResponse},
};

/// Resource path used to acquire a version-2 session token.
pub const TOKEN_RESOURCE: &str = "/latest/api/token";
/// Resource path listing the role names that carry credentials.
pub const SECURITY_CREDENTIALS_RESOURCE: &str = "/latest/meta-data/iam/security-credentials/";
/// Header carrying the session token on version-2 requests.
pub const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
/// Header requesting a token time-to-live, in seconds.
pub const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";

/// Retrieves one credential bundle from the metadata service.
///
/// The loader is stateless between calls: the session token is re-acquired on every
/// refresh cycle and never cached.
pub struct CredentialsLoader {
	client: Arc<dyn MetadataClient>,
	config: ImdsConfig,
}
impl CredentialsLoader {
	/// Creates a loader over the provided transport and configuration.
	pub fn new(client: Arc<dyn MetadataClient>, config: ImdsConfig) -> Self {
		Self { client, config }
	}

	/// Runs the full protocol and returns the parsed credentials.
	pub async fn load(&self) -> Result<Credentials> {
		let endpoint = self.config.resolve_endpoint()?;
		let token = self.fetch_token(&endpoint).await?;
		let role = self.fetch_role_name(&endpoint, token.as_deref()).await?;
		let document = self.fetch_role_credentials(&endpoint, token.as_deref(), &role).await?;

		parse_credentials_document(&document)
	}

	fn timeout(&self) -> StdDuration {
		self.config.connect_timeout
	}

	fn resource_url(&self, endpoint: &str, resource: &str) -> Result<Url> {
		let raw = format!("{endpoint}{resource}");

		Url::parse(&raw)
			.map_err(|e| ConfigError::InvalidEndpoint { endpoint: raw, source: e }.into())
	}

	async fn fetch_token(&self, endpoint: &str) -> Result<Option<String>> {
		let url = self.resource_url(endpoint, TOKEN_RESOURCE)?;
		let request = MetadataRequest::new(MetadataMethod::Put, url, self.timeout())
			.with_header(TOKEN_TTL_HEADER, self.config.token_ttl_secs.to_string());

		match self.client.execute(request).await {
			Ok(response) if response.is_success() => Ok(Some(response.body.trim().to_owned())),
			// An active 400 rejection means the token protocol itself refused us; falling
			// back to version 1 would mask a server-side misconfiguration.
			Ok(MetadataResponse { status: 400, .. }) => Err(Error::TokenRejected),
			Ok(response) => self.handle_token_unavailable(Error::UnexpectedStatus {
				resource: TOKEN_RESOURCE.into(),
				status: response.status,
			}),
			Err(e) => self.handle_token_unavailable(e.into()),
		}
	}

	fn handle_token_unavailable(&self, source: Error) -> Result<Option<String>> {
		if self.config.is_v1_fallback_disabled() {
			return Err(Error::FallbackDisabled { source: Box::new(source) });
		}

		#[cfg(feature = "tracing")]
		tracing::debug!(
			error = %source,
			"Ignoring non-fatal token failure; continuing with the tokenless variant.",
		);

		Ok(None)
	}

	async fn fetch_role_name(&self, endpoint: &str, token: Option<&str>) -> Result<String> {
		let url = self.resource_url(endpoint, SECURITY_CREDENTIALS_RESOURCE)?;
		let response = self.execute_get(url, token).await?;

		if !response.is_success() {
			return Err(Error::UnexpectedStatus {
				resource: SECURITY_CREDENTIALS_RESOURCE.into(),
				status: response.status,
			});
		}

		response
			.body
			.lines()
			.map(str::trim)
			.find(|line| !line.is_empty())
			.map(str::to_owned)
			.ok_or(Error::NoCredentialsPath)
	}

	async fn fetch_role_credentials(
		&self,
		endpoint: &str,
		token: Option<&str>,
		role: &str,
	) -> Result<String> {
		let resource = format!("{SECURITY_CREDENTIALS_RESOURCE}{role}");
		let url = self.resource_url(endpoint, &resource)?;
		let response = self.execute_get(url, token).await?;

		if !response.is_success() {
			return Err(Error::UnexpectedStatus { resource, status: response.status });
		}

		Ok(response.body)
	}

	async fn execute_get(&self, url: Url, token: Option<&str>) -> Result<MetadataResponse> {
		let mut request = MetadataRequest::new(MetadataMethod::Get, url, self.timeout());

		if let Some(token) = token {
			request = request.with_header(TOKEN_HEADER, token);
		}

		Ok(self.client.execute(request).await?)
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialsDocument {
	#[serde(default)]
	#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
	code: Option<String>,
	access_key_id: String,
	secret_access_key: String,
	#[serde(default)]
	token: Option<String>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	expiration: Option<OffsetDateTime>,
}

fn parse_credentials_document(document: &str) -> Result<Credentials> {
	let mut deserializer = serde_json::Deserializer::from_str(document);
	let parsed: CredentialsDocument = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|e| Error::MalformedCredentials { source: e })?;

	#[cfg(feature = "tracing")]
	if parsed.code.as_deref().is_some_and(|code| code != "Success") {
		tracing::debug!(
			code = parsed.code.as_deref(),
			"Credentials document reported a non-success code.",
		);
	}

	let mut credentials = Credentials::new(parsed.access_key_id, parsed.secret_access_key);

	if let Some(token) = parsed.token {
		credentials = credentials.with_session_token(token);
	}
	if let Some(expiration) = parsed.expiration {
		credentials = credentials.with_expiration(expiration);
	}

	Ok(credentials)
}
