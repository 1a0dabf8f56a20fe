//! Instance-metadata credentials for Rust: token-authenticated retrieval, single-flight
//! refresh caching, and background prefetch in one crate built for production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod imds;
pub mod obs;
pub mod provider;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)`
	//! or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::provider::{
		InstanceProfileCredentialsProvider, InstanceProfileCredentialsProviderBuilder,
	};

	/// Returns a provider builder wired to a mock metadata endpoint, with both
	/// administrative switches pinned so ambient environment variables cannot leak
	/// into test runs.
	pub fn test_provider_builder(endpoint: &str) -> InstanceProfileCredentialsProviderBuilder {
		InstanceProfileCredentialsProvider::builder()
			.endpoint(endpoint)
			.connect_timeout(std::time::Duration::from_secs(2))
			.metadata_disabled(false)
			.v1_fallback_disabled(false)
	}

	/// Renders a role-credentials document with the provided expiration.
	pub fn credentials_document(expiration: OffsetDateTime) -> String {
		use time::format_description::well_known::Rfc3339;

		let expiration =
			expiration.format(&Rfc3339).expect("Expiration fixture should format as RFC3339.");

		format!(
			r#"{{"Code":"Success","Type":"AWS-HMAC","AccessKeyId":"AKIDEXAMPLE","SecretAccessKey":"wJalrXUtnFEMI","Token":"IQoJb3JpZ2luX2Vj","Expiration":"{expiration}"}}"#
		)
	}
}

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {httpmock as _, imds_credentials as _};
