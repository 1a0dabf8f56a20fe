#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use imds_credentials::{
	_preludet::*,
	imds::{SECURITY_CREDENTIALS_RESOURCE, TOKEN_HEADER, TOKEN_RESOURCE, TOKEN_TTL_HEADER},
};

const ROLE: &str = "test-instance-role";
const TOKEN: &str = "AQAEAGVzdC10b2tlbg";

fn role_credentials_path() -> String {
	format!("{SECURITY_CREDENTIALS_RESOURCE}{ROLE}")
}

#[tokio::test]
async fn version_2_flow_sends_the_token_on_every_fetch() {
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(PUT).path(TOKEN_RESOURCE).header(TOKEN_TTL_HEADER, "21600");
			then.status(200).body(TOKEN);
		})
		.await;
	let list_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(SECURITY_CREDENTIALS_RESOURCE).header(TOKEN_HEADER, TOKEN);
			then.status(200).body(format!("{ROLE}\n"));
		})
		.await;
	let credentials_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(role_credentials_path()).header(TOKEN_HEADER, TOKEN);
			then.status(200)
				.header("content-type", "application/json")
				.body(credentials_document(OffsetDateTime::now_utc() + Duration::hours(6)));
		})
		.await;
	let provider = test_provider_builder(&server.base_url())
		.build()
		.expect("Provider should build against the mock endpoint.");
	let credentials = provider
		.resolve_credentials()
		.await
		.expect("Version-2 resolution should succeed against the mock service.");

	token_mock.assert_async().await;
	list_mock.assert_async().await;
	credentials_mock.assert_async().await;

	assert_eq!(credentials.access_key_id(), "AKIDEXAMPLE");
	assert_eq!(credentials.secret_access_key().expose(), "wJalrXUtnFEMI");
	assert_eq!(
		credentials.session_token().map(|token| token.expose()),
		Some("IQoJb3JpZ2luX2Vj")
	);
	assert!(credentials.expiration().is_some());
}

#[tokio::test]
async fn token_failure_falls_back_to_the_tokenless_variant() {
	let server = MockServer::start_async().await;
	let _token_mock = server
		.mock_async(|when, then| {
			when.method(PUT).path(TOKEN_RESOURCE);
			then.status(404);
		})
		.await;
	// Registered first so it takes priority: any fetch that still carries a token
	// header lands here and fails the hit assertion below.
	let tokened_fetch_mock = server
		.mock_async(|when, then| {
			when.method(GET).header_exists(TOKEN_HEADER);
			then.status(500);
		})
		.await;
	let _list_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(SECURITY_CREDENTIALS_RESOURCE);
			then.status(200).body(format!("{ROLE}\n"));
		})
		.await;
	let _credentials_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(role_credentials_path());
			then.status(200)
				.body(credentials_document(OffsetDateTime::now_utc() + Duration::hours(6)));
		})
		.await;
	let provider = test_provider_builder(&server.base_url())
		.build()
		.expect("Provider should build against the mock endpoint.");
	let credentials = provider
		.resolve_credentials()
		.await
		.expect("Version-1 fallback should still resolve credentials.");

	assert_eq!(credentials.access_key_id(), "AKIDEXAMPLE");
	assert_eq!(tokened_fetch_mock.calls_async().await, 0);
}

#[tokio::test]
async fn token_rejection_fails_hard_even_with_fallback_enabled() {
	let server = MockServer::start_async().await;
	let _token_mock = server
		.mock_async(|when, then| {
			when.method(PUT).path(TOKEN_RESOURCE);
			then.status(400);
		})
		.await;
	let fetch_mock = server
		.mock_async(|when, then| {
			when.method(GET);
			then.status(200).body(format!("{ROLE}\n"));
		})
		.await;
	let provider = test_provider_builder(&server.base_url())
		.build()
		.expect("Provider should build against the mock endpoint.");
	let err = provider
		.resolve_credentials()
		.await
		.expect_err("HTTP 400 on the token request must fail the whole operation.");

	assert!(matches!(err, Error::TokenRejected));
	assert_eq!(fetch_mock.calls_async().await, 0);
}

#[tokio::test]
async fn disabled_fallback_turns_token_failures_fatal() {
	let server = MockServer::start_async().await;
	let _token_mock = server
		.mock_async(|when, then| {
			when.method(PUT).path(TOKEN_RESOURCE);
			then.status(503);
		})
		.await;
	let fetch_mock = server
		.mock_async(|when, then| {
			when.method(GET);
			then.status(200).body(format!("{ROLE}\n"));
		})
		.await;
	let provider = test_provider_builder(&server.base_url())
		.v1_fallback_disabled(true)
		.build()
		.expect("Provider should build against the mock endpoint.");
	let err = provider
		.resolve_credentials()
		.await
		.expect_err("Token failure with fallback disabled must fail the operation.");

	assert!(matches!(err, Error::FallbackDisabled { .. }));
	assert!(err.to_string().contains("AWS_EC2_METADATA_V1_DISABLED"));
	assert_eq!(fetch_mock.calls_async().await, 0);
}

#[tokio::test]
async fn empty_role_list_fails_without_fetching_credentials() {
	let server = MockServer::start_async().await;
	let _token_mock = server
		.mock_async(|when, then| {
			when.method(PUT).path(TOKEN_RESOURCE);
			then.status(200).body(TOKEN);
		})
		.await;
	let _list_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(SECURITY_CREDENTIALS_RESOURCE);
			then.status(200).body("  \n");
		})
		.await;
	// Catches the role-credentials fetch that must never happen.
	let credentials_mock = server
		.mock_async(|when, then| {
			when.method(GET).path_includes(ROLE);
			then.status(200)
				.body(credentials_document(OffsetDateTime::now_utc() + Duration::hours(6)));
		})
		.await;
	let provider = test_provider_builder(&server.base_url())
		.build()
		.expect("Provider should build against the mock endpoint.");
	let err = provider
		.resolve_credentials()
		.await
		.expect_err("An empty role list must fail with the no-credentials-path error.");

	assert!(matches!(err, Error::NoCredentialsPath));
	assert_eq!(credentials_mock.calls_async().await, 0);
}

#[tokio::test]
async fn role_list_failure_surfaces_the_status() {
	let server = MockServer::start_async().await;
	let _token_mock = server
		.mock_async(|when, then| {
			when.method(PUT).path(TOKEN_RESOURCE);
			then.status(200).body(TOKEN);
		})
		.await;
	let _list_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(SECURITY_CREDENTIALS_RESOURCE);
			then.status(503);
		})
		.await;
	let provider = test_provider_builder(&server.base_url())
		.build()
		.expect("Provider should build against the mock endpoint.");
	let err = provider
		.resolve_credentials()
		.await
		.expect_err("A failing role list must surface as an unexpected-status error.");

	assert!(matches!(err, Error::UnexpectedStatus { status: 503, .. }));
}
