#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use imds_credentials::{
	_preludet::*,
	cache::StaleValuePolicy,
	imds::{SECURITY_CREDENTIALS_RESOURCE, TOKEN_RESOURCE},
};

const ROLE: &str = "test-instance-role";
const TOKEN: &str = "AQAEAGVzdC10b2tlbg";

async fn mock_happy_path(server: &MockServer, expiration: OffsetDateTime) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(PUT).path(TOKEN_RESOURCE);
			then.status(200).body(TOKEN);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path(SECURITY_CREDENTIALS_RESOURCE);
			then.status(200).body(format!("{ROLE}\n"));
		})
		.await;

	server
		.mock_async(|when, then| {
			when.method(GET).path(format!("{SECURITY_CREDENTIALS_RESOURCE}{ROLE}"));
			then.status(200).body(credentials_document(expiration));
		})
		.await
}

#[tokio::test]
async fn fresh_credentials_are_cached_across_resolutions() {
	let server = MockServer::start_async().await;
	let credentials_mock =
		mock_happy_path(&server, OffsetDateTime::now_utc() + Duration::hours(6)).await;
	let provider = test_provider_builder(&server.base_url())
		.build()
		.expect("Provider should build against the mock endpoint.");
	let first = provider.resolve_credentials().await.expect("First resolution should succeed.");
	let second =
		provider.resolve_credentials().await.expect("Second resolution should hit the cache.");

	assert_eq!(first, second);
	// One refresh cycle total: the second resolution performed no HTTP work.
	assert_eq!(credentials_mock.calls_async().await, 1);
	assert_eq!(provider.metrics().attempts(), 1);
}

#[tokio::test]
async fn outage_past_staleness_serves_the_previous_value() {
	let server = MockServer::start_async().await;
	let credentials_mock =
		mock_happy_path(&server, OffsetDateTime::now_utc() + Duration::hours(6)).await;
	// A stale buffer larger than the credential lifetime forces every resolution to
	// attempt a refresh.
	let provider = test_provider_builder(&server.base_url())
		.stale_buffer(Duration::hours(7))
		.build()
		.expect("Provider should build against the mock endpoint.");
	let first = provider.resolve_credentials().await.expect("First resolution should succeed.");

	// Take the role-credentials resource down; the next refresh attempt fails.
	credentials_mock.delete_async().await;

	let second = provider
		.resolve_credentials()
		.await
		.expect("Stale credentials should be served when the refresh fails.");

	assert_eq!(first, second);
	assert_eq!(provider.metrics().stale_served(), 1);
}

#[tokio::test]
async fn strict_policy_surfaces_the_outage_instead() {
	let server = MockServer::start_async().await;
	let credentials_mock =
		mock_happy_path(&server, OffsetDateTime::now_utc() + Duration::hours(6)).await;
	let provider = test_provider_builder(&server.base_url())
		.stale_buffer(Duration::hours(7))
		.stale_value_policy(StaleValuePolicy::Strict)
		.build()
		.expect("Provider should build against the mock endpoint.");

	provider.resolve_credentials().await.expect("First resolution should succeed.");
	credentials_mock.delete_async().await;

	let err = provider
		.resolve_credentials()
		.await
		.expect_err("Strict policy must surface the refresh failure.");

	assert!(matches!(err, Error::UnexpectedStatus { .. }));
}

#[tokio::test]
async fn empty_cache_propagates_the_refresh_failure() {
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
			then.status(500);
		})
		.await;
	let provider = test_provider_builder(&server.base_url())
		.build()
		.expect("Provider should build against the mock endpoint.");
	let err = provider
		.resolve_credentials()
		.await
		.expect_err("With no cached value the refresh failure must surface.");

	assert!(matches!(err, Error::UnexpectedStatus { status: 500, .. }));
}

#[tokio::test]
async fn async_refresh_provider_resolves_and_closes_cleanly() {
	let server = MockServer::start_async().await;
	let _credentials_mock =
		mock_happy_path(&server, OffsetDateTime::now_utc() + Duration::hours(6)).await;
	let provider = test_provider_builder(&server.base_url())
		.async_refresh_enabled(true)
		.worker_name("provider-cache-it-worker")
		.build()
		.expect("Async-refresh provider should build inside the tokio runtime.");

	provider.resolve_credentials().await.expect("Resolution should succeed with a worker.");
	provider.close();
	// Close only stops the background worker; foreground resolution still works.
	provider.resolve_credentials().await.expect("Resolution should still work after close.");
}
