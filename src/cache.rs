//! Generic single-flight refresh cache for expensive, expiring values.
//!
//! A [`CachedSupplier`] serves one logical value to unlimited concurrent readers while
//! guaranteeing at most one concurrent execution of the refresh operation. Per read it
//! decides whether to serve the cached value as-is, serve it while nudging the
//! background prefetch worker, or block the caller for a synchronous refresh. When a
//! refresh fails past staleness, the configured [`StaleValuePolicy`] decides between
//! serving the last-known-good value and propagating the failure.

pub mod prefetch;
pub use prefetch::PrefetchStrategy;

mod metrics;
pub use metrics::RefreshMetrics;

// std
use std::time::Duration as StdDuration;
// crates.io
use rand::Rng;
use tokio::sync::Notify;
// self
use crate::{
	_prelude::*,
	cache::prefetch::PrefetchWorker,
	error::ConfigError,
	obs::{self, RefreshSource, RefreshSpan, RefreshStatus},
};

/// Boxed future returned by [`Refresh::refresh`].
pub type RefreshFuture<'a, T> = Pin<Box<dyn Future<Output = Result<RefreshOutcome<T>>> + 'a + Send>>;

/// Refresh-function contract consumed by [`CachedSupplier`].
pub trait Refresh<T>
where
	Self: Send + Sync,
{
	/// Produces a fresh value together with its scheduling instants.
	fn refresh(&self) -> RefreshFuture<'_, T>;
}

/// A refreshed value plus the instants that drive the cache's scheduling math.
#[derive(Clone, Debug)]
pub struct RefreshOutcome<T> {
	/// The refreshed value.
	pub value: T,
	/// Instant after which the value must no longer be served without a refresh
	/// attempt. Absent means the value never goes stale by time.
	pub stale_time: Option<OffsetDateTime>,
	/// Instant at which a background refresh should be attempted proactively. Absent
	/// means the value is never refreshed proactively.
	pub prefetch_time: Option<OffsetDateTime>,
}
impl<T> RefreshOutcome<T> {
	/// Creates an outcome with no scheduling instants.
	pub fn new(value: T) -> Self {
		Self { value, stale_time: None, prefetch_time: None }
	}

	/// Sets the staleness instant.
	pub fn with_stale_time(mut self, instant: Option<OffsetDateTime>) -> Self {
		self.stale_time = instant;

		self
	}

	/// Sets the prefetch instant.
	pub fn with_prefetch_time(mut self, instant: Option<OffsetDateTime>) -> Self {
		self.prefetch_time = instant;

		self
	}

	/// Returns `true` once the staleness instant has been reached.
	pub fn is_stale_at(&self, instant: OffsetDateTime) -> bool {
		self.stale_time.is_some_and(|stale| instant >= stale)
	}

	/// Returns `true` once the prefetch instant has been reached.
	pub fn is_prefetch_due_at(&self, instant: OffsetDateTime) -> bool {
		self.prefetch_time.is_some_and(|prefetch| instant >= prefetch)
	}
}

/// Policy applied when a refresh fails and a previously cached value exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StaleValuePolicy {
	/// Serve the last-known-good value and only log the failure.
	#[default]
	Allow,
	/// Always propagate the failure once staleness has been reached.
	Strict,
}

/// Serves a single cached value with single-flight refresh coordination.
pub struct CachedSupplier<T> {
	state: Arc<SupplierState<T>>,
	worker: Mutex<Option<PrefetchWorker>>,
}
impl<T> CachedSupplier<T>
where
	T: 'static + Clone + Send + Sync,
{
	/// Returns a builder over the provided refresh function.
	pub fn builder(refresh: Arc<dyn Refresh<T>>) -> CachedSupplierBuilder<T> {
		CachedSupplierBuilder {
			refresh,
			name: "cached-value".into(),
			policy: StaleValuePolicy::default(),
			strategy: PrefetchStrategy::default(),
		}
	}

	/// Returns the cached value, refreshing it first if it is absent or stale.
	pub async fn get(&self) -> Result<T> {
		self.get_at(OffsetDateTime::now_utc()).await
	}

	/// Variant of [`get`](Self::get) that evaluates freshness against an explicit
	/// instant.
	pub async fn get_at(&self, now: OffsetDateTime) -> Result<T> {
		if let Some(value) = self.state.read_fresh(now) {
			// Fresh reads never block; at most they nudge the background worker.
			if self.state.prefetch_due(now) {
				self.state.wake.notify_one();
			}

			return Ok(value);
		}

		self.state.refresh_blocking(now).await
	}

	/// Returns the refresh counters maintained by this supplier.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.state.metrics
	}

	/// Stops the background prefetch worker, if one is running.
	///
	/// Foreground reads keep working after close; only proactive refreshing stops.
	pub fn close(&self) {
		if let Some(worker) = self.worker.lock().take() {
			worker.shutdown();
		}
	}
}

/// Builder for [`CachedSupplier`].
pub struct CachedSupplierBuilder<T> {
	refresh: Arc<dyn Refresh<T>>,
	name: String,
	policy: StaleValuePolicy,
	strategy: PrefetchStrategy,
}
impl<T> CachedSupplierBuilder<T>
where
	T: 'static + Clone + Send + Sync,
{
	/// Names the cached value for spans and worker logs.
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = name.into();

		self
	}

	/// Selects the stale-value policy (defaults to [`StaleValuePolicy::Allow`]).
	pub fn stale_value_policy(mut self, policy: StaleValuePolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Selects the prefetch strategy (defaults to
	/// [`PrefetchStrategy::OneCallerBlocks`]).
	pub fn prefetch_strategy(mut self, strategy: PrefetchStrategy) -> Self {
		self.strategy = strategy;

		self
	}

	/// Builds the supplier, spawning the background worker when the non-blocking
	/// strategy is selected. Spawning requires an ambient tokio runtime.
	pub fn build(self) -> Result<CachedSupplier<T>, ConfigError> {
		let state = Arc::new(SupplierState {
			refresh: self.refresh,
			slot: RwLock::new(None),
			refresh_right: AsyncMutex::new(()),
			policy: self.policy,
			name: self.name,
			metrics: RefreshMetrics::default(),
			wake: Arc::new(Notify::new()),
		});
		let worker = match self.strategy {
			PrefetchStrategy::OneCallerBlocks => None,
			PrefetchStrategy::NonBlocking { worker_name } => {
				if worker_name.is_empty() {
					return Err(ConfigError::MissingWorkerName);
				}

				Some(PrefetchWorker::spawn(&state, worker_name))
			},
		};

		Ok(CachedSupplier { state, worker: Mutex::new(worker) })
	}
}

/// Shared cache state: the slot plus the exclusive refresh right.
///
/// All slot access (current-value reads, staleness checks, installs) goes through this
/// struct, for foreground callers and the prefetch worker alike.
pub(crate) struct SupplierState<T> {
	refresh: Arc<dyn Refresh<T>>,
	slot: RwLock<Option<RefreshOutcome<T>>>,
	refresh_right: AsyncMutex<()>,
	policy: StaleValuePolicy,
	name: String,
	metrics: RefreshMetrics,
	// Signaled on every install and on due reads so the prefetch worker can recompute
	// its sleep; harmless when no worker is listening.
	pub(crate) wake: Arc<Notify>,
}
impl<T> SupplierState<T>
where
	T: Clone,
{
	fn read_fresh(&self, now: OffsetDateTime) -> Option<T> {
		self.slot
			.read()
			.as_ref()
			.and_then(|outcome| (!outcome.is_stale_at(now)).then(|| outcome.value.clone()))
	}

	pub(crate) fn prefetch_due(&self, now: OffsetDateTime) -> bool {
		self.slot.read().as_ref().is_some_and(|outcome| outcome.is_prefetch_due_at(now))
	}

	pub(crate) fn time_until_prefetch(&self, now: OffsetDateTime) -> Option<StdDuration> {
		let slot = self.slot.read();
		let prefetch_time = slot.as_ref()?.prefetch_time?;

		Some(StdDuration::try_from(prefetch_time - now).unwrap_or(StdDuration::ZERO))
	}

	#[cfg(feature = "tracing")]
	pub(crate) fn worker_label(&self) -> &str {
		&self.name
	}

	fn install(&self, outcome: RefreshOutcome<T>) {
		*self.slot.write() = Some(outcome);

		self.wake.notify_one();
	}

	async fn refresh_blocking(&self, now: OffsetDateTime) -> Result<T> {
		let _right = self.refresh_right.lock().await;

		// A caller that queued behind an in-flight refresh joins its result here
		// instead of issuing a second network call.
		if let Some(value) = self.read_fresh(now) {
			return Ok(value);
		}

		let span = RefreshSpan::new(RefreshSource::Blocking, &self.name);

		self.metrics.record_attempt();
		obs::record_refresh_status(RefreshSource::Blocking, RefreshStatus::Attempt);

		match span.instrument(self.refresh.refresh()).await {
			Ok(outcome) => {
				self.metrics.record_success();
				obs::record_refresh_status(RefreshSource::Blocking, RefreshStatus::Success);

				let value = outcome.value.clone();

				self.install(outcome);

				Ok(value)
			},
			Err(e) => {
				self.metrics.record_failure();
				obs::record_refresh_status(RefreshSource::Blocking, RefreshStatus::Failure);

				self.serve_stale(e, now)
			},
		}
	}

	pub(crate) async fn refresh_prefetch(&self) -> Result<()> {
		let _right = self.refresh_right.lock().await;
		let now = OffsetDateTime::now_utc();

		// A foreground refresh may have landed while this task waited for the right.
		if !self.prefetch_due(now) && self.read_fresh(now).is_some() {
			return Ok(());
		}

		let span = RefreshSpan::new(RefreshSource::Prefetch, &self.name);

		self.metrics.record_attempt();
		obs::record_refresh_status(RefreshSource::Prefetch, RefreshStatus::Attempt);

		match span.instrument(self.refresh.refresh()).await {
			Ok(outcome) => {
				self.metrics.record_success();
				obs::record_refresh_status(RefreshSource::Prefetch, RefreshStatus::Success);
				self.install(outcome);

				Ok(())
			},
			Err(e) => {
				self.metrics.record_failure();
				obs::record_refresh_status(RefreshSource::Prefetch, RefreshStatus::Failure);

				// The existing value stays in place; staleness handling remains with the
				// foreground path.
				Err(e)
			},
		}
	}

	fn serve_stale(&self, error: Error, now: OffsetDateTime) -> Result<T> {
		if self.policy == StaleValuePolicy::Strict {
			return Err(error);
		}

		let mut slot = self.slot.write();
		let Some(outcome) = slot.as_mut() else {
			return Err(error);
		};

		// Push staleness out by a small jittered window so a herd of stale readers
		// does not re-attempt the refresh on every call.
		outcome.stale_time = Some(now + stale_retry_backoff());

		self.metrics.record_stale_served();
		obs::record_refresh_status(RefreshSource::Blocking, RefreshStatus::StaleServed);

		#[cfg(feature = "tracing")]
		tracing::warn!(
			supplier = %self.name,
			error = %error,
			"Refresh failed; serving the previous value.",
		);

		Ok(outcome.value.clone())
	}
}

fn stale_retry_backoff() -> Duration {
	Duration::seconds(rand::rng().random_range(1..=10))
}
