//! Prefetch strategies controlling when the cache refreshes ahead of staleness.
//!
//! The non-blocking strategy runs one named background task per supplier. The task
//! sleeps until the slot's prefetch instant (or an idle poll interval when none is
//! scheduled), refreshes through the same exclusive refresh right as foreground
//! callers, and reschedules with a short backoff after a failure. It exits promptly
//! when the owning supplier is closed or dropped.

// std
use std::{sync::Weak, time::Duration as StdDuration};
// crates.io
use tokio::{
	sync::{Notify, watch},
	task::JoinHandle,
};
// self
use crate::{_prelude::*, cache::SupplierState};

/// Poll interval used while no prefetch instant is scheduled.
const IDLE_POLL: StdDuration = StdDuration::from_secs(60);
/// Delay before retrying after a failed background refresh.
const FAILURE_BACKOFF: StdDuration = StdDuration::from_secs(30);

/// Strategy deciding how the cache refreshes before staleness is reached.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PrefetchStrategy {
	/// No background work; every stale read blocks the calling task on the refresh.
	#[default]
	OneCallerBlocks,
	/// A dedicated background task refreshes proactively at the prefetch instant.
	NonBlocking {
		/// Human-readable worker name carried into spans and logs.
		worker_name: String,
	},
}
impl PrefetchStrategy {
	/// Convenience constructor for the non-blocking strategy.
	pub fn non_blocking(worker_name: impl Into<String>) -> Self {
		Self::NonBlocking { worker_name: worker_name.into() }
	}
}

/// Handle to the spawned background refresh task.
pub(crate) struct PrefetchWorker {
	shutdown: watch::Sender<bool>,
	handle: JoinHandle<()>,
}
impl PrefetchWorker {
	/// Spawns the worker over a weak reference so the task never keeps the supplier
	/// alive on its own.
	pub(crate) fn spawn<T>(state: &Arc<SupplierState<T>>, worker_name: String) -> Self
	where
		T: 'static + Clone + Send + Sync,
	{
		let (shutdown, shutdown_rx) = watch::channel(false);
		let handle =
			tokio::spawn(run(Arc::downgrade(state), worker_name, state.wake.clone(), shutdown_rx));

		Self { shutdown, handle }
	}

	/// Signals the worker to stop accepting work and exit.
	///
	/// The signal is cooperative: a refresh that is already in flight completes
	/// normally and its result is still installed.
	pub(crate) fn shutdown(self) {
		if self.shutdown.send(true).is_err() {
			// The task is already gone; only the handle remains.
			self.handle.abort();
		}
	}
}

async fn run<T>(
	state: Weak<SupplierState<T>>,
	worker_name: String,
	wake: Arc<Notify>,
	mut shutdown: watch::Receiver<bool>,
) where
	T: Clone,
{
	let mut backoff = None;

	loop {
		let wait = match state.upgrade() {
			Some(strong) => backoff
				.take()
				.or_else(|| strong.time_until_prefetch(OffsetDateTime::now_utc()))
				.unwrap_or(IDLE_POLL),
			None => break,
		};

		tokio::select! {
			_ = shutdown.changed() => break,
			_ = wake.notified() => {},
			_ = tokio::time::sleep(wait) => {},
		}

		if *shutdown.borrow() {
			break;
		}

		let Some(strong) = state.upgrade() else {
			break;
		};

		if !strong.prefetch_due(OffsetDateTime::now_utc()) {
			continue;
		}
		if let Err(_e) = strong.refresh_prefetch().await {
			#[cfg(feature = "tracing")]
			tracing::warn!(
				worker = %worker_name,
				supplier = %strong.worker_label(),
				error = %_e,
				"Background refresh failed; retrying after backoff.",
			);

			backoff = Some(FAILURE_BACKOFF);
		}
	}

	#[cfg(feature = "tracing")]
	tracing::debug!(worker = %worker_name, "Prefetch worker stopped.");
	#[cfg(not(feature = "tracing"))]
	let _ = worker_name;
}
