//! Optional observability helpers for refresh activity.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `imds_credentials.refresh` with the
//!   `source` (blocking vs. prefetch) and `supplier` fields.
//! - Enable `metrics` to increment the `imds_credentials_refresh_total` counter for
//!   every attempt/success/failure/stale-serve, labeled by `source` + `status`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Refresh entry points observed by the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshSource {
	/// Foreground refresh that blocks the calling task.
	Blocking,
	/// Background refresh issued by the prefetch worker.
	Prefetch,
}
impl RefreshSource {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshSource::Blocking => "blocking",
			RefreshSource::Prefetch => "prefetch",
		}
	}
}
impl Display for RefreshSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Status labels recorded for each refresh attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshStatus {
	/// Entry to a refresh path.
	Attempt,
	/// The refresh function produced a new value.
	Success,
	/// The refresh function failed and the failure was propagated.
	Failure,
	/// The refresh function failed and the previous value was served instead.
	StaleServed,
}
impl RefreshStatus {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshStatus::Attempt => "attempt",
			RefreshStatus::Success => "success",
			RefreshStatus::Failure => "failure",
			RefreshStatus::StaleServed => "stale_served",
		}
	}
}
impl Display for RefreshStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
