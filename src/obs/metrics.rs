// self
use crate::obs::{RefreshSource, RefreshStatus};

/// Records a refresh status via the global metrics recorder (when enabled).
pub fn record_refresh_status(source: RefreshSource, status: RefreshStatus) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"imds_credentials_refresh_total",
			"source" => source.as_str(),
			"status" => status.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (source, status);
	}
}
