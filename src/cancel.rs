//! Cooperative stop signal shared by the CLI and the pipeline.

use std::time::Duration;
use tokio::time::sleep;

pub use tokio_util::sync::CancellationToken;

/// Sleeps for `duration` unless `cancel` fires first. Returns false when
/// the sleep was cut short.
pub async fn sleep_unless_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
