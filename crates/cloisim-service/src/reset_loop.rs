//! Simulation side of the reset latch.

use std::sync::Arc;
use std::time::Duration;

use cloisim_core::ResetLatch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Poll `latch` every `tick`, running `on_reset` for each accepted trigger
/// with the latch held in the resetting state. Returns the number of resets
/// performed once `shutdown` fires.
pub async fn run<F>(
    latch: Arc<ResetLatch>,
    tick: Duration,
    shutdown: CancellationToken,
    mut on_reset: F,
) -> u64
where
    F: FnMut() + Send,
{
    let mut interval = tokio::time::interval(tick);
    let mut resets = 0;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if !latch.take_trigger() {
                    continue;
                }
                latch.begin_reset();
                info!("simulation reset started");
                on_reset();
                latch.finish_reset();
                resets += 1;
                info!(resets, "simulation reset finished");
            }
        }
    }
    resets
}
