//! Core engine: confirm breakouts, record them, track their outcomes.

pub mod confirmation;
pub mod scanner;
pub mod tracker;

use std::time::Duration;
use tokio::sync::watch;

/// Sleep for `delay` unless shutdown is signalled first.
///
/// Returns `true` when the full delay elapsed, `false` on shutdown. A
/// dropped sender can no longer signal, so the sleep then runs to the end.
pub(crate) async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        if *shutdown.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    (&mut sleep).await;
                    return true;
                }
            }
        }
    }
}
