// ===============================
// src/scheduler.rs (fixed-interval task runner)
// ===============================
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::{
    task::JoinHandle,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, error, warn};

use crate::error::LedgerError;
use crate::metrics::TASK_RUNS;

/// Run `task` every `every` for the life of the process. Errors and panics
/// are logged and counted; the next tick runs regardless. No backoff.
pub fn spawn_periodic<F, Fut>(name: &'static str, every: Duration, mut task: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), LedgerError>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            match AssertUnwindSafe(task()).catch_unwind().await {
                Ok(Ok(())) => {
                    TASK_RUNS.with_label_values(&[name, "ok"]).inc();
                    debug!(task = name, "tick ok");
                }
                Ok(Err(e)) => {
                    TASK_RUNS.with_label_values(&[name, e.kind()]).inc();
                    warn!(task = name, error = %e, "tick failed");
                }
                Err(_) => {
                    TASK_RUNS.with_label_values(&[name, "panic"]).inc();
                    error!(task = name, "tick panicked");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn keeps_ticking_through_errors_and_panics() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_periodic("flaky", Duration::from_millis(5), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                match n % 3 {
                    0 => Err(LedgerError::VenueUnavailable("down".into())),
                    1 => panic!("boom"),
                    _ => Ok(()),
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!handle.is_finished());
        handle.abort();
        assert!(runs.load(Ordering::SeqCst) >= 6, "ran {} times", runs.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failing_task_does_not_stall_sibling() {
        let healthy = Arc::new(AtomicUsize::new(0));
        let h = healthy.clone();
        let bad = spawn_periodic("always_fails", Duration::from_millis(5), || async {
            Err::<(), _>(LedgerError::StoreUnavailable("nope".into()))
        });
        let good = spawn_periodic("healthy", Duration::from_millis(5), move || {
            h.fetch_add(1, Ordering::SeqCst);
            async { Ok::<(), LedgerError>(()) }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        bad.abort();
        good.abort();
        assert!(healthy.load(Ordering::SeqCst) >= 5);
    }
}
