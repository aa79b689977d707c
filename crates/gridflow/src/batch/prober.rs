use std::sync::Arc;

use tokio::sync::mpsc;

use crate::batch::pool::SharedServicePool;
use crate::batch::service::{BatchService, ServiceKind};
use crate::common::error::{internal_error, GridError};

/// Concurrently probes `candidates` and fills `pool` with the subset that
/// answered the availability test.
///
/// One probe task is spawned per candidate; each task reports its outcome on
/// a shared queue and inserts its service into the pool on success. The
/// caller is unblocked as soon as the pool holds at least one live service,
/// or once every probe has reported. Stragglers keep running after the caller
/// has proceeded and their positive results are still inserted if the pool is
/// under its threshold.
pub async fn probe_into_pool<S>(
    kind: ServiceKind,
    candidates: Vec<Arc<S>>,
    pool: &SharedServicePool<S>,
) -> crate::Result<()>
where
    S: BatchService + ?Sized + 'static,
{
    let total = candidates.len();
    if total == 0 {
        log::warn!("There is no {kind} candidate to probe");
        return Err(GridError::NoServiceAvailable(kind));
    }

    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    for service in candidates {
        let report_tx = report_tx.clone();
        let pool = pool.clone();
        tokio::spawn(async move {
            let alive = service.test().await;
            if alive {
                pool.insert(service.clone());
            }
            let _ = report_tx.send((service.name().to_string(), alive));
        });
    }
    drop(report_tx);

    let mut in_flight = total;
    while in_flight > 0 && pool.is_empty() {
        match report_rx.recv().await {
            Some((name, alive)) => {
                in_flight -= 1;
                log::debug!("Probe of {kind} {name} finished: alive={alive}");
            }
            None => {
                return internal_error(format!("probing of {kind} candidates aborted early"));
            }
        }
    }

    if pool.is_empty() {
        log::warn!("None of the {total} probed {kind} candidates is available");
        Err(GridError::NoServiceAvailable(kind))
    } else {
        Ok(())
    }
}
