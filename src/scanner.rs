use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ::time::{format_description::well_known, OffsetDateTime};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScanOptions;
use crate::error::ScanError;
use crate::probe;
use crate::types::{PortDetail, ScanOutcome, ScanRequest, ScanResult};

/// Scan every port in the request's inclusive range and return the open ones.
///
/// - Validates the request before touching the network.
/// - Spawns one task per port; a `Semaphore` caps how many dial at once.
/// - Open ports are appended to a shared `Mutex<Vec<_>>` as their probes finish.
/// - Races the join loop against `options.deadline`. When the deadline wins the
///   scan returns what it has so far and in-flight probes are cancelled.
pub async fn run_scan(request: &ScanRequest, options: &ScanOptions) -> Result<ScanResult, ScanError> {
    run_scan_internal(request, options, None, None).await
}

/// Variant that accepts a `CancellationToken` to allow external cancellation.
pub async fn run_scan_with_cancel(
    request: &ScanRequest,
    options: &ScanOptions,
    cancel: CancellationToken,
) -> Result<ScanResult, ScanError> {
    run_scan_internal(request, options, Some(cancel), None).await
}

/// Variant that also reports admission counters through `stats`.
pub async fn run_scan_with_stats(
    request: &ScanRequest,
    options: &ScanOptions,
    cancel: CancellationToken,
    stats: ScanStats,
) -> Result<ScanResult, ScanError> {
    run_scan_internal(request, options, Some(cancel), Some(stats)).await
}

/// Live counters for one scan. Cheap to clone; all clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct ScanStats {
    /// Probe tasks created.
    pub spawned: Arc<AtomicU64>,
    /// Probes currently holding an admission slot.
    pub in_flight: Arc<AtomicU64>,
    /// Highest value `in_flight` reached.
    pub max_in_flight: Arc<AtomicU64>,
    /// Probes that ran to completion, open or not.
    pub completed: Arc<AtomicU64>,
    pub open: Arc<AtomicU64>,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> u64 {
        self.open.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight {
            in_flight: self.in_flight.clone(),
        }
    }
}

/// Decrements the in-flight counter when a probe ends, including when its task is aborted.
struct InFlight {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_scan_internal(
    request: &ScanRequest,
    options: &ScanOptions,
    cancel_opt: Option<CancellationToken>,
    stats_opt: Option<ScanStats>,
) -> Result<ScanResult, ScanError> {
    let range = request.validate()?;
    let target = request.target.trim().to_string();
    let started = Instant::now();

    let addrs: Arc<[IpAddr]> = Arc::from(resolve_once(&target, options.connect_timeout).await);
    let stats = stats_opt.unwrap_or_default();
    let entries: Arc<Mutex<Vec<PortDetail>>> = Arc::new(Mutex::new(Vec::new()));
    let sem = Arc::new(Semaphore::new(options.effective_concurrency()));
    let cancel = cancel_opt.map(|c| c.child_token()).unwrap_or_default();
    let opts = *options;

    info!(
        host = %target,
        start = *range.start(),
        end = *range.end(),
        concurrency = opts.effective_concurrency(),
        "scan started"
    );

    let mut set = JoinSet::new();
    for port in range {
        let sem = sem.clone();
        let entries = entries.clone();
        let stats = stats.clone();
        let cancel = cancel.clone();
        let addrs = addrs.clone();

        stats.spawned.fetch_add(1, Ordering::SeqCst);
        set.spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                permit = sem.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // Closed when the scan is abandoned.
                    Err(_) => return,
                },
            };
            // Declared after the permit so it drops first.
            let _in_flight = stats.enter();

            let detail = probe::probe(&addrs, port, &opts, &cancel).await;
            if let Some(detail) = detail {
                stats.open.fetch_add(1, Ordering::SeqCst);
                entries.lock().await.push(detail);
            }
            stats.completed.fetch_add(1, Ordering::SeqCst);
        });
    }

    let outcome = tokio::select! {
        _ = drain(&mut set) => ScanOutcome::Completed,
        _ = time::sleep_until(started + opts.deadline) => ScanOutcome::TimedOut,
        _ = cancel.cancelled() => ScanOutcome::Cancelled,
    };

    if outcome != ScanOutcome::Completed {
        cancel.cancel();
        sem.close();
        set.abort_all();
        debug!(host = %target, outstanding = set.len(), ?outcome, "abandoning in-flight probes");
    }
    drop(set);

    let ports = std::mem::take(&mut *entries.lock().await);
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        host = %target,
        open = ports.len(),
        elapsed_ms,
        ?outcome,
        "scan finished"
    );

    Ok(ScanResult {
        target,
        geoip: None,
        ports,
        scanned_at: now_rfc3339(),
        elapsed_ms,
        outcome,
    })
}

async fn drain(set: &mut JoinSet<()>) {
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                warn!(error = %e, "probe task panicked");
            }
        }
    }
}

/// Resolve a hostname once per scan so probes dial addresses instead of
/// re-resolving per port. Every address is kept, in resolver order, so a
/// dual-stack name still reaches a service bound to only one family. An empty
/// list means the name did not resolve and every port reports unreachable.
async fn resolve_once(target: &str, timeout: Duration) -> Vec<IpAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return vec![ip];
    }
    match time::timeout(timeout, tokio::net::lookup_host((target, 0))).await {
        Ok(Ok(found)) => {
            let mut ips: Vec<IpAddr> = Vec::new();
            for addr in found {
                if !ips.contains(&addr.ip()) {
                    ips.push(addr.ip());
                }
            }
            debug!(host = target, ips = ?ips, "resolved target");
            ips
        }
        Ok(Err(e)) => {
            debug!(host = target, error = %e, "target did not resolve");
            Vec::new()
        }
        Err(_) => {
            debug!(host = target, "target resolution timed out");
            Vec::new()
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
