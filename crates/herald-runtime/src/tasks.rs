//! Process-wide background tasks
//!
//! Two detached loops run beside the supervisor: the periodic event-cache
//! flush and the resident-memory watchdog. Both are owned by the caller
//! through their `JoinHandle` and stop when the shutdown token fires; the
//! flush task writes one final snapshot on the way out.

use crate::store::cache::EventCache;
use herald_core::config::{CacheConfig, MemoryConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

// ----------------------------------------------------------------------------
// Cache Flush
// ----------------------------------------------------------------------------

/// Periodically checkpoint the event cache to disk.
///
/// A failed flush is logged and retried on the next tick; the in-memory
/// cache stays authoritative either way.
pub fn spawn_cache_flush(
    cache: Arc<EventCache>,
    config: CacheConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.flush_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; skip it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = cache.flush().await {
                        warn!(error = %e, "event cache flush failed");
                    }
                }
            }
        }

        if let Err(e) = cache.flush().await {
            warn!(error = %e, "final event cache flush failed");
        } else {
            debug!("final event cache flush complete");
        }
    })
}

// ----------------------------------------------------------------------------
// Memory Watchdog
// ----------------------------------------------------------------------------

/// Source of resident-memory samples.
pub trait MemorySampler: Send + Sync + 'static {
    /// Current resident set size in bytes, if it can be read.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads `VmRSS` from `/proc/self/status`. Returns `None` on platforms
/// without procfs, which disables the watchdog.
pub struct ProcStatusSampler;

impl ProcStatusSampler {
    fn parse_vm_rss(status: &str) -> Option<u64> {
        status
            .lines()
            .find(|line| line.starts_with("VmRSS:"))?
            .split_whitespace()
            .nth(1)?
            .parse::<u64>()
            .ok()
            .map(|kb| kb * 1024)
    }
}

impl MemorySampler for ProcStatusSampler {
    fn resident_bytes(&self) -> Option<u64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        Self::parse_vm_rss(&status)
    }
}

/// Watch resident memory and report a breach once.
///
/// The watchdog only detects; the caller decides what a breach means (the
/// binary exits non-zero so a process manager restarts it fresh).
pub fn spawn_memory_watchdog<S: MemorySampler>(
    sampler: S,
    config: MemoryConfig,
    shutdown: CancellationToken,
    breach: mpsc::Sender<u64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.check_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(rss) = sampler.resident_bytes() else {
                        debug!("memory sample unavailable, watchdog idle");
                        continue;
                    };
                    if rss > config.max_rss_bytes {
                        error!(
                            rss_bytes = rss,
                            limit_bytes = config.max_rss_bytes,
                            "resident memory limit exceeded"
                        );
                        let _ = breach.send(rss).await;
                        break;
                    }
                    debug!(rss_bytes = rss, "memory sample ok");
                }
            }
        }
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
