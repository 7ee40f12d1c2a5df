use crate::config::Config;
use crate::probes::{self, CacheStats, ProbeError};
use crate::probes::os::HostOs;
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("no cpu percent")]
    NoCpuPercent { source: ProbeError },
    #[error("no cache stats")]
    NoCacheStats { source: ProbeError },
    #[error("snapshot deadline of {} exceeded", humantime::format_duration(*.deadline))]
    Deadline { deadline: Duration },
}

#[derive(Debug, Clone, Serialize)]
pub struct BasicSnapshot {
    pub freq: f64,
    pub vmem: f64,
    pub cpupercent: f64,
    pub shared: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullSnapshot {
    pub freq: f64,
    #[serde(rename = "userTime")]
    pub user_time: f64,
    pub vmem: f64,
    pub cpupercent: f64,
    pub syscalls: u64,
    pub shared: u64,
    pub interrupts: u64,
    pub swinterrupts: u64,
    pub pids: u64,
    pub instructions: f64,
    #[serde(rename = "missRatio")]
    pub miss_ratio: f64,
    pub timestamp: String,
}

/// Collects the reduced snapshot: frequency, memory and utilization probes,
/// run one after another. The utilization probe blocks for its sampling
/// window.
pub async fn collect_basic(
    os: Arc<dyn HostOs>,
    cfg: &Config,
) -> Result<BasicSnapshot, SnapshotError> {
    let window = Duration::from_millis(cfg.sample_window_ms);
    match cfg.deadline_ms.map(Duration::from_millis) {
        Some(deadline) => {
            match tokio::time::timeout(deadline, assemble_basic(os, window)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(SnapshotError::Deadline { deadline }),
            }
        }
        None => assemble_basic(os, window).await,
    }
}

/// Collects the full snapshot: utilization and cache statistics run as two
/// background tasks while the six remaining probes execute sequentially;
/// the result is assembled once both tasks have reported back.
pub async fn collect_full(
    os: Arc<dyn HostOs>,
    cfg: &Config,
) -> Result<FullSnapshot, SnapshotError> {
    let started = Instant::now();
    let window = Duration::from_millis(cfg.sample_window_ms);
    let perf_window_ms = cfg.perf_window_ms;

    let cpu_task = {
        let os = os.clone();
        tokio::spawn(async move { probes::cpu_percent(os.as_ref(), window).await })
    };
    let cache_task = {
        let os = os.clone();
        tokio::spawn(async move { probes::cache_stats(os.as_ref(), perf_window_ms).await })
    };
    let cpu_abort = cpu_task.abort_handle();
    let cache_abort = cache_task.abort_handle();

    let result = match cfg.deadline_ms.map(Duration::from_millis) {
        Some(deadline) => {
            match tokio::time::timeout(deadline, assemble_full(os, cpu_task, cache_task)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(SnapshotError::Deadline { deadline }),
            }
        }
        None => assemble_full(os, cpu_task, cache_task).await,
    };

    match &result {
        Ok(_) => {
            debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "full snapshot assembled"
            );
        }
        Err(_) => {
            // A failed attempt must not leave the sampling task or the perf
            // child process running behind it.
            cpu_abort.abort();
            cache_abort.abort();
        }
    }
    result
}

async fn assemble_basic(
    os: Arc<dyn HostOs>,
    window: Duration,
) -> Result<BasicSnapshot, SnapshotError> {
    let freq = probes::cpu_frequency_mhz(os.as_ref())?;
    let mem = probes::memory_stats(os.as_ref())?;
    let cpupercent = probes::cpu_percent(os.as_ref(), window).await?;

    Ok(BasicSnapshot {
        freq,
        vmem: mem.used_percent,
        cpupercent,
        shared: mem.shared_bytes,
        timestamp: capture_timestamp(),
    })
}

async fn assemble_full(
    os: Arc<dyn HostOs>,
    cpu_task: JoinHandle<Result<f64, ProbeError>>,
    cache_task: JoinHandle<Result<CacheStats, ProbeError>>,
) -> Result<FullSnapshot, SnapshotError> {
    let freq = probes::cpu_frequency_mhz(os.as_ref())?;
    let user_time = probes::user_cpu_seconds(os.as_ref())?;
    let mem = probes::memory_stats(os.as_ref())?;
    let interrupts = probes::interrupt_count(os.as_ref())?;
    let swinterrupts = probes::soft_interrupt_count(os.as_ref())?;
    let pids = probes::process_count(os.as_ref())?;

    let (cpu_result, cache_result) = tokio::join!(cpu_task, cache_task);
    let cpupercent =
        flatten(cpu_result).map_err(|source| SnapshotError::NoCpuPercent { source })?;
    let cache = flatten(cache_result).map_err(|source| SnapshotError::NoCacheStats { source })?;

    Ok(FullSnapshot {
        freq,
        user_time,
        vmem: mem.used_percent,
        cpupercent,
        // No aggregate syscall counter exists on Linux; the field mirrors
        // the soft-interrupt count.
        syscalls: swinterrupts,
        shared: mem.shared_bytes,
        interrupts,
        swinterrupts,
        pids,
        instructions: cache.instructions,
        miss_ratio: cache.miss_ratio,
        timestamp: capture_timestamp(),
    })
}

fn flatten<T>(joined: Result<Result<T, ProbeError>, JoinError>) -> Result<T, ProbeError> {
    match joined {
        Ok(result) => result,
        Err(err) => Err(ProbeError::Task(err.to_string())),
    }
}

fn capture_timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}
