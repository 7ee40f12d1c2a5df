#[cfg(test)]
pub mod fake;
pub mod os;

use self::os::HostOs;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Event list handed to `perf stat -e`.
const PERF_EVENTS: &str = "cache-misses,cache-references,instructions";

/// Jiffies-per-second unit for `/proc/stat` CPU times; 100 on Linux.
const USER_HZ: f64 = 100.0;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to query {what}: {source}")]
    Os {
        what: &'static str,
        source: std::io::Error,
    },
    #[error("unexpected {what} format: {detail}")]
    Parse { what: &'static str, detail: String },
    #[error("perf stat exited with {status}: {stderr}")]
    Tool { status: String, stderr: String },
    #[error("probe task did not complete: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub instructions: f64,
    pub miss_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct MemStats {
    pub used_percent: f64,
    pub shared_bytes: u64,
}

pub fn cpu_frequency_mhz(os: &dyn HostOs) -> Result<f64, ProbeError> {
    let report = os.cpu_info().map_err(|source| ProbeError::Os {
        what: "cpu info",
        source,
    })?;
    parse_cpu_mhz(&report)
}

pub async fn cpu_percent(os: &dyn HostOs, window: Duration) -> Result<f64, ProbeError> {
    debug!("sampling cpu percent");
    let percent = os
        .sample_cpu_percent(window)
        .await
        .map_err(|source| ProbeError::Os {
            what: "cpu utilization",
            source,
        })?;
    debug!(percent, "cpu percent sampled");
    Ok(percent)
}

pub fn user_cpu_seconds(os: &dyn HostOs) -> Result<f64, ProbeError> {
    let stats = os.kernel_stats().map_err(|source| ProbeError::Os {
        what: "kernel stats",
        source,
    })?;
    let jiffies = parse_stat_field(&stats, "cpu")?;
    Ok(jiffies as f64 / USER_HZ)
}

pub fn memory_stats(os: &dyn HostOs) -> Result<MemStats, ProbeError> {
    let meminfo = os.meminfo().map_err(|source| ProbeError::Os {
        what: "memory stats",
        source,
    })?;
    parse_meminfo(&meminfo)
}

pub fn interrupt_count(os: &dyn HostOs) -> Result<u64, ProbeError> {
    let stats = os.kernel_stats().map_err(|source| ProbeError::Os {
        what: "kernel stats",
        source,
    })?;
    parse_stat_field(&stats, "intr")
}

pub fn soft_interrupt_count(os: &dyn HostOs) -> Result<u64, ProbeError> {
    let stats = os.kernel_stats().map_err(|source| ProbeError::Os {
        what: "kernel stats",
        source,
    })?;
    parse_stat_field(&stats, "softirq")
}

pub fn process_count(os: &dyn HostOs) -> Result<u64, ProbeError> {
    let pids = os.process_ids().map_err(|source| ProbeError::Os {
        what: "process list",
        source,
    })?;
    Ok(pids.len() as u64)
}

pub async fn cache_stats(os: &dyn HostOs, window_ms: u64) -> Result<CacheStats, ProbeError> {
    debug!("running cache stats");
    let output = os.perf_stat(window_ms).await.map_err(|source| ProbeError::Os {
        what: "perf stat",
        source,
    })?;
    if !output.success {
        let status = output
            .code
            .map_or_else(|| "signal".to_string(), |code| format!("code {code}"));
        return Err(ProbeError::Tool {
            status,
            stderr: output.stderr.trim().to_string(),
        });
    }

    let misses = parse_perf_counter(&output.stderr, "cache-misses")?;
    let references = parse_perf_counter(&output.stderr, "cache-references")?;
    let instructions = parse_perf_counter(&output.stderr, "instructions")?;
    if references == 0.0 {
        return Err(ProbeError::Parse {
            what: "perf stat output",
            detail: "cache-references is zero, miss ratio is undefined".to_string(),
        });
    }

    let stats = CacheStats {
        instructions,
        miss_ratio: misses / references,
    };
    debug!(
        instructions = stats.instructions,
        miss_ratio = stats.miss_ratio,
        "cache stats done"
    );
    Ok(stats)
}

fn parse_cpu_mhz(report: &str) -> Result<f64, ProbeError> {
    for line in report.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        // Exact key: lscpu also prints "CPU max MHz" / "CPU min MHz".
        if key.trim() != "CPU MHz" {
            continue;
        }
        let value = value.trim();
        let Ok(parsed) = value.parse::<f64>() else {
            return Err(ProbeError::Parse {
                what: "cpu info",
                detail: format!("'CPU MHz' value '{value}' is not numeric"),
            });
        };
        if !parsed.is_finite() {
            return Err(ProbeError::Parse {
                what: "cpu info",
                detail: format!("'CPU MHz' value '{value}' is not finite"),
            });
        }
        return Ok(parsed);
    }

    Err(ProbeError::Parse {
        what: "cpu info",
        detail: "no 'CPU MHz' line in the report".to_string(),
    })
}

fn parse_stat_field(stats: &str, name: &str) -> Result<u64, ProbeError> {
    let Some(line) = stats
        .lines()
        .find(|line| line.split_whitespace().next() == Some(name))
    else {
        return Err(ProbeError::Parse {
            what: "kernel stats",
            detail: format!("no '{name}' line"),
        });
    };
    let Some(value) = line.split_whitespace().nth(1) else {
        return Err(ProbeError::Parse {
            what: "kernel stats",
            detail: format!("'{name}' line has no counter field"),
        });
    };
    value.parse::<u64>().map_err(|_| ProbeError::Parse {
        what: "kernel stats",
        detail: format!("'{name}' counter '{value}' is not numeric"),
    })
}

fn parse_meminfo(meminfo: &str) -> Result<MemStats, ProbeError> {
    let total = meminfo_kb(meminfo, "MemTotal")?;
    let available = meminfo_kb(meminfo, "MemAvailable")?;
    let shared = meminfo_kb(meminfo, "Shmem")?;
    if total == 0 {
        return Err(ProbeError::Parse {
            what: "memory stats",
            detail: "MemTotal is zero".to_string(),
        });
    }

    Ok(MemStats {
        used_percent: total.saturating_sub(available) as f64 / total as f64 * 100.0,
        shared_bytes: shared.saturating_mul(1024),
    })
}

fn meminfo_kb(meminfo: &str, key: &str) -> Result<u64, ProbeError> {
    for line in meminfo.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        if name.trim() != key {
            continue;
        }
        let Some(value) = rest.split_whitespace().next() else {
            return Err(ProbeError::Parse {
                what: "memory stats",
                detail: format!("'{key}' line has no value"),
            });
        };
        return value.parse::<u64>().map_err(|_| ProbeError::Parse {
            what: "memory stats",
            detail: format!("'{key}' value '{value}' is not numeric"),
        });
    }

    Err(ProbeError::Parse {
        what: "memory stats",
        detail: format!("no '{key}' line"),
    })
}

fn parse_perf_counter(output: &str, event: &str) -> Result<f64, ProbeError> {
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(position) = tokens.iter().position(|token| matches_event(token, event)) else {
            continue;
        };

        let Some(value) = position.checked_sub(1).map(|i| tokens[i]) else {
            return Err(ProbeError::Parse {
                what: "perf stat output",
                detail: format!("'{event}' line has no leading counter value"),
            });
        };
        let Some(parsed) = clean_number(value) else {
            return Err(ProbeError::Parse {
                what: "perf stat output",
                detail: format!("'{event}' counter '{value}' is not numeric"),
            });
        };
        return Ok(parsed);
    }

    Err(ProbeError::Parse {
        what: "perf stat output",
        detail: format!("no '{event}' counter line"),
    })
}

// Accepts the bare event name or a scope-suffixed one ("instructions:u").
fn matches_event(token: &str, event: &str) -> bool {
    token == event
        || token
            .strip_prefix(event)
            .map(|rest| rest.starts_with(':'))
            .unwrap_or(false)
}

// perf groups digits with commas; stray whitespace has been seen inside
// counter tokens as well.
fn clean_number(token: &str) -> Option<f64> {
    let cleaned: String = token
        .replace("\\n", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value = cleaned.parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}
