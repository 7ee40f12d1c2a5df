use std::fs;
use std::io;
use std::process::Command;
use std::time::Duration;
use sysinfo::{CpuExt, PidExt, System, SystemExt};

/// Captured output of the performance-counter tool. perf prints the
/// counters on stderr; stdout stays empty.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stderr: String,
}

/// Boundary between the probes and the operating system, one method per
/// external collaborator. Tests substitute a scripted implementation.
#[async_trait::async_trait]
pub trait HostOs: Send + Sync {
    /// Tabular `key: value` CPU report as printed by `lscpu`.
    fn cpu_info(&self) -> io::Result<String>;
    /// Raw kernel statistics text (`/proc/stat`).
    fn kernel_stats(&self) -> io::Result<String>;
    /// Raw memory statistics text (`/proc/meminfo`).
    fn meminfo(&self) -> io::Result<String>;
    /// Utilization over `window`, averaged across all cores, in percent.
    async fn sample_cpu_percent(&self, window: Duration) -> io::Result<f64>;
    /// Identifiers of the currently running processes.
    fn process_ids(&self) -> io::Result<Vec<u32>>;
    /// Runs the performance-counter tool for `window_ms` milliseconds and
    /// captures its diagnostic output.
    async fn perf_stat(&self, window_ms: u64) -> io::Result<ToolOutput>;
}

/// Production facade backed by `lscpu`, `/proc` pseudo-files, sysinfo and
/// `perf`.
#[derive(Debug, Default)]
pub struct SystemOs;

impl SystemOs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl HostOs for SystemOs {
    fn cpu_info(&self) -> io::Result<String> {
        let output = Command::new("lscpu").output()?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("lscpu exited with {}", output.status),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn kernel_stats(&self) -> io::Result<String> {
        fs::read_to_string("/proc/stat")
    }

    fn meminfo(&self) -> io::Result<String> {
        fs::read_to_string("/proc/meminfo")
    }

    async fn sample_cpu_percent(&self, window: Duration) -> io::Result<f64> {
        // Two refreshes separated by the window; sysinfo reports usage
        // relative to the previous refresh.
        let mut system = System::new();
        system.refresh_cpu();
        tokio::time::sleep(window).await;
        system.refresh_cpu();

        if system.cpus().is_empty() {
            return Ok(0.0);
        }
        let sum: f32 = system.cpus().iter().map(|c| c.cpu_usage()).sum();
        Ok((sum / system.cpus().len() as f32) as f64)
    }

    fn process_ids(&self) -> io::Result<Vec<u32>> {
        let mut system = System::new();
        system.refresh_processes();
        Ok(system.processes().keys().map(|pid| pid.as_u32()).collect())
    }

    async fn perf_stat(&self, window_ms: u64) -> io::Result<ToolOutput> {
        let window = window_ms.to_string();
        let output = tokio::process::Command::new("perf")
            .args(["stat", "--time", window.as_str(), "-e", super::PERF_EVENTS])
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
