use super::os::{HostOs, ToolOutput};
use std::io;
use std::time::Duration;

pub const LSCPU: &str = "\
Architecture:                    x86_64
CPU op-mode(s):                  32-bit, 64-bit
CPU(s):                          8
Thread(s) per core:              2
Model name:                      Intel(R) Core(TM) i7-10510U CPU @ 1.80GHz
CPU MHz:                         2400.000
CPU max MHz:                     4900.0000
CPU min MHz:                     400.0000
BogoMIPS:                        4599.93
";

pub const PROC_STAT: &str = "\
cpu  4705 150 1120 1048938 1217 0 308 0 0 0
cpu0 1175 38 280 262234 304 0 77 0 0 0
cpu1 1180 37 281 262235 305 0 77 0 0 0
intr 1043923 18 73 0 0 0 0 0 0 1 0 0 0 146 0 0
ctxt 2314756
btime 1699029847
processes 12847
procs_running 2
procs_blocked 0
softirq 843425 3 194237 1546 69612 0 0 4223 291213 0 282591
";

pub const MEMINFO: &str = "\
MemTotal:       16303788 kB
MemFree:         8221312 kB
MemAvailable:   12151068 kB
Buffers:          412184 kB
Cached:          3782456 kB
Shmem:            524288 kB
Slab:             314952 kB
";

pub const PERF_STDERR: &str = "
 Performance counter stats for 'system wide':

             1,000      cache-misses              #   10.000 % of all cache refs
            10,000      cache-references
            50,000      instructions              #    0.50  insn per cycle

       1.001764060 seconds time elapsed

";

/// Scripted facade: every boundary returns a canned value or a canned
/// error, with an optional artificial delay on the utilization sampler.
#[derive(Debug, Clone)]
pub struct FakeOs {
    cpu_info: Result<String, String>,
    kernel_stats: Result<String, String>,
    meminfo: Result<String, String>,
    cpu_percent: Result<f64, String>,
    cpu_percent_delay: Duration,
    process_ids: Result<Vec<u32>, String>,
    perf: Result<ToolOutput, String>,
}

impl FakeOs {
    /// A fake scripted as a healthy Linux host.
    pub fn healthy() -> Self {
        Self {
            cpu_info: Ok(LSCPU.to_string()),
            kernel_stats: Ok(PROC_STAT.to_string()),
            meminfo: Ok(MEMINFO.to_string()),
            cpu_percent: Ok(7.5),
            cpu_percent_delay: Duration::ZERO,
            process_ids: Ok((1..=40).collect()),
            perf: Ok(ToolOutput {
                success: true,
                code: Some(0),
                stderr: PERF_STDERR.to_string(),
            }),
        }
    }

    pub fn with_cpu_info(mut self, text: &str) -> Self {
        self.cpu_info = Ok(text.to_string());
        self
    }

    pub fn with_cpu_info_error(mut self, message: &str) -> Self {
        self.cpu_info = Err(message.to_string());
        self
    }

    pub fn with_kernel_stats(mut self, text: &str) -> Self {
        self.kernel_stats = Ok(text.to_string());
        self
    }

    pub fn with_kernel_stats_error(mut self, message: &str) -> Self {
        self.kernel_stats = Err(message.to_string());
        self
    }

    pub fn with_cpu_percent(mut self, percent: f64) -> Self {
        self.cpu_percent = Ok(percent);
        self
    }

    pub fn with_cpu_percent_error(mut self, message: &str) -> Self {
        self.cpu_percent = Err(message.to_string());
        self
    }

    pub fn with_cpu_percent_delay(mut self, delay: Duration) -> Self {
        self.cpu_percent_delay = delay;
        self
    }

    pub fn with_process_ids_error(mut self, message: &str) -> Self {
        self.process_ids = Err(message.to_string());
        self
    }

    pub fn with_perf_stderr(mut self, stderr: &str) -> Self {
        self.perf = Ok(ToolOutput {
            success: true,
            code: Some(0),
            stderr: stderr.to_string(),
        });
        self
    }

    pub fn with_perf_failure(mut self, stderr: &str) -> Self {
        self.perf = Ok(ToolOutput {
            success: false,
            code: Some(1),
            stderr: stderr.to_string(),
        });
        self
    }

    pub fn with_perf_error(mut self, message: &str) -> Self {
        self.perf = Err(message.to_string());
        self
    }
}

fn scripted_error(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, message.to_string())
}

#[async_trait::async_trait]
impl HostOs for FakeOs {
    fn cpu_info(&self) -> io::Result<String> {
        self.cpu_info.clone().map_err(|m| scripted_error(&m))
    }

    fn kernel_stats(&self) -> io::Result<String> {
        self.kernel_stats.clone().map_err(|m| scripted_error(&m))
    }

    fn meminfo(&self) -> io::Result<String> {
        self.meminfo.clone().map_err(|m| scripted_error(&m))
    }

    async fn sample_cpu_percent(&self, _window: Duration) -> io::Result<f64> {
        if self.cpu_percent_delay > Duration::ZERO {
            tokio::time::sleep(self.cpu_percent_delay).await;
        }
        self.cpu_percent.clone().map_err(|m| scripted_error(&m))
    }

    fn process_ids(&self) -> io::Result<Vec<u32>> {
        self.process_ids.clone().map_err(|m| scripted_error(&m))
    }

    async fn perf_stat(&self, _window_ms: u64) -> io::Result<ToolOutput> {
        self.perf.clone().map_err(|m| scripted_error(&m))
    }
}
