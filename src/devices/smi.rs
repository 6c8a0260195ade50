//! `nvidia-smi` runner for device inventory and utilization.
//!
//! Queries use the CSV interface (`--format=csv,noheader,nounits`) so the
//! output is one comma-separated line per GPU with bare numbers.

use super::traits::{DeviceInventory, UtilizationMonitor};
use crate::config::Config;
use crate::error::{GpuLockError, Result};
use std::collections::BTreeSet;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often a running query is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Utilization snapshot for one GPU.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUsage {
    /// GPU index as reported by `nvidia-smi`.
    pub index: u32,
    /// Compute load as a fraction in `[0, 1]`.
    pub load: f64,
    /// Memory in use as a fraction of total memory in `[0, 1]`.
    pub memory: f64,
}

/// Wrapper around the `nvidia-smi` executable.
///
/// Every query is bounded by a timeout; a query that does not finish in
/// time is killed and reported as a `ToolError`.
#[derive(Debug, Clone)]
pub struct SmiTool {
    command: String,
    load_threshold: f64,
    memory_threshold: f64,
    timeout: Duration,
}

impl SmiTool {
    /// Use `command` with the default busy thresholds (10% load and 10% memory)
    /// and a 10 second query timeout.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            load_threshold: 0.1,
            memory_threshold: 0.1,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.smi_command.clone())
            .with_thresholds(config.busy_load_threshold, config.busy_memory_threshold)
            .with_timeout(Duration::from_secs(config.smi_timeout_secs))
    }

    /// Set the load and memory fractions a device must both exceed to look busy.
    pub fn with_thresholds(mut self, load: f64, memory: f64) -> Self {
        self.load_threshold = load;
        self.memory_threshold = memory;
        self
    }

    /// Set how long a single query may run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current utilization of every GPU.
    pub fn usage(&self) -> Result<Vec<DeviceUsage>> {
        let stdout = self.query("index,utilization.gpu,memory.used,memory.total")?;
        parse_usage(&stdout)
    }

    /// Whether `usage` crosses both busy thresholds.
    pub fn looks_busy(&self, usage: &DeviceUsage) -> bool {
        usage.load > self.load_threshold && usage.memory > self.memory_threshold
    }

    /// Run a `--query-gpu` query and return its stdout.
    fn query(&self, fields: &str) -> Result<String> {
        let query_arg = format!("--query-gpu={}", fields);
        let args = [query_arg.as_str(), "--format=csv,noheader,nounits"];

        let mut child = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                GpuLockError::ToolError(format!("failed to execute {}: {}", self.command, e))
            })?;

        // Drain both pipes while waiting so a chatty tool cannot stall on a full pipe.
        let stdout_reader = read_in_background(child.stdout.take());
        let stderr_reader = read_in_background(child.stderr.take());

        let status = wait_with_timeout(&mut child, self.timeout).map_err(|e| {
            GpuLockError::ToolError(format!("failed to wait for {}: {}", self.command, e))
        })?;

        let Some(status) = status else {
            warn!(command = %self.command, timeout = ?self.timeout, "GPU query timed out");
            return Err(GpuLockError::ToolError(format!(
                "{} {} timed out after {}s",
                self.command,
                query_arg,
                self.timeout.as_secs_f64()
            )));
        };

        let stdout = collect_output(stdout_reader);
        let stderr = collect_output(stderr_reader);

        if !status.success() {
            let message = if stderr.is_empty() { stdout } else { stderr };
            return Err(GpuLockError::ToolError(format!(
                "{} {} failed (exit code {}): {}",
                self.command,
                query_arg,
                status.code().unwrap_or(-1),
                message
            )));
        }

        debug!(command = %self.command, query = fields, "Queried GPUs");
        Ok(stdout)
    }
}

/// Wait for `child` for at most `timeout`.
///
/// Returns `None` if the timeout expired, after killing and reaping the child.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn read_in_background<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect_output(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).trim().to_string())
        .unwrap_or_default()
}

impl DeviceInventory for SmiTool {
    fn device_ids(&self) -> Result<Vec<u32>> {
        parse_indices(&self.query("index")?)
    }
}

impl UtilizationMonitor for SmiTool {
    fn busy_devices(&self) -> Result<BTreeSet<u32>> {
        Ok(self
            .usage()?
            .into_iter()
            .filter(|usage| self.looks_busy(usage))
            .map(|usage| usage.index)
            .collect())
    }
}

/// Parse one index per line.
pub(crate) fn parse_indices(stdout: &str) -> Result<Vec<u32>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| parse_index(line, stdout))
        .collect()
}

/// Parse `index, utilization.gpu, memory.used, memory.total` lines.
///
/// Values `nvidia-smi` cannot report (`[N/A]`, `[Not Supported]`) count as
/// zero, so such a device never looks busy.
pub(crate) fn parse_usage(stdout: &str) -> Result<Vec<DeviceUsage>> {
    let mut devices = Vec::new();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [index, load, used, total] = fields[..] else {
            return Err(GpuLockError::ToolError(format!(
                "unexpected utilization line: '{}'",
                line
            )));
        };

        let total = parse_number(total);
        let memory = if total > 0.0 {
            parse_number(used) / total
        } else {
            0.0
        };

        devices.push(DeviceUsage {
            index: parse_index(index, stdout)?,
            load: parse_number(load) / 100.0,
            memory,
        });
    }

    Ok(devices)
}

fn parse_index(field: &str, stdout: &str) -> Result<u32> {
    field.parse().map_err(|_| {
        GpuLockError::ToolError(format!(
            "unexpected GPU index '{}' in output:\n{}",
            field, stdout
        ))
    })
}

fn parse_number(field: &str) -> f64 {
    field.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_indices() {
        assert_eq!(parse_indices("0\n1\n2\n").unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_indices("  3 \n\n 1\n").unwrap(), vec![3, 1]);
        assert!(parse_indices("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_indices_rejects_garbage() {
        let err = parse_indices("No devices were found").unwrap_err();
        assert!(matches!(err, GpuLockError::ToolError(_)));
    }

    #[test]
    fn test_parse_usage() {
        let out = "0, 85, 8000, 16000\n1, 0, 0, 16000\n";
        let usage = parse_usage(out).unwrap();

        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].index, 0);
        assert!((usage[0].load - 0.85).abs() < 1e-9);
        assert!((usage[0].memory - 0.5).abs() < 1e-9);
        assert_eq!(usage[1].load, 0.0);
        assert_eq!(usage[1].memory, 0.0);
    }

    #[test]
    fn test_parse_usage_unsupported_values_count_as_idle() {
        let usage = parse_usage("0, [N/A], [N/A], [N/A]\n").unwrap();
        assert_eq!(usage[0].load, 0.0);
        assert_eq!(usage[0].memory, 0.0);
    }

    #[test]
    fn test_parse_usage_rejects_short_lines() {
        assert!(parse_usage("0, 50\n").is_err());
    }

    #[test]
    fn test_looks_busy_requires_both_thresholds() {
        let tool = SmiTool::new("nvidia-smi");
        let usage = |load, memory| DeviceUsage {
            index: 0,
            load,
            memory,
        };

        assert!(tool.looks_busy(&usage(0.9, 0.9)));
        assert!(!tool.looks_busy(&usage(0.9, 0.05)));
        assert!(!tool.looks_busy(&usage(0.05, 0.9)));

        let strict = SmiTool::new("nvidia-smi").with_thresholds(0.95, 0.5);
        assert!(!strict.looks_busy(&usage(0.9, 0.9)));
    }

    /// Write an executable stand-in for `nvidia-smi`.
    fn fake_smi(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-smi");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_query_reads_tool_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = SmiTool::new(fake_smi(&dir, "printf '0\\n1\\n'"));

        assert_eq!(tool.device_ids().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_query_failure_includes_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = SmiTool::new(fake_smi(&dir, "echo 'driver not loaded' >&2; exit 9"));

        let err = tool.device_ids().unwrap_err();
        assert!(err.to_string().contains("exit code 9"));
        assert!(err.to_string().contains("driver not loaded"));
    }

    #[test]
    fn test_hung_tool_times_out() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = SmiTool::new(fake_smi(&dir, "exec sleep 30"))
            .with_timeout(Duration::from_millis(200));

        let start = Instant::now();
        let err = tool.busy_devices().unwrap_err();

        assert!(matches!(err, GpuLockError::ToolError(_)));
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_executable_is_tool_error() {
        let tool = SmiTool::new("/nonexistent/nvidia-smi");
        let err = tool.device_ids().unwrap_err();
        assert!(matches!(err, GpuLockError::ToolError(_)));
        assert!(tool.busy_devices().is_err());
    }
}
