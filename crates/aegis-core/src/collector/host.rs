//! Host resource collection from procfs
//!
//! Reads:
//! - /proc/stat for CPU utilization (delta between two reads)
//! - /proc/meminfo for memory utilization
//! - /proc/loadavg for the 1-minute load average

use super::MetricCollector;
use crate::models::{names, Metric};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tokio::fs;

/// Cumulative CPU jiffies as (busy, total)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub total: u64,
}

pub struct HostCollector {
    node_id: String,
    proc_path: PathBuf,
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl HostCollector {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self::with_proc_path(node_id, "/proc")
    }

    /// Create collector with custom proc path (for testing)
    pub fn with_proc_path(node_id: impl Into<String>, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            node_id: node_id.into(),
            proc_path: proc_path.into(),
            last_cpu: Mutex::new(None),
        }
    }

    /// Parse the aggregate `cpu` line of /proc/stat
    pub fn parse_cpu_times(content: &str) -> Option<CpuTimes> {
        let line = content.lines().find(|l| l.starts_with("cpu "))?;
        let values: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .filter_map(|v| v.parse().ok())
            .collect();
        if values.len() < 4 {
            return None;
        }
        let total: u64 = values.iter().sum();
        // idle + iowait
        let idle = values[3] + values.get(4).copied().unwrap_or(0);
        Some(CpuTimes {
            busy: total.saturating_sub(idle),
            total,
        })
    }

    /// Memory utilization in [0, 1] from /proc/meminfo
    pub fn parse_memory_utilization(content: &str) -> Option<f64> {
        let mut fields: HashMap<&str, u64> = HashMap::new();
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                if let Ok(v) = value.parse() {
                    fields.insert(key.trim_end_matches(':'), v);
                }
            }
        }
        let total = *fields.get("MemTotal")?;
        if total == 0 {
            return None;
        }
        let available = fields
            .get("MemAvailable")
            .or_else(|| fields.get("MemFree"))
            .copied()?;
        Some((total.saturating_sub(available) as f64 / total as f64).clamp(0.0, 1.0))
    }

    pub fn parse_load_average(content: &str) -> Option<f64> {
        content.split_whitespace().next()?.parse().ok()
    }

    async fn read(&self, file: &str) -> Result<String> {
        let path = self.proc_path.join(file);
        fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    /// CPU utilization since the previous call; `None` on the first read
    fn cpu_utilization(&self, current: CpuTimes) -> Option<f64> {
        let mut last = self.last_cpu.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = last.replace(current)?;
        let total = current.total.checked_sub(previous.total)?;
        if total == 0 {
            return None;
        }
        let busy = current.busy.saturating_sub(previous.busy);
        Some((busy as f64 / total as f64).clamp(0.0, 1.0))
    }
}

#[async_trait]
impl MetricCollector for HostCollector {
    async fn collect(&self) -> Result<Vec<Metric>> {
        let mut metrics = Vec::new();

        let stat = self.read("stat").await?;
        if let Some(cpu) = Self::parse_cpu_times(&stat).and_then(|t| self.cpu_utilization(t)) {
            metrics.push(Metric::new(names::CPU_UTILIZATION, cpu).with_node(self.node_id.clone()));
        }

        let meminfo = self.read("meminfo").await?;
        if let Some(memory) = Self::parse_memory_utilization(&meminfo) {
            metrics.push(
                Metric::new(names::MEMORY_UTILIZATION, memory).with_node(self.node_id.clone()),
            );
        }

        let loadavg = self.read("loadavg").await?;
        if let Some(load) = Self::parse_load_average(&loadavg) {
            metrics.push(Metric::new(names::LOAD_AVERAGE, load).with_node(self.node_id.clone()));
        }

        Ok(metrics)
    }

    fn name(&self) -> &str {
        "host"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MEMINFO: &str = "MemTotal:       16000000 kB\nMemFree:         2000000 kB\nMemAvailable:    4000000 kB\n";

    async fn write_proc(dir: &TempDir, stat: &str) {
        fs::write(dir.path().join("stat"), stat).await.unwrap();
        fs::write(dir.path().join("meminfo"), MEMINFO).await.unwrap();
        fs::write(dir.path().join("loadavg"), "1.50 1.20 0.90 2/345 6789\n")
            .await
            .unwrap();
    }

    #[test]
    fn test_parse_cpu_times() {
        let stat = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 50 0 25 400 25 0 0 0 0 0\n";
        let times = HostCollector::parse_cpu_times(stat).unwrap();
        assert_eq!(times.total, 1000);
        assert_eq!(times.busy, 150);
        assert!(HostCollector::parse_cpu_times("intr 1 2 3").is_none());
    }

    #[test]
    fn test_parse_memory_utilization() {
        let util = HostCollector::parse_memory_utilization(MEMINFO).unwrap();
        assert!((util - 0.75).abs() < 1e-9);
        assert!(HostCollector::parse_memory_utilization("MemTotal: 0 kB").is_none());
    }

    #[test]
    fn test_parse_load_average() {
        assert_eq!(HostCollector::parse_load_average("0.42 0.30 0.10 1/2 3"), Some(0.42));
        assert_eq!(HostCollector::parse_load_average(""), None);
    }

    #[tokio::test]
    async fn test_collect_reports_cpu_after_second_read() {
        let dir = TempDir::new().unwrap();
        write_proc(&dir, "cpu  100 0 0 900 0 0 0 0\n").await;
        let collector = HostCollector::with_proc_path("node-a", dir.path());

        let first = collector.collect().await.unwrap();
        assert!(first.iter().all(|m| m.name != names::CPU_UTILIZATION));
        assert!(first.iter().any(|m| m.name == names::MEMORY_UTILIZATION));
        assert!(first.iter().all(|m| m.node_id() == "node-a"));

        write_proc(&dir, "cpu  200 0 0 1000 0 0 0 0\n").await;
        let second = collector.collect().await.unwrap();
        let cpu = second
            .iter()
            .find(|m| m.name == names::CPU_UTILIZATION)
            .unwrap();
        assert!((cpu.value - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_collect_missing_proc_fails() {
        let dir = TempDir::new().unwrap();
        let collector = HostCollector::with_proc_path("node-a", dir.path().join("missing"));
        assert!(collector.collect().await.is_err());
    }
}
