//! Host resource sampling
//!
//! Reads CPU, memory and disk utilization. Each metric is read
//! independently; one that cannot be read is reported as absent.

use chrono::Utc;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};
use tracing::{debug, warn};

use crate::config::ResourceConfig;
use crate::domain::{PressureLevel, ResourcePressure, ResourceSnapshot};

pub struct ResourceSampler {
    mount_point: PathBuf,
    warning_percent: f64,
    critical_percent: f64,
}

fn percent(used: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| used as f64 / total as f64 * 100.0)
}

fn read_cpu(sys: &mut System) -> Option<f64> {
    // Usage is a delta between two refreshes
    sys.refresh_cpu();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();
    if sys.cpus().is_empty() {
        return None;
    }
    Some(sys.global_cpu_info().cpu_usage() as f64)
}

fn read_memory(sys: &mut System) -> Option<f64> {
    sys.refresh_memory();
    percent(sys.used_memory(), sys.total_memory())
}

/// Usage of the filesystem holding `mount_point` (longest matching mount)
fn read_disk(mount_point: &Path) -> Option<f64> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| mount_point.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())?;

    let total = disk.total_space();
    percent(total.saturating_sub(disk.available_space()), total)
}

fn read_snapshot(mount_point: &Path) -> ResourceSnapshot {
    let mut sys = System::new();
    let snapshot = ResourceSnapshot {
        cpu_used_percent: read_cpu(&mut sys),
        mem_used_percent: read_memory(&mut sys),
        disk_used_percent: read_disk(mount_point),
        sampled_at: Utc::now(),
    };
    debug!(
        "Resource sample: cpu={:?} mem={:?} disk={:?}",
        snapshot.cpu_used_percent, snapshot.mem_used_percent, snapshot.disk_used_percent
    );
    snapshot
}

impl ResourceSampler {
    pub fn new(mount_point: PathBuf, warning_percent: f64, critical_percent: f64) -> Self {
        Self {
            mount_point,
            warning_percent,
            critical_percent,
        }
    }

    pub fn from_config(config: &ResourceConfig) -> Self {
        Self::new(
            config.mount_point.clone(),
            config.warning_percent,
            config.critical_percent,
        )
    }

    /// Take a snapshot off the async runtime
    pub async fn sample(&self) -> ResourceSnapshot {
        let mount_point = self.mount_point.clone();
        match tokio::task::spawn_blocking(move || read_snapshot(&mount_point)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Resource sampling failed: {}", e);
                ResourceSnapshot {
                    cpu_used_percent: None,
                    mem_used_percent: None,
                    disk_used_percent: None,
                    sampled_at: Utc::now(),
                }
            }
        }
    }

    /// Metrics at or above the warning threshold
    pub fn classify(&self, snapshot: &ResourceSnapshot) -> Vec<ResourcePressure> {
        [
            ("cpu", snapshot.cpu_used_percent),
            ("memory", snapshot.mem_used_percent),
            ("disk", snapshot.disk_used_percent),
        ]
        .into_iter()
        .filter_map(|(metric, value)| {
            let value = value?;
            let level = if value >= self.critical_percent {
                PressureLevel::Critical
            } else if value >= self.warning_percent {
                PressureLevel::Warning
            } else {
                return None;
            };
            Some(ResourcePressure {
                metric: metric.to_string(),
                value,
                level,
            })
        })
        .collect()
    }
}
