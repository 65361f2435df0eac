use bollard::container::Stats;
use serde::{Deserialize, Serialize};

/// A decoded one-shot resource snapshot of a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub cpu_usage_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
    pub pids: u64,
}

impl ContainerStats {
    pub fn get_memory_usage_percent(&self) -> f64 {
        if self.memory_limit_bytes == 0 {
            0.0
        } else {
            (self.memory_usage_bytes as f64 / self.memory_limit_bytes as f64) * 100.0
        }
    }
}

impl From<&Stats> for ContainerStats {
    fn from(stats: &Stats) -> Self {
        let (network_rx_bytes, network_tx_bytes) = match &stats.networks {
            Some(networks) => (
                networks.values().map(|n| n.rx_bytes).sum(),
                networks.values().map(|n| n.tx_bytes).sum(),
            ),
            None => (0, 0),
        };

        let (block_read_bytes, block_write_bytes) = block_io_totals(stats);

        Self {
            cpu_usage_percent: calculate_cpu_percentage(stats),
            memory_usage_bytes: stats.memory_stats.usage.unwrap_or(0),
            memory_limit_bytes: stats.memory_stats.limit.unwrap_or(0),
            network_rx_bytes,
            network_tx_bytes,
            block_read_bytes,
            block_write_bytes,
            pids: stats.pids_stats.current.unwrap_or(0),
        }
    }
}

fn calculate_cpu_percentage(stats: &Stats) -> f64 {
    let cpu_stats = &stats.cpu_stats;
    let precpu_stats = &stats.precpu_stats;

    let cpu_delta =
        cpu_stats.cpu_usage.total_usage as f64 - precpu_stats.cpu_usage.total_usage as f64;
    let system_delta = cpu_stats.system_cpu_usage.unwrap_or(0) as f64
        - precpu_stats.system_cpu_usage.unwrap_or(0) as f64;

    // Older daemons omit online_cpus; count the per-CPU samples instead.
    let cpu_count = match cpu_stats.online_cpus {
        Some(n) if n > 0 => n as f64,
        _ => cpu_stats
            .cpu_usage
            .percpu_usage
            .as_ref()
            .map_or(0, Vec::len) as f64,
    };

    if system_delta > 0.0 && cpu_delta > 0.0 {
        (cpu_delta / system_delta) * cpu_count * 100.0
    } else {
        0.0
    }
}

fn block_io_totals(stats: &Stats) -> (u64, u64) {
    let entries = match &stats.blkio_stats.io_service_bytes_recursive {
        Some(entries) => entries,
        None => return (0, 0),
    };

    entries.iter().fold((0, 0), |(read, write), entry| {
        match entry.op.to_ascii_lowercase().as_str() {
            "read" => (read + entry.value, write),
            "write" => (read, write + entry.value),
            _ => (read, write),
        }
    })
}
