use crate::collectors::ProcessSample;
use crate::snapshot::NormalizedMetric;

const BYTES_PER_KIB: u64 = 1024;

// One saturated core on a 4-core host is 25.0.
pub fn normalize_cpu(per_core_percent: f64, logical_cores: usize) -> f64 {
    if !per_core_percent.is_finite() || per_core_percent <= 0.0 {
        return 0.0;
    }
    let cores = logical_cores.max(1) as f64;
    round_to_hundredths((per_core_percent / cores).min(100.0))
}

pub fn bytes_to_kib(bytes: u64) -> u64 {
    bytes.saturating_add(BYTES_PER_KIB / 2) / BYTES_PER_KIB
}

pub fn normalize(sample: &ProcessSample, logical_cores: usize) -> NormalizedMetric {
    NormalizedMetric {
        pid: sample.pid,
        name: sample.name.clone(),
        username: sample.username.clone(),
        status: sample.status.clone(),
        created_at: sample.created_at,
        cpu_percent_normalized: normalize_cpu(sample.cpu_percent, logical_cores),
        memory_resident_kib: bytes_to_kib(sample.memory_resident_bytes),
        memory_virtual_kib: bytes_to_kib(sample.memory_virtual_bytes),
    }
}

pub fn normalize_all(samples: &[ProcessSample], logical_cores: usize) -> Vec<NormalizedMetric> {
    samples
        .iter()
        .map(|s| normalize(s, logical_cores))
        .collect()
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
