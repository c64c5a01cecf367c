use chrono::{DateTime, Utc};
use serde::Serialize;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const UNKNOWN_HOST: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMetric {
    pub pid: u32,
    pub name: String,
    pub username: String,
    pub status: String,
    pub created_at: u64,
    pub cpu_percent_normalized: f64,
    pub memory_resident_kib: u64,
    pub memory_virtual_kib: u64,
}

#[derive(Debug, Clone)]
pub struct RunContext {
    started_at: DateTime<Utc>,
    hostname: String,
}

impl RunContext {
    pub fn capture() -> Self {
        Self::new(Utc::now(), resolve_hostname())
    }

    pub fn new(started_at: DateTime<Utc>, hostname: impl Into<String>) -> Self {
        Self {
            started_at,
            hostname: hostname.into(),
        }
    }

    pub fn timestamp(&self) -> String {
        self.started_at.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn unix_nanos(&self) -> i64 {
        self.started_at.timestamp_nanos_opt().unwrap_or(0)
    }
}

fn resolve_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    timestamp: String,
    hostname: String,
    processes: Vec<NormalizedMetric>,
    #[serde(skip)]
    captured_at_ns: i64,
}

impl Snapshot {
    pub fn build(ctx: &RunContext, processes: Vec<NormalizedMetric>) -> Self {
        Self {
            timestamp: ctx.timestamp(),
            hostname: ctx.hostname().to_string(),
            processes,
            captured_at_ns: ctx.unix_nanos(),
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn processes(&self) -> &[NormalizedMetric] {
        &self.processes
    }

    pub fn captured_at_ns(&self) -> i64 {
        self.captured_at_ns
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn fixed_context() -> RunContext {
        let at = Utc
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .expect("valid date");
        RunContext::new(at, "host-a")
    }

    #[test]
    fn timestamp_uses_compact_utc_format() {
        let ctx = fixed_context();
        assert_eq!(ctx.timestamp(), "20240309_070501");
        assert_eq!(ctx.unix_nanos(), 1_709_967_901_000_000_000);
    }

    #[test]
    fn captured_hostname_is_never_empty() {
        assert!(!RunContext::capture().hostname().is_empty());
    }

    #[test]
    fn snapshot_serializes_without_internal_fields() {
        let metric = NormalizedMetric {
            pid: 1,
            name: "init".to_string(),
            username: "root".to_string(),
            status: "sleeping".to_string(),
            created_at: 10,
            cpu_percent_normalized: 0.5,
            memory_resident_kib: 2,
            memory_virtual_kib: 8,
        };
        let snapshot = Snapshot::build(&fixed_context(), vec![metric]);
        let value = serde_json::to_value(&snapshot).expect("serialize");

        assert_eq!(value["timestamp"], "20240309_070501");
        assert_eq!(value["hostname"], "host-a");
        assert_eq!(value["processes"][0]["pid"], 1);
        assert_eq!(value["processes"][0]["cpu_percent_normalized"], 0.5);
        assert_eq!(value["processes"][0]["memory_resident_kib"], 2);
        assert_eq!(value["processes"][0]["memory_virtual_kib"], 8);
        assert!(value["processes"][0].get("cpu_percent").is_none());
        assert!(value.get("captured_at_ns").is_none());
    }
}
