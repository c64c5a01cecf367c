use crate::archive;
use crate::collectors::{ProcessTable, SkipReason, SkipTally};
use crate::config::{Config, SinkKind};
use crate::credentials::{CredentialError, Credentials};
use crate::normalize::normalize_all;
use crate::sampler::CpuSampler;
use crate::sinks::influx::InfluxSink;
use crate::sinks::mqtt::MqttSink;
use crate::snapshot::{RunContext, Snapshot};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Disabled,
    Delivered { sink: &'static str, items: usize },
    Failed { sink: &'static str, error: String },
    Misconfigured { sink: &'static str, error: String },
}

impl fmt::Display for SinkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkOutcome::Disabled => f.write_str("disabled"),
            SinkOutcome::Delivered { sink, items } => write!(f, "{sink}: delivered ({items})"),
            SinkOutcome::Failed { sink, error } => write!(f, "{sink}: failed ({error})"),
            SinkOutcome::Misconfigured { sink, error } => {
                write!(f, "{sink}: skipped ({error})")
            }
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub seen: usize,
    pub processes: usize,
    pub skipped: SkipTally,
    pub archive: Option<PathBuf>,
    pub sink: SinkOutcome,
}

impl RunReport {
    // transport failures are not fatal
    pub fn succeeded(&self) -> bool {
        !matches!(self.sink, SinkOutcome::Misconfigured { .. })
    }
}

pub async fn run_once<T: ProcessTable>(cfg: &Config, table: &mut T, ctx: RunContext) -> RunReport {
    let measured = CpuSampler::new(cfg.sample_window())
        .sample_all(table)
        .await;
    let skipped = measured.skipped();
    if !skipped.is_empty() {
        warn!(
            skipped = skipped.total(),
            seen = measured.seen,
            reasons = %skipped,
            "some processes could not be sampled"
        );
        if skipped.count(SkipReason::AccessDenied) > 0 {
            info!("processes owned by other users need elevated privileges to be sampled");
        }
    }

    let cores = table.logical_core_count();
    if cores == 0 {
        warn!("logical core count unavailable, reporting per-core CPU percent");
    }
    let snapshot = Snapshot::build(&ctx, normalize_all(&measured.samples, cores));

    let archive = match archive::write_snapshot(&cfg.output_dir, &snapshot) {
        Ok(path) => {
            info!(
                path = %path.display(),
                processes = snapshot.processes().len(),
                "snapshot archived"
            );
            Some(path)
        }
        Err(err) => {
            error!(error = %err, "failed to archive snapshot");
            None
        }
    };

    let sink = publish(cfg, &snapshot).await;

    RunReport {
        seen: measured.seen,
        processes: snapshot.processes().len(),
        skipped,
        archive,
        sink,
    }
}

async fn publish(cfg: &Config, snapshot: &Snapshot) -> SinkOutcome {
    match cfg.sink {
        SinkKind::None => SinkOutcome::Disabled,
        SinkKind::Influx => publish_influx(cfg, snapshot).await,
        SinkKind::Mqtt => {
            let sink = "mqtt";
            match MqttSink::new(cfg.mqtt.clone(), snapshot.hostname()).publish(snapshot).await {
                Ok(bytes) => {
                    info!(topic = %cfg.mqtt.topic, bytes, "snapshot published");
                    SinkOutcome::Delivered { sink, items: 1 }
                }
                Err(err) => {
                    error!(
                        broker = %format!("{}:{}", cfg.mqtt.host, cfg.mqtt.port),
                        error = %err,
                        "mqtt publish failed"
                    );
                    SinkOutcome::Failed {
                        sink,
                        error: err.to_string(),
                    }
                }
            }
        }
    }
}

async fn publish_influx(cfg: &Config, snapshot: &Snapshot) -> SinkOutcome {
    let sink = "influx";
    let credentials = match Credentials::load(&cfg.credentials_path) {
        Ok(credentials) => credentials,
        Err(err) => {
            match &err {
                CredentialError::Missing { keys } => error!(
                    path = %cfg.credentials_path.display(),
                    missing = %keys.join(","),
                    "influx sink skipped: credentials incomplete"
                ),
                CredentialError::Read { .. } => {
                    error!(error = %err, "influx sink skipped: credentials unavailable")
                }
            }
            return SinkOutcome::Misconfigured {
                sink,
                error: err.to_string(),
            };
        }
    };

    let result = match InfluxSink::new(credentials, cfg.http_timeout()) {
        Ok(influx) => influx.write(snapshot).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(lines) => {
            info!(lines, "snapshot written to influx");
            SinkOutcome::Delivered { sink, items: lines }
        }
        Err(err) => {
            error!(error = %err, "influx write failed");
            SinkOutcome::Failed {
                sink,
                error: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::fake::{sample, FakeTable};
    use crate::snapshot::tests::fixed_context;
    use std::fs;
    use std::io;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn config(dir: &Path, sink: SinkKind) -> Config {
        Config {
            sink,
            output_dir: dir.join("out"),
            sample_window_ms: 1,
            credentials_path: dir.join("creds.txt"),
            ..Config::default()
        }
    }

    fn table() -> FakeTable {
        FakeTable::new(2)
            .with_process(sample(1, 50.0, 2048))
            .with_prime_skip(SkipReason::AccessDenied)
            .with_process(sample(2, 150.0, 4096))
            .with_measure_skip(3, SkipReason::Vanished)
    }

    fn read_dump(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json")
    }

    #[tokio::test]
    async fn missing_token_skips_sink_but_archives() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("creds.txt"), "url = http://127.0.0.1:1\norg = o\nbucket = b\n")
            .expect("write creds");
        let cfg = config(dir.path(), SinkKind::Influx);

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        let report = run_once(&cfg, &mut table(), fixed_context()).await;
        drop(guard);

        let logged = logs.contents();
        let line = logged
            .lines()
            .find(|l| l.contains("influx sink skipped: credentials incomplete"))
            .expect("credential error must be logged");
        assert!(line.contains("ERROR"));
        assert!(line.contains("missing=token"), "{line}");

        match &report.sink {
            SinkOutcome::Misconfigured { sink, error } => {
                assert_eq!(*sink, "influx");
                assert!(error.contains("token"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!report.succeeded());

        let path = report.archive.expect("archive written");
        let dump = read_dump(&path);
        assert_eq!(dump["processes"][0]["cpu_percent_normalized"], 25.0);
        assert_eq!(dump["processes"][1]["cpu_percent_normalized"], 75.0);
        assert_eq!(dump["processes"][1]["memory_resident_kib"], 4);
    }

    #[tokio::test]
    async fn report_counts_match_sampling() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(dir.path(), SinkKind::None);

        let report = run_once(&cfg, &mut table(), fixed_context()).await;

        assert_eq!(report.seen, 4);
        assert_eq!(report.processes, 2);
        assert_eq!(report.skipped.total(), 2);
        assert_eq!(report.processes, report.seen - report.skipped.total());
        assert_eq!(report.sink, SinkOutcome::Disabled);
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn transport_failure_is_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        fs::write(
            dir.path().join("creds.txt"),
            format!("url = http://{addr}\ntoken = t\norg = o\nbucket = b\n"),
        )
        .expect("write creds");
        let mut cfg = config(dir.path(), SinkKind::Influx);
        cfg.http_timeout_secs = 2;

        let report = run_once(&cfg, &mut table(), fixed_context()).await;

        assert!(matches!(report.sink, SinkOutcome::Failed { sink: "influx", .. }));
        assert!(report.succeeded());
        assert!(report.archive.is_some());
    }

    #[tokio::test]
    async fn zero_cores_does_not_divide_by_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(dir.path(), SinkKind::None);
        let mut table = FakeTable::new(0).with_process(sample(1, 37.5, 1024));

        let report = run_once(&cfg, &mut table, fixed_context()).await;
        let dump = read_dump(&report.archive.expect("archive"));
        assert_eq!(dump["processes"][0]["cpu_percent_normalized"], 37.5);
    }

    #[tokio::test]
    async fn archive_only_config_archives_without_publishing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config {
            output_dir: dir.path().join("out"),
            sample_window_ms: 1,
            ..Config::archive_only()
        };

        let report = run_once(&cfg, &mut table(), fixed_context()).await;
        assert_eq!(report.sink, SinkOutcome::Disabled);
        let dump = read_dump(&report.archive.expect("archive written"));
        assert_eq!(dump["processes"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn unwritable_archive_still_publishes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("out");
        fs::write(&blocker, "not a directory").expect("write blocker");
        let cfg = config(dir.path(), SinkKind::None);

        let report = run_once(&cfg, &mut table(), fixed_context()).await;
        assert!(report.archive.is_none());
        assert_eq!(report.sink, SinkOutcome::Disabled);
        assert!(report.succeeded());
    }
}
