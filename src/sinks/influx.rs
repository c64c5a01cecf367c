use crate::credentials::Credentials;
use crate::sinks::SinkError;
use crate::snapshot::Snapshot;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;

const MEASUREMENT: &str = "process_stats";
const ERROR_BODY_LIMIT: usize = 256;

pub struct InfluxSink {
    client: Client,
    credentials: Credentials,
}

impl InfluxSink {
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .user_agent(concat!("procdump/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    pub fn write_url(&self) -> String {
        format!("{}/api/v2/write", self.credentials.url)
    }

    // Returns the number of lines sent; 3xx counts as accepted.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<usize, SinkError> {
        let body = encode_line_protocol(snapshot);
        if body.is_empty() {
            return Ok(0);
        }
        let lines = snapshot.processes().len();

        let response = self
            .client
            .post(self.write_url())
            .query(&[
                ("org", self.credentials.org.as_str()),
                ("bucket", self.credentials.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.credentials.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            return Ok(lines);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > ERROR_BODY_LIMIT {
            let cut = (0..=ERROR_BODY_LIMIT)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(SinkError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

pub fn encode_line_protocol(snapshot: &Snapshot) -> String {
    let host = escape_tag(snapshot.hostname());
    let ts = snapshot.captured_at_ns();
    snapshot
        .processes()
        .iter()
        .map(|m| {
            format!(
                "{MEASUREMENT},host={host},pid={},username={},name={},status={} cpu_percent={},memory_rss={}i,memory_vms={}i {ts}",
                m.pid,
                escape_tag(&m.username),
                escape_tag(&m.name),
                escape_tag(&m.status),
                m.cpu_percent_normalized,
                m.memory_resident_kib,
                m.memory_virtual_kib,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// A backslash would escape the separator after it, so it becomes `/`.
fn escape_tag(value: &str) -> String {
    if value.is_empty() {
        return "unknown".to_string();
    }
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ' ' | '\n' | '\r' | '\t' => out.push('_'),
            '\\' => out.push('/'),
            ',' | '=' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
