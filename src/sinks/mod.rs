pub mod influx;
pub mod mqtt;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("write rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("mqtt client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),
    #[error("mqtt connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}
