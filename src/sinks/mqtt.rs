use crate::config::MqttConfig;
use crate::sinks::SinkError;
use crate::snapshot::Snapshot;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tracing::debug;

// A full process table serializes well past rumqttc's 10 KiB default.
const MAX_PACKET_BYTES: usize = 16 * 1024 * 1024;

pub struct MqttSink {
    cfg: MqttConfig,
    client_id: String,
}

impl MqttSink {
    pub fn new(cfg: MqttConfig, hostname: &str) -> Self {
        // A broker drops the older session when two clients share an id.
        let client_id = format!("{}-{}-{}", cfg.client_id, hostname, std::process::id());
        Self { cfg, client_id }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.cfg.host, self.cfg.port);
        options.set_keep_alive(Duration::from_secs(self.cfg.keep_alive_secs));
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_PACKET_BYTES, MAX_PACKET_BYTES);
        options
    }

    // Returns the payload size in bytes.
    pub async fn publish(&self, snapshot: &Snapshot) -> Result<usize, SinkError> {
        let payload = serde_json::to_vec(snapshot)?;
        let size = payload.len();
        let after = Duration::from_secs(self.cfg.timeout_secs);

        tokio::time::timeout(after, self.exchange(payload))
            .await
            .map_err(|_| SinkError::Timeout {
                what: "mqtt publish",
                after,
            })??;
        Ok(size)
    }

    async fn exchange(&self, payload: Vec<u8>) -> Result<(), SinkError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);
        client
            .publish(self.cfg.topic.as_str(), QoS::AtMostOnce, false, payload)
            .await?;
        client.disconnect().await?;

        loop {
            match eventloop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    debug!(host = %self.cfg.host, code = ?ack.code, "mqtt connected");
                }
                Event::Outgoing(Outgoing::Disconnect) => return Ok(()),
                _ => {}
            }
        }
    }
}
