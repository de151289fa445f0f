// =============================================================================
// broker/mod.rs - Canalul outbound si formatul envelope-urilor broker
// =============================================================================
//
// Broker-ul extern face fan-out intre procese. Comunicam cu el prin
// datagrame UDP care contin unul sau mai multe envelope-uri JSON, cate
// unul pe linie:
//
//   {"topic": "packet-events", "key": "10.0.0.1", "payload": {...}}
//
// Directii:
//   outbound  - nucleul pune mesaje intr-un canal nelimitat (`Outbound`),
//               task-ul `publisher` le serializeaza si le trimite
//   inbound   - task-ul `listener` primeste datagrame si le ruteaza catre
//               registrul de agenti sau catre relay-ul analitic
//
// Nucleul nu asteapta niciodata broker-ul: `Outbound::publish` doar pune
// mesajul in coada. Esecurile sunt logate si ignorate.
//
// =============================================================================

pub mod listener;
pub mod publisher;

use crate::config::TopicConfig;
use crate::detector::Alert;
use crate::error::BrokerError;
use crate::packet::PacketRecord;
use crate::registry::AgentHeartbeat;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Unitatea de pe fir, in ambele directii.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    #[serde(default)]
    pub key: Option<String>,
    pub payload: Value,
}

/// Mesajele pe care nucleul le publica upstream, cate unul per topic.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Packet(PacketRecord),
    Alert(Alert),
    Heartbeat(AgentHeartbeat),
}

impl OutboundMessage {
    fn topic<'a>(&self, topics: &'a TopicConfig) -> &'a str {
        match self {
            OutboundMessage::Packet(_) => &topics.packets,
            OutboundMessage::Alert(_) => &topics.alerts,
            OutboundMessage::Heartbeat(_) => &topics.heartbeats,
        }
    }

    /// Cheia de partitionare: IP-ul sursa pentru pachete si alerte,
    /// id-ul agentului pentru heartbeat-uri.
    fn key(&self) -> Option<String> {
        match self {
            OutboundMessage::Packet(record) => record.fields.src_ip.clone(),
            OutboundMessage::Alert(alert) => Some(alert.src_ip.clone()),
            OutboundMessage::Heartbeat(hb) => Some(hb.agent_id.clone()),
        }
    }

    pub fn into_envelope(self, topics: &TopicConfig) -> Result<Envelope, BrokerError> {
        let topic = self.topic(topics).to_string();
        let key = self.key();
        let payload = match self {
            OutboundMessage::Packet(record) => serde_json::to_value(record)?,
            OutboundMessage::Alert(alert) => serde_json::to_value(alert)?,
            OutboundMessage::Heartbeat(hb) => serde_json::to_value(hb)?,
        };
        Ok(Envelope {
            topic,
            key,
            payload,
        })
    }
}

/// Capatul de trimitere al canalului outbound. Clonabil, ieftin.
#[derive(Clone)]
pub struct Outbound {
    tx: UnboundedSender<OutboundMessage>,
}

impl Outbound {
    pub fn channel() -> (Self, UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Best-effort: daca task-ul publisher s-a oprit, mesajul se pierde
    /// si se logheaza un avertisment.
    pub fn publish(&self, message: OutboundMessage) {
        if let Err(e) = self.tx.send(message) {
            tracing::warn!(error = %e, "Canal outbound inchis, mesaj abandonat");
        }
    }
}

/// Decodeaza toate envelope-urile dintr-o datagrama (una pe linie).
///
/// Liniile goale sunt ignorate; fiecare linie invalida produce propria eroare
/// fara sa le afecteze pe celelalte.
pub fn decode_datagram(data: &str) -> Vec<Result<Envelope, BrokerError>> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(BrokerError::from))
        .collect()
}
