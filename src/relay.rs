// =============================================================================
// relay.rs - Relay pentru agregarile analitice
// =============================================================================
//
// Agregarile (top talkers, top ports, statistici pe protocol, esantioane
// brute) sunt calculate de un colaborator extern si ajung prin broker.
// Relay-ul le trimite NESCHIMBATE pe canalul live cu numele corespunzator.
// Payload-ul ramane `serde_json::Value`: forma lui este opaca pentru noi.
//
// =============================================================================

use crate::config::TopicConfig;
use crate::hub::LiveChannels;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Canalele live alimentate de relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticsChannel {
    TopTalkers,
    TopPorts,
    ProtocolStats,
    RawPackets,
}

impl AnalyticsChannel {
    pub const ALL: [AnalyticsChannel; 4] = [
        AnalyticsChannel::TopTalkers,
        AnalyticsChannel::TopPorts,
        AnalyticsChannel::ProtocolStats,
        AnalyticsChannel::RawPackets,
    ];

    /// Numele canalului live (folosit si in ruta `/api/v1/stream/{channel}`).
    pub fn name(self) -> &'static str {
        match self {
            AnalyticsChannel::TopTalkers => "topTalkers",
            AnalyticsChannel::TopPorts => "topPorts",
            AnalyticsChannel::ProtocolStats => "protocolStats",
            AnalyticsChannel::RawPackets => "rawPackets",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

pub struct AnalyticsRelay {
    routes: HashMap<String, AnalyticsChannel>,
    channels: Arc<LiveChannels>,
}

impl AnalyticsRelay {
    pub fn new(topics: &TopicConfig, channels: Arc<LiveChannels>) -> Self {
        let routes = HashMap::from([
            (topics.top_talkers.clone(), AnalyticsChannel::TopTalkers),
            (topics.top_ports.clone(), AnalyticsChannel::TopPorts),
            (topics.protocol_stats.clone(), AnalyticsChannel::ProtocolStats),
            (topics.raw_packets.clone(), AnalyticsChannel::RawPackets),
        ]);
        Self { routes, channels }
    }

    /// Canalul live asociat unui topic broker, daca exista.
    pub fn route(&self, topic: &str) -> Option<AnalyticsChannel> {
        self.routes.get(topic).copied()
    }

    /// Trimite payload-ul verbatim. Returneaza `false` pentru topic-uri
    /// care nu apartin relay-ului.
    pub fn relay(&self, topic: &str, payload: Value) -> bool {
        let Some(channel) = self.route(topic) else {
            return false;
        };

        tracing::debug!(topic, channel = channel.name(), "Relay agregare analitica");
        self.channels.analytics(channel).publish(payload);
        true
    }
}
