// =============================================================================
// broker/listener.rs - Receptia mesajelor de la broker
// =============================================================================
//
// Fiecare datagrama poate contine mai multe envelope-uri (unul pe linie).
// Rutare dupa topic:
//   heartbeats           -> AgentRegistry (roster complet publicat live)
//   top-talkers, ...     -> AnalyticsRelay (payload verbatim)
//   orice altceva        -> ignorat (debug)
//
// Un envelope invalid nu afecteaza celelalte envelope-uri din datagrama.
//
// Fiecare datagrama primita este procesata pe un task tokio separat; bucla
// de receptie doar citeste din socket. Doua datagrame pot fi deci procesate
// in alta ordine decat au sosit.
//
// =============================================================================

use super::{decode_datagram, Envelope};
use crate::error::BrokerError;
use crate::registry::{AgentHeartbeat, AgentRegistry};
use crate::relay::{AnalyticsChannel, AnalyticsRelay};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Rezultatul rutarii unui envelope (util in teste si la logare).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Heartbeat(String),
    Analytics(AnalyticsChannel),
    Ignored,
}

pub struct InboundRouter {
    heartbeat_topic: String,
    registry: Arc<AgentRegistry>,
    relay: Arc<AnalyticsRelay>,
}

impl InboundRouter {
    pub fn new(
        heartbeat_topic: String,
        registry: Arc<AgentRegistry>,
        relay: Arc<AnalyticsRelay>,
    ) -> Self {
        Self {
            heartbeat_topic,
            registry,
            relay,
        }
    }

    pub fn route(&self, envelope: Envelope) -> Result<Routed, BrokerError> {
        let Envelope { topic, payload, .. } = envelope;

        if topic == self.heartbeat_topic {
            let heartbeat: AgentHeartbeat = serde_json::from_value(payload)
                .map_err(|source| BrokerError::Payload {
                    topic: topic.clone(),
                    source,
                })?;
            let agent_id = heartbeat.agent_id.clone();
            self.registry.on_heartbeat(heartbeat);
            return Ok(Routed::Heartbeat(agent_id));
        }

        if let Some(channel) = self.relay.route(&topic) {
            self.relay.relay(&topic, payload);
            return Ok(Routed::Analytics(channel));
        }

        tracing::debug!(topic = %topic, "Topic broker fara consumator local");
        Ok(Routed::Ignored)
    }

    /// Proceseaza o datagrama completa; erorile sunt logate per envelope.
    pub fn handle_datagram(&self, data: &str) -> Vec<Routed> {
        let mut routed = Vec::new();
        for decoded in decode_datagram(data) {
            match decoded.and_then(|env| self.route(env)) {
                Ok(r) => routed.push(r),
                Err(e) => tracing::warn!(error = %e, "Envelope broker respins"),
            }
        }
        routed
    }
}

/// Bucla de receptie. Ruleaza pana la anularea task-ului.
pub async fn run(socket: UdpSocket, router: Arc<InboundRouter>) {
    // 65535 = dimensiunea maxima a unei datagrame UDP.
    let mut buf = vec![0u8; 65535];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, _addr)) => {
                let data = String::from_utf8_lossy(&buf[..len]).into_owned();
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    router.handle_datagram(&data);
                });
            }
            Err(e) => {
                // Erorile de receptie UDP sunt de obicei tranzitorii.
                tracing::warn!(error = %e, "Eroare receptie UDP de la broker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopicConfig;
    use crate::hub::LiveChannels;
    use serde_json::json;

    fn router() -> (InboundRouter, Arc<LiveChannels>, Arc<AgentRegistry>) {
        let channels = Arc::new(LiveChannels::new(100));
        let topics = TopicConfig::default();
        let registry = Arc::new(AgentRegistry::new(Arc::clone(&channels.agents)));
        let relay = Arc::new(AnalyticsRelay::new(&topics, Arc::clone(&channels)));
        let router = InboundRouter::new(topics.heartbeats.clone(), Arc::clone(&registry), relay);
        (router, channels, registry)
    }

    #[test]
    fn test_routes_heartbeat_and_analytics() {
        let (router, channels, registry) = router();
        let mut talkers = channels.top_talkers.subscribe();

        let data = [
            r#"{"topic":"netwatch.agent-heartbeat","key":"a1","payload":{"agentId":"a1","status":"UP"}}"#,
            r#"{"topic":"netwatch.top-talkers","payload":{"agentId":"a1","topTalkers":[]}}"#,
            r#"{"topic":"packet-events","payload":{}}"#,
        ]
        .join("\n");

        let routed = router.handle_datagram(&data);
        assert_eq!(
            routed,
            vec![
                Routed::Heartbeat("a1".to_string()),
                Routed::Analytics(AnalyticsChannel::TopTalkers),
                Routed::Ignored,
            ]
        );
        assert_eq!(registry.agent_count(), 1);
        assert_eq!(
            talkers.try_recv(),
            Some(json!({"agentId": "a1", "topTalkers": []}))
        );
    }

    #[test]
    fn test_bad_heartbeat_does_not_block_rest_of_datagram() {
        let (router, _channels, registry) = router();

        let data = [
            r#"{"topic":"netwatch.agent-heartbeat","payload":{"status":"fara id"}}"#,
            r#"{"topic":"netwatch.agent-heartbeat","payload":{"agentId":"a2"}}"#,
        ]
        .join("\n");

        let routed = router.handle_datagram(&data);
        assert_eq!(routed, vec![Routed::Heartbeat("a2".to_string())]);
        assert_eq!(registry.snapshot()[0].agent_id, "a2");
    }

    #[tokio::test]
    async fn test_listener_consumes_udp_datagrams() {
        let (router, _channels, registry) = router();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let task = tokio::spawn(run(socket, Arc::new(router)));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for id in ["udp-1", "udp-2", "udp-3"] {
            let msg = format!(
                r#"{{"topic":"netwatch.agent-heartbeat","payload":{{"agentId":"{}"}}}}"#,
                id
            );
            sender.send_to(msg.as_bytes(), addr).await.unwrap();
        }

        for _ in 0..100 {
            if registry.agent_count() == 3 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let ids: Vec<String> = registry.snapshot().into_iter().map(|a| a.agent_id).collect();
        assert_eq!(ids, vec!["udp-1", "udp-2", "udp-3"]);
        task.abort();
    }
}
