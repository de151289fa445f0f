// =============================================================================
// registry.rs - Registrul agentilor de captura
// =============================================================================
//
// Fiecare heartbeat INLOCUIESTE complet intrarea agentului (last-write-wins,
// fara merge de campuri). Dupa fiecare actualizare se publica pe canalul
// live `agents` ROSTER-UL INTREG, nu doar diferenta.
//
// Actualizarea si publicarea roster-ului se fac sub acelasi lock, deci
// ordinea roster-elor publicate urmeaza ordinea actualizarilor: ultimul
// roster primit de un abonat contine toti agentii inregistrati pana atunci.
//
// Nu exista expirare: un agent care nu mai trimite heartbeat ramane in
// roster pana la repornirea procesului.
//
// =============================================================================

use crate::hub::Hub;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Starea raportata de un agent. Acelasi format pentru heartbeat-ul primit
/// si pentru intrarea din roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub agent_id: String,
    pub host_name: Option<String>,
    /// Adresa raportata de agent.
    pub ip: Option<String>,
    pub status: Option<String>,
    /// Momentul ultimului heartbeat, asa cum l-a raportat agentul.
    pub timestamp: Option<String>,
}

pub type AgentHeartbeat = AgentInfo;

pub struct AgentRegistry {
    agents: DashMap<String, AgentInfo>,
    roster: Arc<Hub<Vec<AgentInfo>>>,
    /// Serializeaza insert + snapshot + publish.
    publish_lock: Mutex<()>,
}

impl AgentRegistry {
    pub fn new(roster: Arc<Hub<Vec<AgentInfo>>>) -> Self {
        Self {
            agents: DashMap::new(),
            roster,
            publish_lock: Mutex::new(()),
        }
    }

    /// Aplica un heartbeat si publica roster-ul complet.
    pub fn on_heartbeat(&self, heartbeat: AgentHeartbeat) {
        tracing::info!(
            agent_id = %heartbeat.agent_id,
            status = heartbeat.status.as_deref().unwrap_or("-"),
            "Heartbeat agent"
        );

        // Lock-ul nu protejeaza date, deci un lock otravit e inca utilizabil.
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.agents.insert(heartbeat.agent_id.clone(), heartbeat);
        self.roster.publish(self.snapshot());
    }

    /// Copie la un moment dat a tuturor intrarilor, ordonata dupa agent_id.
    pub fn snapshot(&self) -> Vec<AgentInfo> {
        let mut roster: Vec<AgentInfo> = self.agents.iter().map(|e| e.value().clone()).collect();
        roster.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        roster
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(id: &str, host: &str, status: &str) -> AgentHeartbeat {
        AgentHeartbeat {
            agent_id: id.to_string(),
            host_name: Some(host.to_string()),
            ip: Some("192.168.0.10".to_string()),
            status: Some(status.to_string()),
            timestamp: Some("2024-05-01T12:00:00".to_string()),
        }
    }

    fn registry() -> (AgentRegistry, Arc<Hub<Vec<AgentInfo>>>) {
        let hub = Arc::new(Hub::new("agents", 100));
        (AgentRegistry::new(Arc::clone(&hub)), hub)
    }

    #[test]
    fn test_second_heartbeat_replaces_first() {
        let (registry, _hub) = registry();

        registry.on_heartbeat(heartbeat("a1", "host-vechi", "UP"));
        registry.on_heartbeat(AgentHeartbeat {
            host_name: None,
            ..heartbeat("a1", "host-nou", "DEGRADED")
        });

        let roster = registry.snapshot();
        assert_eq!(roster.len(), 1);
        assert_eq!(registry.agent_count(), 1);
        assert_eq!(roster[0].status.as_deref(), Some("DEGRADED"));
        // Fara merge: campul absent din al doilea heartbeat nu se pastreaza.
        assert_eq!(roster[0].host_name, None);
    }

    #[test]
    fn test_full_roster_broadcast_on_every_update() {
        let (registry, hub) = registry();
        let mut sub = hub.subscribe();

        registry.on_heartbeat(heartbeat("a1", "h1", "UP"));
        registry.on_heartbeat(heartbeat("a2", "h2", "UP"));
        registry.on_heartbeat(heartbeat("a2", "h2", "DOWN"));

        let first = sub.try_recv().unwrap();
        assert_eq!(first.len(), 1);

        let second = sub.try_recv().unwrap();
        assert_eq!(second.len(), 2);

        let third = sub.try_recv().unwrap();
        assert_eq!(third.len(), 2);
        assert_eq!(third[0], heartbeat("a1", "h1", "UP"));
        assert_eq!(third[1].status.as_deref(), Some("DOWN"));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_last_roster_has_every_agent_under_concurrent_heartbeats() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;
        let (registry, hub) = registry();
        let registry = Arc::new(registry);
        let mut sub = hub.subscribe();

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for n in 0..PER_THREAD {
                        registry.on_heartbeat(heartbeat(&format!("a{}-{}", t, n), "h", "UP"));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let rosters: Vec<Vec<AgentInfo>> = std::iter::from_fn(|| sub.try_recv()).collect();
        assert_eq!(rosters.len(), THREADS * PER_THREAD);
        // Agenti distincti: fiecare roster are exact un agent in plus.
        for (i, roster) in rosters.iter().enumerate() {
            assert_eq!(roster.len(), i + 1);
        }
        assert_eq!(registry.agent_count(), THREADS * PER_THREAD);
    }

    #[test]
    fn test_heartbeat_wire_format() {
        let json = r#"{"agentId":"a9","hostName":"sonda-9","ip":"10.1.1.1","status":"UP","timestamp":"t"}"#;
        let hb: AgentHeartbeat = serde_json::from_str(json).unwrap();

        assert_eq!(hb.agent_id, "a9");
        assert_eq!(hb.host_name.as_deref(), Some("sonda-9"));

        let missing_id = serde_json::from_str::<AgentHeartbeat>(r#"{"status":"UP"}"#);
        assert!(missing_id.is_err());
    }
}
