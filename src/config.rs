// =============================================================================
// config.rs - Modul de Configurare
// =============================================================================
//
// Sectiunile din config.toml:
//   [server]     - API-ul HTTP (ingestie, interogari, stream-uri live)
//   [broker]     - endpoint-urile UDP catre/dinspre broker + numele topic-urilor
//   [detection]  - pragurile celor doi detectori (port scan, traffic spike)
//   [broadcast]  - pragul de avertizare pentru abonatii lenti
//   [store]      - limita de retentie a backend-ului in memorie
//   [stats]      - perioada liniei de statistici din consola
//
// CONCEPTE RUST EXPLICATE:
//
// 1. #[serde(default = "...")]
//    Campurile lipsa din TOML sunt completate de o functie. Astfel valorile
//    implicite ale detectorilor (30 / 500 / 10s) exista intr-un singur loc.
//
// 2. VALIDARE POST-DESERIALIZARE
//    serde verifica doar tipurile. AppConfig::validate() verifica semantica
//    si colecteaza TOATE erorile intr-un Vec<String>, raportate simultan.
//
// =============================================================================

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Structura principala de configurare a aplicatiei.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub listen_address: String,
    pub listen_port: u16,
    /// Cate inregistrari returneaza `GET /api/v1/packets` (ordonate dupa timestamp).
    #[serde(default = "default_latest_limit")]
    pub latest_limit: usize,
}

/// Configurare broker extern.
///
/// `listen_*` = unde primim envelope-uri (heartbeat-uri, agregari analitice).
/// `host`/`port` = unde publicam pachetele, alertele si heartbeat-urile.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub enabled: bool,
    pub listen_address: String,
    pub listen_port: u16,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub topics: TopicConfig,
}

/// Un topic per clasa de mesaj.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub packets: String,
    pub alerts: String,
    pub heartbeats: String,
    pub top_talkers: String,
    pub top_ports: String,
    pub protocol_stats: String,
    pub raw_packets: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            packets: "packet-events".to_string(),
            alerts: "netwatch.alerts".to_string(),
            heartbeats: "netwatch.agent-heartbeat".to_string(),
            top_talkers: "netwatch.top-talkers".to_string(),
            top_ports: "netwatch.top-ports".to_string(),
            protocol_stats: "netwatch.protocol-stats".to_string(),
            raw_packets: "netwatch.raw-packets".to_string(),
        }
    }
}

impl TopicConfig {
    /// Toate topic-urile, cu numele cheii TOML (pentru mesaje de validare).
    fn entries(&self) -> [(&'static str, &str); 7] {
        [
            ("packets", &self.packets),
            ("alerts", &self.alerts),
            ("heartbeats", &self.heartbeats),
            ("top_talkers", &self.top_talkers),
            ("top_ports", &self.top_ports),
            ("protocol_stats", &self.protocol_stats),
            ("raw_packets", &self.raw_packets),
        ]
    }
}

/// Pragurile detectorilor.
///
/// Port scan: numar de porturi destinatie DISTINCTE, fara limita de timp.
/// Traffic spike: numar de pachete in fereastra glisanta de `spike_window_secs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub port_scan_threshold: usize,
    pub spike_threshold: usize,
    pub spike_window_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            port_scan_threshold: 30,
            spike_threshold: 500,
            spike_window_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Numarul de elemente nelivrate per abonat peste care logam un avertisment.
    /// NU este o limita: nimic nu se pierde, coada creste in continuare.
    pub high_water_mark: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            high_water_mark: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 0 = nelimitat.
    pub max_records: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

fn default_latest_limit() -> usize {
    30_000
}

impl AppConfig {
    /// Incarca si parseaza fisierul de configurare TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Nu pot citi fisierul: {:?}", path.as_ref()))?;

        Self::from_toml(&content)
    }

    /// Parseaza + valideaza continutul TOML (separat de `load` pentru teste).
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).context("Eroare la parsarea fisierului TOML")?;

        config.validate()?;

        Ok(config)
    }

    /// Valideaza constrangerile semantice ale configuratiei.
    ///
    /// NOTA RUST: `anyhow::bail!` este echivalent cu
    /// `return Err(anyhow::anyhow!(...))`.
    fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // --- Server ---

        if self.server.listen_port == 0 {
            errors.push("server.listen_port = 0 este invalid".to_string());
        }
        if self.server.listen_address.is_empty() {
            errors.push("server.listen_address nu poate fi gol".to_string());
        }
        if self.server.latest_limit == 0 {
            errors.push(
                "server.latest_limit = 0: interogarea implicita nu ar returna nimic".to_string(),
            );
        }

        // --- Broker ---

        if self.broker.enabled {
            if self.broker.listen_port == 0 {
                errors.push("broker.listen_port = 0 este invalid".to_string());
            }
            if self.broker.listen_address.is_empty() {
                errors.push(
                    "broker.listen_address nu poate fi gol cand broker-ul este activat"
                        .to_string(),
                );
            }
            if self.broker.port == 0 {
                errors.push("broker.port = 0 este invalid".to_string());
            }
            if self.broker.host.is_empty() {
                errors.push(
                    "broker.host nu poate fi gol cand broker-ul este activat".to_string(),
                );
            }
        }

        // Topic-urile trebuie sa fie nenule si distincte: rutarea inbound
        // se face exclusiv dupa nume.
        let mut seen: HashSet<&str> = HashSet::new();
        for (key, topic) in self.broker.topics.entries() {
            if topic.is_empty() {
                errors.push(format!("broker.topics.{} nu poate fi gol", key));
            } else if !seen.insert(topic) {
                errors.push(format!(
                    "broker.topics.{} = {:?} este folosit de mai multe clase de mesaje",
                    key, topic
                ));
            }
        }

        // --- Detection ---

        if self.detection.port_scan_threshold == 0 {
            errors.push(
                "detection.port_scan_threshold = 0: orice pachet ar declansa PORT_SCAN"
                    .to_string(),
            );
        }
        if self.detection.spike_threshold == 0 {
            errors.push(
                "detection.spike_threshold = 0: orice pachet ar declansa TRAFFIC_SPIKE"
                    .to_string(),
            );
        }
        if self.detection.spike_window_secs == 0 {
            errors.push(
                "detection.spike_window_secs = 0: fereastra de timp zero face detectia imposibila"
                    .to_string(),
            );
        }

        // --- Broadcast / Stats ---

        if self.broadcast.high_water_mark == 0 {
            errors.push(
                "broadcast.high_water_mark = 0: fiecare publicare ar genera un avertisment"
                    .to_string(),
            );
        }
        if self.stats.interval_secs == 0 {
            errors.push("stats.interval_secs = 0 este invalid".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            let listing = errors
                .iter()
                .enumerate()
                .map(|(i, e)| format!("  {}. {}", i + 1, e))
                .collect::<Vec<_>>()
                .join("\n");
            anyhow::bail!(
                "config.toml contine {} erori de configurare:\n{}",
                errors.len(),
                listing
            );
        }
    }
}
