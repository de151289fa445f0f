// =============================================================================
// detector.rs - Motor de Detectie Anomalii per IP Sursa
// =============================================================================
//
// Doi detectori independenti, cheiati dupa IP-ul sursa al pachetului:
//
//   1. PORT_SCAN     - multimea porturilor destinatie DISTINCTE vazute de la
//                      un IP. Cand ajunge la prag (implicit 30) -> alerta,
//                      apoi multimea se goleste. FARA limita de timp: multimea
//                      persista pana la prag sau pana la repornirea procesului.
//
//   2. TRAFFIC_SPIKE - coada momentelor de sosire (ceasul LOCAL de procesare,
//                      nu timestamp-ul capturii). La fiecare pachet se elimina
//                      din fata momentele mai vechi de fereastra (implicit 10s).
//                      Daca raman PESTE prag (implicit 500) -> alerta, apoi
//                      coada se goleste complet.
//
// Cele doua stari sunt in DashMap-uri SEPARATE: resetarea unuia nu atinge
// niciodata starea celuilalt. Un pachet fara IP sursa este ignorat de ambii
// detectori (nu se creeaza stare). Nu exista expirare pe timer: starea unui
// IP traieste cat procesul.
//
// CONCURENTA:
//   Read-modify-write-ul pe un IP (insert + verificare prag + golire) se face
//   sub guard-ul de shard al DashMap-ului obtinut prin `.entry()`. Doua
//   pachete concurente de la acelasi IP sunt astfel serializate: pragul este
//   observat o singura data si golirea nu se intercaleaza cu o citire.
//   IP-uri diferite (shard-uri diferite) nu se blocheaza reciproc.
//
// =============================================================================

use crate::config::DetectionConfig;
use crate::packet::PacketRecord;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

// =============================================================================
// Structuri de date
// =============================================================================

/// Tipul anomaliei + valoarea metricii care a declansat-o.
///
/// NOTA RUST: `#[serde(tag = "type")]` produce JSON "internally tagged":
///   {"type": "PORT_SCAN", "uniquePortsCount": 30}
/// Fiecare varianta isi are propriul nume de camp pentru metrica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlertKind {
    #[serde(rename = "PORT_SCAN")]
    PortScan {
        #[serde(rename = "uniquePortsCount")]
        unique_ports: usize,
    },
    #[serde(rename = "TRAFFIC_SPIKE")]
    TrafficSpike {
        #[serde(rename = "packetCountLast10s")]
        packet_count: usize,
    },
}

impl AlertKind {
    /// Metrica ce a declansat alerta (porturi distincte / pachete in fereastra).
    pub fn metric(&self) -> usize {
        match self {
            AlertKind::PortScan { unique_ports } => *unique_ports,
            AlertKind::TrafficSpike { packet_count } => *packet_count,
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::PortScan { .. } => write!(f, "PORT_SCAN"),
            AlertKind::TrafficSpike { .. } => write!(f, "TRAFFIC_SPIKE"),
        }
    }
}

/// Alerta emisa de detector. Valoare imutabila, publicata pe canalul
/// outbound si pe canalul live `alerts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(flatten)]
    pub kind: AlertKind,
    pub message: String,
    pub src_ip: String,
    /// Momentul detectiei, serializat ca epoch millis.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub detected_at: DateTime<Utc>,
}

impl Alert {
    fn port_scan(src_ip: &str, unique_ports: usize) -> Self {
        Self {
            kind: AlertKind::PortScan { unique_ports },
            message: "Port scan suspected".to_string(),
            src_ip: src_ip.to_string(),
            detected_at: Utc::now(),
        }
    }

    fn traffic_spike(src_ip: &str, packet_count: usize) -> Self {
        Self {
            kind: AlertKind::TrafficSpike { packet_count },
            message: "Traffic spike detected".to_string(),
            src_ip: src_ip.to_string(),
            detected_at: Utc::now(),
        }
    }
}

// =============================================================================
// Detector
// =============================================================================

pub struct Detector {
    /// Porturi destinatie distincte per IP sursa (PORT_SCAN).
    ports: DashMap<String, HashSet<i32>>,

    /// Momentele de sosire per IP sursa, cele mai vechi in fata (TRAFFIC_SPIKE).
    arrivals: DashMap<String, VecDeque<Instant>>,

    config: DetectionConfig,
}

impl Detector {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            ports: DashMap::new(),
            arrivals: DashMap::new(),
            config,
        }
    }

    /// Proceseaza o inregistrare persistata la momentul curent.
    pub fn process(&self, record: &PacketRecord) -> Vec<Alert> {
        self.process_at(record, Instant::now())
    }

    /// Ca `process`, cu momentul de sosire explicit.
    ///
    /// Apelantii trebuie sa furnizeze momente nedescrescatoare per IP
    /// (ordinea locala de procesare).
    pub fn process_at(&self, record: &PacketRecord, now: Instant) -> Vec<Alert> {
        let ip = match record.src_ip() {
            Some(ip) if !ip.is_empty() => ip,
            _ => return Vec::new(),
        };

        let mut alerts = Vec::new();

        if let Some(port) = record.dst_port() {
            if let Some(alert) = self.check_port_scan(ip, port) {
                alerts.push(alert);
            }
        }

        if let Some(alert) = self.check_traffic_spike(ip, now) {
            alerts.push(alert);
        }

        alerts
    }

    /// Adauga portul si verifica pragul PORT_SCAN.
    ///
    /// NOTA RUST: `entry(..).or_default()` returneaza un `RefMut` care tine
    /// lock-ul de scriere al shard-ului pana la sfarsitul functiei. Tot
    /// read-modify-write-ul de mai jos este atomic pentru acest IP.
    fn check_port_scan(&self, ip: &str, port: i32) -> Option<Alert> {
        let mut seen = self.ports.entry(ip.to_string()).or_default();
        seen.insert(port);

        if seen.len() >= self.config.port_scan_threshold {
            let alert = Alert::port_scan(ip, seen.len());
            seen.clear();
            Some(alert)
        } else {
            None
        }
    }

    /// Inregistreaza sosirea, scurteaza fereastra si verifica pragul TRAFFIC_SPIKE.
    fn check_traffic_spike(&self, ip: &str, now: Instant) -> Option<Alert> {
        let window = Duration::from_secs(self.config.spike_window_secs);
        let mut queue = self.arrivals.entry(ip.to_string()).or_default();
        queue.push_back(now);

        // Un moment aflat la exact `window` distanta este deja in afara ferestrei.
        while let Some(&oldest) = queue.front() {
            if now.saturating_duration_since(oldest) >= window {
                queue.pop_front();
            } else {
                break;
            }
        }

        if queue.len() > self.config.spike_threshold {
            let alert = Alert::traffic_spike(ip, queue.len());
            queue.clear();
            Some(alert)
        } else {
            None
        }
    }

    /// Numarul de IP-uri sursa urmarite (orice pachet cu IP creeaza intrare
    /// in `arrivals`).
    pub fn tracked_ips(&self) -> usize {
        self.arrivals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketFields;
    use chrono::Local;
    use std::sync::Arc;

    fn make_record(ip: Option<&str>, port: Option<i32>) -> PacketRecord {
        PacketRecord {
            id: 1,
            received_at: Local::now(),
            fields: PacketFields {
                src_ip: ip.map(str::to_string),
                dst_port: port,
                ..Default::default()
            },
        }
    }

    fn detector() -> Detector {
        Detector::new(DetectionConfig::default())
    }

    #[test]
    fn test_port_scan_fires_at_30_and_restarts_from_one() {
        let detector = detector();
        let t0 = Instant::now();
        let mut fired = Vec::new();

        for port in 1..=30 {
            fired.extend(detector.process_at(&make_record(Some("10.0.0.1"), Some(port)), t0));
        }

        assert_eq!(fired.len(), 1, "Trebuia exact o alerta PORT_SCAN");
        assert_eq!(fired[0].kind, AlertKind::PortScan { unique_ports: 30 });
        assert_eq!(fired[0].src_ip, "10.0.0.1");

        // Al 31-lea port distinct porneste o numaratoare noua de la 1.
        let alerts = detector.process_at(&make_record(Some("10.0.0.1"), Some(31)), t0);
        assert!(alerts.is_empty());
        assert_eq!(detector.ports.get("10.0.0.1").unwrap().len(), 1);
    }

    #[test]
    fn test_repeated_port_not_counted_twice() {
        let detector = detector();
        let t0 = Instant::now();

        for _ in 0..100 {
            let alerts = detector.process_at(&make_record(Some("10.0.0.2"), Some(22)), t0);
            assert!(alerts.iter().all(|a| !matches!(a.kind, AlertKind::PortScan { .. })));
        }
        assert_eq!(detector.ports.get("10.0.0.2").unwrap().len(), 1);
    }

    #[test]
    fn test_port_scan_has_no_time_bound() {
        let detector = detector();
        let t0 = Instant::now();

        // 29 porturi, apoi o pauza de o ora: multimea persista.
        for port in 1..=29 {
            detector.process_at(&make_record(Some("10.0.0.3"), Some(port)), t0);
        }
        let later = t0 + Duration::from_secs(3_600);
        let alerts = detector.process_at(&make_record(Some("10.0.0.3"), Some(30)), later);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind.metric(), 30);
    }

    #[test]
    fn test_traffic_spike_fires_at_501_then_resets() {
        let detector = detector();
        let t0 = Instant::now();
        let mut fired = Vec::new();

        // 501 pachete intr-un interval de 8 secunde.
        for i in 0..501u64 {
            let now = t0 + Duration::from_millis(i * 16);
            fired.extend(detector.process_at(&make_record(Some("10.0.0.4"), None), now));
        }

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, AlertKind::TrafficSpike { packet_count: 501 });
        assert!(detector.arrivals.get("10.0.0.4").unwrap().is_empty());

        // Urmatorul pachet porneste o fereastra noua de dimensiune 1.
        detector.process_at(&make_record(Some("10.0.0.4"), None), t0 + Duration::from_secs(8));
        assert_eq!(detector.arrivals.get("10.0.0.4").unwrap().len(), 1);
    }

    #[test]
    fn test_exactly_500_in_window_does_not_fire() {
        let detector = detector();
        let t0 = Instant::now();

        for _ in 0..500 {
            let alerts = detector.process_at(&make_record(Some("10.0.0.5"), None), t0);
            assert!(alerts.is_empty());
        }
    }

    #[test]
    fn test_window_boundary_excludes_exactly_ten_seconds() {
        let detector = detector();
        let t0 = Instant::now();

        detector.process_at(&make_record(Some("10.0.0.6"), None), t0);
        detector.process_at(
            &make_record(Some("10.0.0.6"), None),
            t0 + Duration::from_millis(9_999),
        );
        assert_eq!(detector.arrivals.get("10.0.0.6").unwrap().len(), 2);

        detector.process_at(&make_record(Some("10.0.0.6"), None), t0 + Duration::from_secs(10));
        let queue = detector.arrivals.get("10.0.0.6").unwrap();
        assert_eq!(queue.len(), 2, "Sosirea de la t0 trebuia eliminata la exact 10s");
        assert_eq!(queue[0], t0 + Duration::from_millis(9_999));
    }

    #[test]
    fn test_spread_out_traffic_never_fires() {
        let detector = detector();
        let t0 = Instant::now();

        // 2000 de pachete la 50ms distanta = 200 in orice fereastra de 10s.
        for i in 0..2_000u64 {
            let now = t0 + Duration::from_millis(i * 50);
            let alerts = detector.process_at(&make_record(Some("10.0.0.7"), None), now);
            assert!(alerts.is_empty());
        }
    }

    #[test]
    fn test_resets_are_independent() {
        let detector = detector();
        let t0 = Instant::now();

        for port in 1..=10 {
            detector.process_at(&make_record(Some("10.0.0.8"), Some(port)), t0);
        }
        // Declansam TRAFFIC_SPIKE cu acelasi port (nu creste multimea).
        let mut spike = false;
        for _ in 0..500 {
            let alerts = detector.process_at(&make_record(Some("10.0.0.8"), Some(1)), t0);
            spike |= alerts
                .iter()
                .any(|a| matches!(a.kind, AlertKind::TrafficSpike { .. }));
        }

        assert!(spike);
        assert_eq!(detector.ports.get("10.0.0.8").unwrap().len(), 10);
    }

    #[test]
    fn test_missing_source_ip_ignored() {
        let detector = detector();

        for port in 1..=100 {
            assert!(detector.process(&make_record(None, Some(port))).is_empty());
            assert!(detector.process(&make_record(Some(""), Some(port))).is_empty());
        }
        assert_eq!(detector.tracked_ips(), 0);
        assert!(detector.ports.is_empty());
    }

    #[test]
    fn test_different_ips_tracked_separately() {
        let detector = detector();
        let t0 = Instant::now();

        for port in 1..=29 {
            detector.process_at(&make_record(Some("10.0.0.9"), Some(port)), t0);
            detector.process_at(&make_record(Some("10.0.0.10"), Some(port)), t0);
        }

        assert_eq!(detector.tracked_ips(), 2);
        let alerts = detector.process_at(&make_record(Some("10.0.0.9"), Some(99)), t0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(detector.ports.get("10.0.0.10").unwrap().len(), 29);
    }

    #[test]
    fn test_concurrent_same_ip_fires_once_per_threshold() {
        let detector = Arc::new(detector());
        let t0 = Instant::now();

        // 4 thread-uri x 30 porturi distincte = 120 porturi = exact 4 alerte.
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let detector = Arc::clone(&detector);
                std::thread::spawn(move || {
                    let mut count = 0;
                    for p in 0..30 {
                        let record = make_record(Some("10.9.9.9"), Some(t * 1_000 + p));
                        count += detector
                            .process_at(&record, t0)
                            .iter()
                            .filter(|a| matches!(a.kind, AlertKind::PortScan { .. }))
                            .count();
                    }
                    count
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_alert_wire_shape() {
        let alert = Alert::port_scan("1.2.3.4", 30);
        let value = serde_json::to_value(&alert).unwrap();

        assert_eq!(value["type"], "PORT_SCAN");
        assert_eq!(value["message"], "Port scan suspected");
        assert_eq!(value["srcIp"], "1.2.3.4");
        assert_eq!(value["uniquePortsCount"], 30);
        assert!(value["detectedAt"].is_i64());

        let spike = serde_json::to_value(Alert::traffic_spike("1.2.3.4", 501)).unwrap();
        assert_eq!(spike["type"], "TRAFFIC_SPIKE");
        assert_eq!(spike["packetCountLast10s"], 501);
    }
}
