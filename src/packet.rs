// =============================================================================
// packet.rs - Modelul de date al pachetelor + Normalizer
// =============================================================================
//
// Fluxul unui pachet raportat de un agent:
//
//   PacketFields (JSON de la agent, toate campurile optionale)
//        |  normalize() / normalize_batch()
//        v
//   NormalizedPacket (string-uri curatate de NUL, metadate mostenite din lot)
//        |  PacketStore::save / save_all
//        v
//   PacketRecord (id + received_at atribuite la persistenta, read-only)
//
// CONCEPTE RUST EXPLICATE:
//
// 1. NEWTYPE cu constructor privat
//    `NormalizedPacket(PacketFields)` are campul privat modulului. Singura
//    cale de a obtine unul este prin normalizare, deci tipul garanteaza
//    la compile-time ca nimic nenormalizat nu ajunge la store.
//
// 2. #[serde(flatten)]
//    PacketRecord contine PacketFields "aplatizat": in JSON campurile apar
//    la acelasi nivel cu `id` si `receivedAt`, exact ca entitatea originala.
//
// =============================================================================

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Campurile unui pachet capturat, asa cum le trimite agentul.
///
/// Numele JSON sunt camelCase (`srcIp`, `dstPort`), cu exceptia adreselor
/// MAC care pastreaza ortografia `srcMAC` / `dstMAC` a agentilor existenti.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketFields {
    /// Timestamp-ul capturii, raportat de agent (text liber).
    pub timestamp: Option<String>,

    // Ethernet
    #[serde(rename = "srcMAC")]
    pub src_mac: Option<String>,
    #[serde(rename = "dstMAC")]
    pub dst_mac: Option<String>,

    // ARP
    pub arp_op: Option<String>,
    pub arp_src_ip: Option<String>,
    pub arp_dst_ip: Option<String>,

    // IP
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub protocol: Option<String>,
    pub ttl: Option<i32>,
    pub ip_flags: Option<String>,

    // TCP
    pub src_port: Option<i32>,
    pub dst_port: Option<i32>,
    pub seq: Option<i64>,
    pub tcp_flags: Option<String>,

    // UDP
    pub udp_len: Option<i32>,

    // ICMP
    pub icmp_type: Option<i32>,
    pub icmp_code: Option<i32>,

    // DNS
    pub dns_query_name: Option<String>,
    pub dns_query_type: Option<String>,
    pub dns_answer: Option<String>,

    // Nivel aplicatie
    pub payload: Option<String>,
    pub http_info: Option<String>,
    pub tls_info: Option<String>,

    pub length: Option<i32>,
    pub packet_type: Option<String>,

    // Metadate agent
    pub agent_id: Option<String>,
    pub host_name: Option<String>,
    pub interface_name: Option<String>,
}

/// Pachet individual inainte de normalizare.
pub type PacketDraft = PacketFields;

/// Envelope de lot: metadate implicite + lista ordonata de pachete.
///
/// `packets` este Option deoarece un lot fara lista este MALFORMAT si
/// trebuie respins explicit (nu tratat ca lot gol).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketBatch {
    pub agent_id: Option<String>,
    pub host_name: Option<String>,
    pub interface_name: Option<String>,
    pub packets: Option<Vec<PacketDraft>>,
}

/// Pachet normalizat, gata de persistenta.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPacket(PacketFields);

impl NormalizedPacket {
    pub fn into_fields(self) -> PacketFields {
        self.0
    }
}

/// Inregistrare persistata: identitate + momentul receptiei + campurile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketRecord {
    pub id: i64,
    pub received_at: DateTime<Local>,
    #[serde(flatten)]
    pub fields: PacketFields,
}

impl PacketRecord {
    pub fn src_ip(&self) -> Option<&str> {
        self.fields.src_ip.as_deref()
    }

    pub fn dst_port(&self) -> Option<i32> {
        self.fields.dst_port
    }
}

// =============================================================================
// Normalizer
// =============================================================================

/// Elimina octetii NUL dintr-un string; restul ramane identic octet cu octet.
///
/// NUL corupe coloanele TEXT din store si protocoalele text din aval.
fn clean(value: Option<String>) -> Option<String> {
    value.map(|s| {
        if s.contains('\0') {
            s.replace('\0', "")
        } else {
            s
        }
    })
}

/// "Blank" = absent, gol sau doar spatii.
fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Completeaza `field` cu valoarea de lot daca este blank.
fn inherit(field: &mut Option<String>, batch_value: &Option<String>) {
    if is_blank(field) {
        *field = batch_value.clone();
    }
}

/// Normalizeaza un singur pachet: curata toate campurile text.
/// Campurile numerice trec neschimbate (fara coercitie sau validare).
pub fn normalize(draft: PacketDraft) -> NormalizedPacket {
    let d = draft;
    NormalizedPacket(PacketFields {
        timestamp: clean(d.timestamp),
        src_mac: clean(d.src_mac),
        dst_mac: clean(d.dst_mac),
        arp_op: clean(d.arp_op),
        arp_src_ip: clean(d.arp_src_ip),
        arp_dst_ip: clean(d.arp_dst_ip),
        src_ip: clean(d.src_ip),
        dst_ip: clean(d.dst_ip),
        protocol: clean(d.protocol),
        ttl: d.ttl,
        ip_flags: clean(d.ip_flags),
        src_port: d.src_port,
        dst_port: d.dst_port,
        seq: d.seq,
        tcp_flags: clean(d.tcp_flags),
        udp_len: d.udp_len,
        icmp_type: d.icmp_type,
        icmp_code: d.icmp_code,
        dns_query_name: clean(d.dns_query_name),
        dns_query_type: clean(d.dns_query_type),
        dns_answer: clean(d.dns_answer),
        payload: clean(d.payload),
        http_info: clean(d.http_info),
        tls_info: clean(d.tls_info),
        length: d.length,
        packet_type: clean(d.packet_type),
        agent_id: clean(d.agent_id),
        host_name: clean(d.host_name),
        interface_name: clean(d.interface_name),
    })
}

/// Normalizeaza un lot intreg.
///
/// Fiecare pachet cu agentId / hostName / interfaceName blank mosteneste
/// valoarea de la nivel de lot (care poate fi ea insasi goala), apoi trece
/// prin `normalize`. Ordinea pachetelor este pastrata.
///
/// Returneaza `None` daca lotul nu are lista `packets`.
pub fn normalize_batch(batch: PacketBatch) -> Option<Vec<NormalizedPacket>> {
    let PacketBatch {
        agent_id,
        host_name,
        interface_name,
        packets,
    } = batch;

    let normalized = packets?
        .into_iter()
        .map(|mut draft| {
            inherit(&mut draft.agent_id, &agent_id);
            inherit(&mut draft.host_name, &host_name);
            inherit(&mut draft.interface_name, &interface_name);
            normalize(draft)
        })
        .collect();

    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(agent: Option<&str>, host: Option<&str>, iface: Option<&str>) -> PacketDraft {
        PacketDraft {
            agent_id: agent.map(str::to_string),
            host_name: host.map(str::to_string),
            interface_name: iface.map(str::to_string),
            src_ip: Some("10.0.0.1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_nul_bytes_removed_rest_identical() {
        let mut d = PacketDraft::default();
        d.payload = Some("GET /\0index\0.html ăîș".to_string());
        d.dns_answer = Some("\0".to_string());
        d.http_info = Some("curat".to_string());

        let n = normalize(d);
        assert_eq!(n.0.payload.as_deref(), Some("GET /index.html ăîș"));
        assert_eq!(n.0.dns_answer.as_deref(), Some(""));
        assert_eq!(n.0.http_info.as_deref(), Some("curat"));
    }

    #[test]
    fn test_numeric_fields_pass_through() {
        let mut d = PacketDraft::default();
        d.ttl = Some(-1);
        d.dst_port = Some(70_000);
        d.seq = Some(i64::MAX);

        let n = normalize(d.clone());
        assert_eq!(n.0.ttl, Some(-1));
        assert_eq!(n.0.dst_port, Some(70_000));
        assert_eq!(n.0.seq, Some(i64::MAX));
    }

    #[test]
    fn test_batch_inherits_blank_metadata() {
        let batch = PacketBatch {
            agent_id: Some("agent-lot".to_string()),
            host_name: Some("host-lot".to_string()),
            interface_name: Some("eth0".to_string()),
            packets: Some(vec![
                draft(None, Some("   "), Some("")),
                draft(Some("agent-propriu"), Some("host-propriu"), Some("wlan0")),
            ]),
        };

        let out = normalize_batch(batch).unwrap();
        assert_eq!(out.len(), 2);

        let first = &out[0].0;
        assert_eq!(first.agent_id.as_deref(), Some("agent-lot"));
        assert_eq!(first.host_name.as_deref(), Some("host-lot"));
        assert_eq!(first.interface_name.as_deref(), Some("eth0"));

        let second = &out[1].0;
        assert_eq!(second.agent_id.as_deref(), Some("agent-propriu"));
        assert_eq!(second.host_name.as_deref(), Some("host-propriu"));
        assert_eq!(second.interface_name.as_deref(), Some("wlan0"));
    }

    #[test]
    fn test_batch_level_value_may_be_empty() {
        let batch = PacketBatch {
            agent_id: None,
            host_name: Some(String::new()),
            interface_name: None,
            packets: Some(vec![draft(None, None, None)]),
        };

        let out = normalize_batch(batch).unwrap();
        assert_eq!(out[0].0.agent_id, None);
        assert_eq!(out[0].0.host_name.as_deref(), Some(""));
    }

    #[test]
    fn test_inherited_metadata_is_cleaned() {
        let batch = PacketBatch {
            agent_id: Some("ag\0ent".to_string()),
            packets: Some(vec![draft(None, None, None)]),
            ..Default::default()
        };

        let out = normalize_batch(batch).unwrap();
        assert_eq!(out[0].0.agent_id.as_deref(), Some("agent"));
    }

    #[test]
    fn test_batch_without_packets_is_malformed() {
        let batch: PacketBatch = serde_json::from_str(r#"{"agentId":"a1"}"#).unwrap();
        assert!(normalize_batch(batch).is_none());
    }

    #[test]
    fn test_wire_names() {
        let json = r#"{"srcMAC":"aa:bb","srcIp":"1.2.3.4","dstPort":443,"packetType":"TCP"}"#;
        let d: PacketDraft = serde_json::from_str(json).unwrap();
        assert_eq!(d.src_mac.as_deref(), Some("aa:bb"));
        assert_eq!(d.src_ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(d.dst_port, Some(443));

        let record = PacketRecord {
            id: 7,
            received_at: Local::now(),
            fields: d,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["srcMAC"], "aa:bb");
        assert_eq!(value["packetType"], "TCP");
        assert!(value.get("receivedAt").is_some());
    }
}
