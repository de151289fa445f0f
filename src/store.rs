// =============================================================================
// store.rs - Adaptorul de persistenta
// =============================================================================
//
// Store-ul durabil (un tabel relational) este un colaborator extern; aici
// definim doar contractul lui (`PacketStore`) si un backend in memorie
// folosit implicit de binar si de teste.
//
// Contract:
//   - save / save_all atribuie identitatea (id crescator) si received_at
//   - save_all este tot-sau-nimic: fie toate inregistrarile, fie eroare
//   - doua interogari "ultimele N", pe ordonari DIFERITE (timestamp vs id),
//     deoarece timestamp-ul capturii nu coincide cu ordinea insertiei
//
// Operatiile sunt SINCRONE si pot bloca: apelantii async le ruleaza pe
// `spawn_blocking`.
//
// =============================================================================

use crate::error::StoreError;
use crate::packet::{NormalizedPacket, PacketRecord};
use chrono::Local;
use dashmap::DashMap;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicI64, Ordering};

/// Contractul store-ului durabil.
///
/// NOTA RUST: `Send + Sync` permite `Arc<dyn PacketStore>` partajat intre
/// worker-ii de ingestie si handler-ele HTTP.
pub trait PacketStore: Send + Sync {
    /// Persista un pachet si returneaza inregistrarea cu identitate.
    fn save(&self, packet: NormalizedPacket) -> Result<PacketRecord, StoreError>;

    /// Persista un lot ca unitate. Ordinea rezultatului = ordinea intrarii.
    fn save_all(&self, packets: Vec<NormalizedPacket>) -> Result<Vec<PacketRecord>, StoreError>;

    /// Ultimele `limit` inregistrari, descrescator dupa timestamp-ul capturii.
    fn latest_by_timestamp(&self, limit: usize) -> Result<Vec<PacketRecord>, StoreError>;

    /// Ultimele `limit` inregistrari, descrescator dupa identitate.
    fn latest_by_id(&self, limit: usize) -> Result<Vec<PacketRecord>, StoreError>;

    /// Numarul de inregistrari pastrate (pentru statistici).
    fn count(&self) -> usize;
}

/// Backend in memorie: DashMap indexat dupa id.
pub struct MemoryStore {
    records: DashMap<i64, PacketRecord>,
    next_id: AtomicI64,
    /// Cea mai mica identitate inca pastrata. Identitatile sunt consecutive,
    /// deci retentia elimina intervalul `[retained_from, prag)` fara sortare.
    retained_from: AtomicI64,
    /// 0 = nelimitat.
    max_records: usize,
}

impl MemoryStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
            retained_from: AtomicI64::new(1),
            max_records,
        }
    }

    /// Rezerva `n` identitati consecutive si returneaza prima.
    ///
    /// NOTA RUST: `fetch_add` este atomic - doua loturi concurente primesc
    /// intervale disjuncte fara lock.
    fn reserve_ids(&self, n: usize) -> i64 {
        self.next_id.fetch_add(n as i64, Ordering::Relaxed)
    }

    fn to_record(id: i64, packet: NormalizedPacket) -> PacketRecord {
        PacketRecord {
            id,
            received_at: Local::now(),
            fields: packet.into_fields(),
        }
    }

    /// Aplica limita de retentie dupa inserarea identitatilor `first..=newest`.
    ///
    /// Se pastreaza doar ultimele `max_records` identitati emise pana la
    /// `newest`; intervalul de sub prag este eliminat o singura data, de
    /// apelantul care avanseaza `retained_from`.
    fn enforce_retention(&self, first: i64, newest: i64) {
        if self.max_records == 0 {
            return;
        }
        let floor = newest - self.max_records as i64 + 1;

        let mut current = self.retained_from.load(Ordering::SeqCst);
        while current < floor {
            match self.retained_from.compare_exchange(
                current,
                floor,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    for id in current..floor {
                        self.records.remove(&id);
                    }
                    break;
                }
                Err(actual) => current = actual,
            }
        }

        // Un salvator mai lent poate insera dupa ce altul a avansat pragul.
        let floor = self.retained_from.load(Ordering::SeqCst);
        for id in first..floor.min(newest + 1) {
            self.records.remove(&id);
        }
    }

    fn snapshot(&self) -> Vec<PacketRecord> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }
}

/// Timestamp descrescator; pachetele fara timestamp la final; egalitate -> id desc.
fn by_timestamp_desc(a: &PacketRecord, b: &PacketRecord) -> CmpOrdering {
    match (&a.fields.timestamp, &b.fields.timestamp) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
    .then_with(|| b.id.cmp(&a.id))
}

impl PacketStore for MemoryStore {
    fn save(&self, packet: NormalizedPacket) -> Result<PacketRecord, StoreError> {
        let id = self.reserve_ids(1);
        let record = Self::to_record(id, packet);
        self.records.insert(id, record.clone());
        self.enforce_retention(id, id);
        Ok(record)
    }

    fn save_all(&self, packets: Vec<NormalizedPacket>) -> Result<Vec<PacketRecord>, StoreError> {
        if packets.is_empty() {
            return Ok(Vec::new());
        }
        // Un lot mai mare decat limita de retentie ar fi trunchiat imediat
        // dupa confirmare; il respingem intreg.
        if self.max_records > 0 && packets.len() > self.max_records {
            return Err(StoreError::Rejected(format!(
                "lot de {} pachete peste limita de retentie {}",
                packets.len(),
                self.max_records
            )));
        }

        let first = self.reserve_ids(packets.len());
        let saved: Vec<PacketRecord> = packets
            .into_iter()
            .enumerate()
            .map(|(i, p)| Self::to_record(first + i as i64, p))
            .collect();

        for record in &saved {
            self.records.insert(record.id, record.clone());
        }
        self.enforce_retention(first, first + saved.len() as i64 - 1);
        Ok(saved)
    }

    fn latest_by_timestamp(&self, limit: usize) -> Result<Vec<PacketRecord>, StoreError> {
        let mut all = self.snapshot();
        all.sort_by(by_timestamp_desc);
        all.truncate(limit);
        Ok(all)
    }

    fn latest_by_id(&self, limit: usize) -> Result<Vec<PacketRecord>, StoreError> {
        let mut all = self.snapshot();
        all.sort_by(|a, b| b.id.cmp(&a.id));
        all.truncate(limit);
        Ok(all)
    }

    fn count(&self) -> usize {
        self.records.len()
    }
}
