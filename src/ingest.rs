// =============================================================================
// ingest.rs - Orchestrarea ingestiei de pachete
// =============================================================================
//
// Ordinea efectelor pentru fiecare pachet:
//
//   1. normalize            (curatare NUL, mostenire metadate din lot)
//   2. PacketStore::save    (identitate + received_at)
//   3. fan-out, DOAR dupa persistenta reusita:
//        a. Outbound::publish(Packet)     -> broker (best-effort)
//        b. channels.records.publish      -> abonati live
//        c. Detector::process             -> 0..2 alerte
//             - Outbound::publish(Alert)
//             - channels.alerts.publish
//             - display::log_alert
//
// Un lot se persista ca unitate (save_all). Daca persistenta esueaza,
// NIMIC nu este emis. Dupa persistenta, fiecare inregistrare trece prin
// fan-out individual, in ordinea din lot.
//
// Esecurile de fan-out nu ajung la apelant: pachetul este deja salvat.
//
// NOTA RUST: operatiile sunt SINCRONE (store-ul poate bloca). Handler-ele
// HTTP le apeleaza prin `tokio::task::spawn_blocking`.
//
// =============================================================================

use crate::broker::{Outbound, OutboundMessage};
use crate::detector::Detector;
use crate::display;
use crate::error::IngestError;
use crate::hub::LiveChannels;
use crate::packet::{normalize, normalize_batch, PacketBatch, PacketDraft, PacketRecord};
use crate::store::PacketStore;
use std::sync::Arc;

pub struct IngestService {
    store: Arc<dyn PacketStore>,
    outbound: Outbound,
    channels: Arc<LiveChannels>,
    detector: Arc<Detector>,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn PacketStore>,
        outbound: Outbound,
        channels: Arc<LiveChannels>,
        detector: Arc<Detector>,
    ) -> Self {
        Self {
            store,
            outbound,
            channels,
            detector,
        }
    }

    /// Ingestie pachet individual. Returneaza inregistrarea persistata.
    pub fn ingest_one(&self, draft: PacketDraft) -> Result<PacketRecord, IngestError> {
        let record = self.store.save(normalize(draft))?;
        self.fan_out(&record);
        Ok(record)
    }

    /// Ingestie lot. Returneaza numarul de inregistrari persistate.
    ///
    /// Lot fara `packets` -> `IngestError::Validation`, fara persistenta.
    pub fn ingest_batch(&self, batch: PacketBatch) -> Result<usize, IngestError> {
        let agent = batch.agent_id.clone().unwrap_or_default();
        let packets = normalize_batch(batch)
            .ok_or_else(|| IngestError::Validation("campul `packets` lipseste".to_string()))?;

        let records = self.store.save_all(packets)?;
        tracing::debug!(agent = %agent, count = records.len(), "Lot persistat");

        for record in &records {
            self.fan_out(record);
        }
        Ok(records.len())
    }

    pub fn latest_by_timestamp(&self, limit: usize) -> Result<Vec<PacketRecord>, IngestError> {
        Ok(self.store.latest_by_timestamp(limit)?)
    }

    pub fn latest_by_id(&self, limit: usize) -> Result<Vec<PacketRecord>, IngestError> {
        Ok(self.store.latest_by_id(limit)?)
    }

    pub fn stored_count(&self) -> usize {
        self.store.count()
    }

    fn fan_out(&self, record: &PacketRecord) {
        self.outbound.publish(OutboundMessage::Packet(record.clone()));
        self.channels.records.publish(record.clone());

        for alert in self.detector.process(record) {
            display::log_alert(&alert);
            self.outbound.publish(OutboundMessage::Alert(alert.clone()));
            self.channels.alerts.publish(alert);
        }
    }
}
