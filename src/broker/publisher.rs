// =============================================================================
// broker/publisher.rs - Task-ul care goleste canalul outbound catre broker
// =============================================================================
//
// Fiecare mesaj devine un envelope JSON trimis intr-o datagrama UDP proprie.
// Trimiterea este best-effort: erorile de serializare sau de retea sunt
// logate si mesajul este abandonat. Nu exista retry - politica de retry
// apartine broker-ului sau agentului.
//
// =============================================================================

use super::{Envelope, OutboundMessage};
use crate::config::BrokerConfig;
use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;

/// Serializeaza un envelope ca o linie JSON terminata cu '\n'.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(envelope)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Ruleaza pana cand toate capetele `Outbound` sunt distruse.
///
/// Cu broker-ul dezactivat, mesajele sunt consumate si abandonate, astfel
/// incat coada sa nu creasca la nesfarsit.
pub async fn run(config: BrokerConfig, mut rx: UnboundedReceiver<OutboundMessage>) -> Result<()> {
    if !config.enabled {
        while rx.recv().await.is_some() {}
        return Ok(());
    }

    // Socket efemer (port 0 = OS alege automat), refolosit pentru toate mesajele.
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Nu pot crea socket UDP pentru broker")?;
    let dest = format!("{}:{}", config.host, config.port);

    while let Some(message) = rx.recv().await {
        let envelope = match message.into_envelope(&config.topics) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Mesaj outbound neserializabil, abandonat");
                continue;
            }
        };

        let bytes = match encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(topic = %envelope.topic, error = %e, "Envelope neserializabil");
                continue;
            }
        };

        if let Err(e) = socket.send_to(&bytes, &dest).await {
            tracing::warn!(
                topic = %envelope.topic,
                dest = %dest,
                error = %e,
                "Publicare broker esuata"
            );
        }
    }

    Ok(())
}
