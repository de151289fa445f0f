// =============================================================================
// hub.rs - Broadcast Hub (distributie live catre abonati)
// =============================================================================
//
// Un `Hub<T>` = un punct de multicast pentru o clasa de mesaje.
//
//   publish(item)  ->  copie in coada FIECARUI abonat curent
//   subscribe()    ->  Subscription care primeste doar ce se publica DUPA
//                      abonare (fara istoric, fara replay)
//
// Cozile sunt nelimitate (`mpsc::unbounded_channel`): publisher-ul nu
// blocheaza niciodata si niciun element nu se pierde pentru un abonat lent.
// Pretul este memoria: daca un abonat se blocheaza, coada lui creste fara
// limita. `high_water_mark` face riscul vizibil - la fiecare traversare a
// pragului se logheaza un avertisment, dar nu se arunca nimic.
//
// Abonatii inchisi (conexiune terminata) sunt detectati la urmatorul
// publish si eliminati. Esecul este logat si NU ajunge la apelant.
//
// CONCEPTE RUST EXPLICATE:
//
// 1. DashMap<u64, Slot<T>>
//    Lista de abonati este cheiata dupa un id atomic. Abonarea si
//    dezabonarea concurente cu publish-ul nu au nevoie de un lock global.
//
// 2. Arc<AtomicUsize> partajat intre Slot si Subscription
//    Publisher-ul incrementeaza, consumatorul decrementeaza. Valoarea este
//    backlog-ul curent al abonatului. Incrementul se face inainte de send,
//    altfel un consumator pe alt thread poate decrementa primul si contorul
//    trece sub zero.
//
// =============================================================================

use crate::detector::Alert;
use crate::packet::PacketRecord;
use crate::registry::AgentInfo;
use crate::relay::AnalyticsChannel;
use dashmap::DashMap;
use futures::Stream;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Capatul de trimitere al unui abonat.
struct Slot<T> {
    tx: UnboundedSender<T>,
    pending: Arc<AtomicUsize>,
}

/// Punct de multicast pentru o clasa de mesaje.
pub struct Hub<T> {
    name: &'static str,
    subscribers: DashMap<u64, Slot<T>>,
    next_id: AtomicU64,
    high_water_mark: usize,
    /// Cate avertismente de abonat lent s-au emis (o data per traversare).
    slow_warnings: AtomicU64,
}

/// Capatul de receptie al unui abonat. Drop = dezabonare.
pub struct Subscription<T> {
    rx: UnboundedReceiver<T>,
    pending: Arc<AtomicUsize>,
}

impl<T: Clone + Send + 'static> Hub<T> {
    pub fn new(name: &'static str, high_water_mark: usize) -> Self {
        Self {
            name,
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(0),
            high_water_mark,
            slow_warnings: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Inregistreaza un abonat nou.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.subscribers.insert(
            id,
            Slot {
                tx,
                pending: Arc::clone(&pending),
            },
        );
        tracing::debug!(channel = self.name, subscriber = id, "Abonat nou");

        Subscription { rx, pending }
    }

    /// Publica un element catre toti abonatii curenti.
    ///
    /// Nu blocheaza si nu esueaza niciodata din perspectiva apelantului.
    /// Returneaza numarul de abonati care au primit elementul.
    pub fn publish(&self, item: T) -> usize {
        let mut delivered = 0;
        let mut closed: Vec<u64> = Vec::new();

        for entry in self.subscribers.iter() {
            let slot = entry.value();
            // Incrementam INAINTE de send: consumatorul poate decrementa
            // imediat ce elementul ajunge in coada.
            let backlog = slot.pending.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            match slot.tx.send(item.clone()) {
                Ok(()) => {
                    delivered += 1;
                    if backlog == self.high_water_mark {
                        self.slow_warnings.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            channel = self.name,
                            subscriber = *entry.key(),
                            backlog,
                            "Abonat lent: coada a atins pragul de avertizare"
                        );
                    }
                }
                Err(_) => {
                    slot.pending.fetch_sub(1, Ordering::Relaxed);
                    closed.push(*entry.key());
                }
            }
        }

        // Eliminam dupa iteratie: `remove` in timpul `iter` pe acelasi
        // shard ar face deadlock.
        for id in closed {
            self.subscribers.remove(&id);
            tracing::warn!(
                channel = self.name,
                subscriber = id,
                "Livrare esuata: abonat inchis, eliminat"
            );
        }

        delivered
    }

    pub fn slow_warnings(&self) -> u64 {
        self.slow_warnings.load(Ordering::Relaxed)
    }

    /// Numarul de abonati cu conexiunea inca deschisa.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|e| !e.value().tx.is_closed())
            .count()
    }
}

impl<T: Send + 'static> Subscription<T> {
    /// Asteapta urmatorul element. `None` = hub-ul a fost distrus.
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await?;
        self.consumed();
        Some(item)
    }

    /// Varianta non-blocanta.
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<T> {
        let item = self.rx.try_recv().ok()?;
        self.consumed();
        Some(item)
    }

    fn consumed(&self) {
        // Publisher-ul incrementeaza inainte de send, deci valoarea e >= 1
        // aici. Saturarea pastreaza contorul valid chiar si altfel.
        let _ = self
            .pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    /// Transforma abonamentul intr-un `Stream` (pentru SSE).
    pub fn into_stream(self) -> impl Stream<Item = T> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let item = sub.recv().await?;
            Some((item, sub))
        })
    }
}

// =============================================================================
// LiveChannels - cate un hub per clasa de mesaje
// =============================================================================

pub struct LiveChannels {
    pub records: Hub<PacketRecord>,
    /// Partajat cu `AgentRegistry`, care publica roster-ul.
    pub agents: Arc<Hub<Vec<AgentInfo>>>,
    pub alerts: Hub<Alert>,
    pub top_talkers: Hub<Value>,
    pub top_ports: Hub<Value>,
    pub protocol_stats: Hub<Value>,
    pub raw_packets: Hub<Value>,
}

impl LiveChannels {
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            records: Hub::new("packets", high_water_mark),
            agents: Arc::new(Hub::new("agents", high_water_mark)),
            alerts: Hub::new("alerts", high_water_mark),
            top_talkers: Hub::new(AnalyticsChannel::TopTalkers.name(), high_water_mark),
            top_ports: Hub::new(AnalyticsChannel::TopPorts.name(), high_water_mark),
            protocol_stats: Hub::new(AnalyticsChannel::ProtocolStats.name(), high_water_mark),
            raw_packets: Hub::new(AnalyticsChannel::RawPackets.name(), high_water_mark),
        }
    }

    pub fn analytics(&self, channel: AnalyticsChannel) -> &Hub<Value> {
        match channel {
            AnalyticsChannel::TopTalkers => &self.top_talkers,
            AnalyticsChannel::TopPorts => &self.top_ports,
            AnalyticsChannel::ProtocolStats => &self.protocol_stats,
            AnalyticsChannel::RawPackets => &self.raw_packets,
        }
    }

    /// Total abonati live pe toate canalele (pentru statistici).
    pub fn subscriber_count(&self) -> usize {
        self.records.subscriber_count()
            + self.agents.subscriber_count()
            + self.alerts.subscriber_count()
            + self.top_talkers.subscriber_count()
            + self.top_ports.subscriber_count()
            + self.protocol_stats.subscriber_count()
            + self.raw_packets.subscriber_count()
    }

    /// Total avertismente de abonat lent pe toate canalele.
    pub fn slow_warnings(&self) -> u64 {
        self.records.slow_warnings()
            + self.agents.slow_warnings()
            + self.alerts.slow_warnings()
            + self.top_talkers.slow_warnings()
            + self.top_ports.slow_warnings()
            + self.protocol_stats.slow_warnings()
            + self.raw_packets.slow_warnings()
    }
}
