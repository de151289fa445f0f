// =============================================================================
// main.rs - Punct de Intrare NetWatch
// =============================================================================
//
// Orchestrarea componentelor:
//   1. Incarca configurarea din config.toml
//   2. Construieste store-ul, hub-urile live, detectorul, registrul, relay-ul
//   3. Porneste task-ul publisher (coada outbound -> broker)
//   4. Porneste listener-ul broker (heartbeat-uri + agregari analitice)
//   5. Porneste task-ul de statistici periodice
//   6. Serveste API-ul HTTP pana la Ctrl+C
//
// CONCEPTE RUST EXPLICATE:
//
// 1. Arc<dyn PacketStore>
//    Store-ul este un trait object: main alege backend-ul, restul codului
//    vede doar contractul. Arc il partajeaza intre handler-e si workeri.
//
// 2. tokio::select! cu `biased;`
//    Asteptam simultan Ctrl+C si terminarea serverului HTTP. `biased`
//    evalueaza branch-urile in ordine, deci Ctrl+C are prioritate.
//
// =============================================================================

mod api;
mod broker;
mod config;
mod detector;
mod display;
mod error;
mod hub;
mod ingest;
mod packet;
mod registry;
mod relay;
mod store;

use anyhow::Context;
use broker::listener::InboundRouter;
use broker::Outbound;
use config::AppConfig;
use detector::Detector;
use hub::LiveChannels;
use ingest::IngestService;
use registry::AgentRegistry;
use relay::AnalyticsRelay;
use std::sync::Arc;
use std::time::Duration;
use store::{MemoryStore, PacketStore};
use tokio::net::{TcpListener, UdpSocket};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // =========================================================================
    // 1. TRACING
    // =========================================================================
    //
    // `RUST_LOG` controleaza nivelul (implicit: info pentru acest crate).
    //
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("netwatch_rs=info")),
        )
        .with_target(false)
        .init();

    // =========================================================================
    // 2. CONFIGURARE
    // =========================================================================
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = AppConfig::load(&config_path)?;
    display::print_banner(&config);

    // =========================================================================
    // 3. COMPONENTE
    // =========================================================================
    let channels = Arc::new(LiveChannels::new(config.broadcast.high_water_mark));
    let store: Arc<dyn PacketStore> = Arc::new(MemoryStore::new(config.store.max_records));
    let detector = Arc::new(Detector::new(config.detection.clone()));
    let (outbound, outbound_rx) = Outbound::channel();

    // Registrul publica roster-ul pe hub-ul `agents` din LiveChannels.
    let registry = Arc::new(AgentRegistry::new(Arc::clone(&channels.agents)));
    let relay = Arc::new(AnalyticsRelay::new(&config.broker.topics, Arc::clone(&channels)));

    let ingest = Arc::new(IngestService::new(
        store,
        outbound.clone(),
        Arc::clone(&channels),
        Arc::clone(&detector),
    ));

    display::log_info(&format!(
        "Store in memorie (retentie: {})",
        match config.store.max_records {
            0 => "nelimitata".to_string(),
            n => format!("{} inregistrari", n),
        }
    ));

    // =========================================================================
    // 4. BROKER: publisher + listener
    // =========================================================================
    let publisher_config = config.broker.clone();
    tokio::spawn(async move {
        if let Err(e) = broker::publisher::run(publisher_config, outbound_rx).await {
            display::log_error(&format!("Publisher broker oprit: {:#}", e));
        }
    });

    if config.broker.enabled {
        let bind_addr = format!(
            "{}:{}",
            config.broker.listen_address, config.broker.listen_port
        );
        let socket = UdpSocket::bind(&bind_addr)
            .await
            .with_context(|| format!("Nu pot asculta pe UDP {}", bind_addr))?;

        let router = Arc::new(InboundRouter::new(
            config.broker.topics.heartbeats.clone(),
            Arc::clone(&registry),
            Arc::clone(&relay),
        ));
        tokio::spawn(broker::listener::run(socket, router));

        display::log_info(&format!(
            "Broker: publicare catre {}:{}, receptie pe UDP {}",
            config.broker.host, config.broker.port, bind_addr
        ));
    } else {
        display::log_warning("Broker dezactivat - mesajele outbound sunt abandonate");
    }

    // =========================================================================
    // 5. STATISTICI PERIODICE
    // =========================================================================
    //
    // Sleep-first loop: prima linie apare abia dupa `interval_secs`.
    // Task-ul doar raporteaza; nu exista expirare a starii.
    //
    let stats_interval = config.stats.interval_secs;
    let stats_detector = Arc::clone(&detector);
    let stats_registry = Arc::clone(&registry);
    let stats_ingest = Arc::clone(&ingest);
    let stats_channels = Arc::clone(&channels);

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(stats_interval)).await;
            display::log_stats(
                stats_detector.tracked_ips(),
                stats_registry.agent_count(),
                stats_ingest.stored_count(),
                stats_channels.subscriber_count(),
                stats_channels.slow_warnings(),
            );
        }
    });

    // =========================================================================
    // 6. SERVER HTTP
    // =========================================================================
    let state = Arc::new(api::AppState {
        ingest,
        registry,
        channels,
        outbound,
        latest_limit: config.server.latest_limit,
    });

    let http_addr = format!(
        "{}:{}",
        config.server.listen_address, config.server.listen_port
    );
    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Nu pot asculta pe HTTP {}", http_addr))?;

    display::log_info(&format!("API HTTP pe http://{}", http_addr));
    display::log_info("Astept pachete de la agenti... (Ctrl+C pentru oprire)");
    display::print_separator();

    let app = api::router(state);
    let server = async move { axum::serve(listener, app).await };

    tokio::select! {
        biased;

        _ = tokio::signal::ctrl_c() => {
            println!();
            display::log_info("Oprire gratiosa... La revedere!");
        }

        result = server => {
            result.context("Serverul HTTP s-a oprit neasteptat")?;
        }
    }

    Ok(())
}
