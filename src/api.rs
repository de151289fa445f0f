// =============================================================================
// api.rs - Suprafata HTTP (axum)
// =============================================================================
//
// Rute:
//   POST /api/v1/packets                -> ingestie pachet individual
//   POST /api/v1/packets/batch          -> ingestie lot (202, fara body)
//   GET  /api/v1/packets                -> ultimele N dupa timestamp
//   GET  /api/v1/packets/latest/:count  -> ultimele `count` dupa id
//   GET  /api/v1/packets/stream         -> SSE: inregistrari live
//   GET  /api/v1/agents                 -> roster-ul agentilor
//   POST /api/v1/agents/heartbeat       -> heartbeat direct (fara broker)
//   GET  /api/v1/stream/:channel        -> SSE: agents, alerts, topTalkers,
//                                          topPorts, protocolStats, rawPackets
//
// Ingestia si interogarile store-ului ruleaza pe `spawn_blocking`: fiecare
// cerere devine un worker independent, iar I/O-ul blocant al store-ului nu
// opreste reactorul async.
//
// =============================================================================

use crate::broker::{Outbound, OutboundMessage};
use crate::error::IngestError;
use crate::hub::{Hub, LiveChannels};
use crate::ingest::IngestService;
use crate::packet::{PacketBatch, PacketDraft, PacketRecord};
use crate::registry::{AgentHeartbeat, AgentInfo, AgentRegistry};
use crate::relay::AnalyticsChannel;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub registry: Arc<AgentRegistry>,
    pub channels: Arc<LiveChannels>,
    pub outbound: Outbound,
    pub latest_limit: usize,
}

type SharedState = Arc<AppState>;
type EventStream = Sse<BoxStream<'static, Result<Event, axum::Error>>>;

/// Erorile unui handler: erorile de ingestie plus esecul worker-ului blocant.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("worker de ingestie oprit: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Ingest(e) => e.into_response(),
            ApiError::Worker(e) => {
                tracing::error!(error = %e, "Worker spawn_blocking esuat");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/packets", post(create_packet).get(latest_packets))
        .route("/api/v1/packets/batch", post(create_batch))
        .route("/api/v1/packets/latest/:count", get(latest_by_id))
        .route("/api/v1/packets/stream", get(stream_packets))
        .route("/api/v1/agents", get(list_agents))
        .route("/api/v1/agents/heartbeat", post(agent_heartbeat))
        .route("/api/v1/stream/:channel", get(stream_channel))
        .with_state(state)
}

/// Ruleaza o operatie sincrona a serviciului de ingestie pe un worker blocant.
async fn blocking<T, F>(state: &SharedState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&IngestService) -> Result<T, IngestError> + Send + 'static,
{
    let ingest = Arc::clone(&state.ingest);
    let result = tokio::task::spawn_blocking(move || op(ingest.as_ref())).await?;
    Ok(result?)
}

async fn create_packet(
    State(state): State<SharedState>,
    Json(draft): Json<PacketDraft>,
) -> Result<Json<PacketRecord>, ApiError> {
    let record = blocking(&state, move |svc| svc.ingest_one(draft)).await?;
    Ok(Json(record))
}

async fn create_batch(
    State(state): State<SharedState>,
    Json(batch): Json<PacketBatch>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |svc| svc.ingest_batch(batch)).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn latest_packets(
    State(state): State<SharedState>,
) -> Result<Json<Vec<PacketRecord>>, ApiError> {
    let limit = state.latest_limit;
    let records = blocking(&state, move |svc| svc.latest_by_timestamp(limit)).await?;
    Ok(Json(records))
}

async fn latest_by_id(
    State(state): State<SharedState>,
    Path(count): Path<usize>,
) -> Result<Json<Vec<PacketRecord>>, ApiError> {
    let records = blocking(&state, move |svc| svc.latest_by_id(count)).await?;
    Ok(Json(records))
}

async fn list_agents(State(state): State<SharedState>) -> Json<Vec<AgentInfo>> {
    Json(state.registry.snapshot())
}

/// Heartbeat primit direct de la agent: aplicat local si trimis upstream
/// pe topic-ul de heartbeat, ca ceilalti consumatori sa-l vada.
async fn agent_heartbeat(
    State(state): State<SharedState>,
    Json(heartbeat): Json<AgentHeartbeat>,
) -> StatusCode {
    state.registry.on_heartbeat(heartbeat.clone());
    state.outbound.publish(OutboundMessage::Heartbeat(heartbeat));
    StatusCode::OK
}

async fn stream_packets(State(state): State<SharedState>) -> EventStream {
    sse(&state.channels.records)
}

async fn stream_channel(
    State(state): State<SharedState>,
    Path(channel): Path<String>,
) -> Result<EventStream, StatusCode> {
    let channels = &state.channels;
    match channel.as_str() {
        "agents" => Ok(sse(channels.agents.as_ref())),
        "alerts" => Ok(sse(&channels.alerts)),
        other => AnalyticsChannel::from_name(other)
            .map(|c| sse(channels.analytics(c)))
            .ok_or(StatusCode::NOT_FOUND),
    }
}

/// Aboneaza clientul la hub si ii trimite fiecare element ca eveniment JSON.
///
/// Stream-ul detine abonamentul: cand clientul se deconecteaza, axum
/// distruge stream-ul si hub-ul elimina abonatul la urmatorul publish.
fn sse<T>(hub: &Hub<T>) -> EventStream
where
    T: Serialize + Clone + Send + 'static,
{
    tracing::debug!(channel = hub.name(), "Client SSE conectat");
    let stream = hub
        .subscribe()
        .into_stream()
        .map(|item| Event::default().json_data(item))
        .boxed();
    Sse::new(stream).keep_alive(KeepAlive::default())
}
