// =============================================================================
// error.rs - Taxonomia erorilor din nucleul de ingestie
// =============================================================================
//
// Doar erorile care AJUNG la apelant au tip propriu:
//   1. Validation - lot malformat, respins inainte de orice persistenta
//   2. Store      - esec de persistenta, propagat pentru tot lotul
//
// Esecurile de fan-out (broker, abonati live) nu apar aici: sunt logate
// si ignorate acolo unde se produc.
//
// NOTA RUST: `thiserror` genereaza `impl Display` si `impl Error` din
// atributele #[error(...)]. `#[from]` genereaza `impl From<StoreError>`,
// deci `?` converteste automat StoreError -> IngestError.
//
// =============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Esec al backend-ului de persistenta.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("scriere respinsa: {0}")]
    Rejected(String),
}

/// Erori vizibile apelantului operatiilor de ingestie.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("lot invalid: {0}")]
    Validation(String),

    #[error("persistenta esuata: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match self {
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Erori de codare/decodare a envelope-urilor broker. Nu parasesc
/// task-urile broker-ului.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("envelope JSON invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload incompatibil cu topic-ul {topic}: {source}")]
    Payload {
        topic: String,
        source: serde_json::Error,
    },
}
