//! axum router exposing a `ConsentStore` over HTTP.
//!
//! Store calls are synchronous, so every handler moves its call onto the
//! blocking pool with `spawn_blocking`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, info};

use cstore_contracts::{AuthRequest, ConsentError, ConsentQuery, ConsentResult, DiagnosticResult};
use cstore_core::ConsentStore;

use crate::dto::{
    parse_timestamp, ConsentCheckRequest, ConsentCheckResponse, ConsentQueryRequest,
    ConsentQueryResponse, ConsentRecordDto, CreateConsentRequest, FindParams, PatientConsentDto,
};
use crate::error::ApiError;

/// Shared handler state: the store every request runs against.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn ConsentStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn ConsentStore>) -> Self {
        Self { store }
    }
}

pub fn router(store: Arc<dyn ConsentStore>) -> Router {
    Router::new()
        .route("/consent", post(create_consent))
        .route("/consent/check", post(check_consent))
        .route("/consent/query", post(query_consent))
        .route("/consent/:proof_hash", get(find_consent_record).delete(delete_consent))
        .route("/diagnostics", get(diagnostics))
        .with_state(AppState::new(store))
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    store: Arc<dyn ConsentStore>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "consent store API listening");
    }
    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn run_blocking<T, F>(call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> ConsentResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ConsentError::storage(format!("store task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn required(value: &str, message: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(ConsentError::validation(message).into());
    }
    Ok(())
}

pub async fn create_consent(
    State(state): State<AppState>,
    Json(request): Json<CreateConsentRequest>,
) -> Result<StatusCode, ApiError> {
    let header = request.into_input()?;
    debug!(header_id = %header.id, records = header.records.len(), "create consent");

    let store = Arc::clone(&state.store);
    run_blocking(move || store.record_consent(std::slice::from_ref(&header))).await?;
    Ok(StatusCode::CREATED)
}

pub async fn check_consent(
    State(state): State<AppState>,
    Json(request): Json<ConsentCheckRequest>,
) -> Result<(StatusCode, Json<ConsentCheckResponse>), ApiError> {
    required(&request.subject, "missing subject in checkRequest")?;
    required(&request.custodian, "missing custodian in checkRequest")?;
    required(&request.actor, "missing actor in checkRequest")?;
    required(&request.data_class, "missing dataClass in checkRequest")?;

    let mut auth = AuthRequest::new(request.custodian, request.subject, request.actor, request.data_class);
    if let Some(valid_at) = request.valid_at.as_deref().filter(|v| !v.is_empty()) {
        auth = auth.at(parse_timestamp("validAt", valid_at)?);
    }

    let store = Arc::clone(&state.store);
    let consent_given = run_blocking(move || store.consent_auth(&auth)).await?;
    Ok((StatusCode::OK, Json(ConsentCheckResponse { consent_given })))
}

pub async fn query_consent(
    State(state): State<AppState>,
    Json(request): Json<ConsentQueryRequest>,
) -> Result<(StatusCode, Json<ConsentQueryResponse>), ApiError> {
    let given = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
    if !given(&request.actor) && !given(&request.custodian) {
        return Err(ConsentError::validation("missing actor or custodian in queryRequest").into());
    }

    // Filters pass through as sent: an empty string matches only empty values.
    let query = ConsentQuery {
        actor: request.actor,
        custodian: request.custodian,
        subject: request.subject,
        valid_at: match request.valid_at.as_deref().filter(|v| !v.is_empty()) {
            Some(valid_at) => Some(parse_timestamp("validAt", valid_at)?),
            None => None,
        },
    };

    let store = Arc::clone(&state.store);
    let headers = run_blocking(move || store.query_consent(&query)).await?;
    debug!(results = headers.len(), "consent query answered");

    let results: Vec<PatientConsentDto> = headers.iter().map(PatientConsentDto::from).collect();
    Ok((
        StatusCode::OK,
        Json(ConsentQueryResponse {
            page: request.page.unwrap_or_default(),
            total_results: results.len(),
            results,
        }),
    ))
}

pub async fn find_consent_record(
    State(state): State<AppState>,
    Path(proof_hash): Path<String>,
    Query(params): Query<FindParams>,
) -> Result<(StatusCode, Json<ConsentRecordDto>), ApiError> {
    required(&proof_hash, "missing proofHash")?;
    let latest = params.latest.unwrap_or(false);

    let store = Arc::clone(&state.store);
    let record = run_blocking(move || store.find_consent_record_by_hash(&proof_hash, latest)).await?;
    Ok((StatusCode::OK, Json(ConsentRecordDto::from(&record))))
}

pub async fn delete_consent(
    State(state): State<AppState>,
    Path(proof_hash): Path<String>,
) -> Result<StatusCode, ApiError> {
    required(&proof_hash, "missing proofHash")?;

    let store = Arc::clone(&state.store);
    run_blocking(move || store.delete_consent_record_by_hash(&proof_hash)).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn diagnostics(State(state): State<AppState>) -> Result<(StatusCode, Json<Vec<DiagnosticResult>>), ApiError> {
    let store = Arc::clone(&state.store);
    let results = run_blocking(move || Ok(store.diagnostics())).await?;
    Ok((StatusCode::OK, Json(results)))
}
