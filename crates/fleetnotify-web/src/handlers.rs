//! Route handlers
//!
//! Bodies are taken as raw bytes and parsed here so that malformed JSON gets
//! the same `{ok: false, error}` envelope as every other failure.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use fleetnotify_core::{Channel, Error, NewJob, NotificationJob, ZALO_SIGNATURE_HEADER};
use fleetnotify_dispatch::{issue_link_code, LinkOutcome, WorkerRequest};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::{ApiResponse, AppState};

fn error_response(e: Error) -> Response {
    let status = match &e {
        Error::InvalidValue(_) => StatusCode::BAD_REQUEST,
        Error::JobNotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiResponse::<()>::err(e.to_string()))).into_response()
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::err(format!("invalid JSON body: {}", e))),
        )
            .into_response()
    })
}

pub async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(json!({ "version": env!("CARGO_PKG_VERSION") })))
}

// === Channel workers ===

async fn run_worker(state: AppState, channel: Channel, body: Bytes) -> Response {
    let request: WorkerRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state.worker.handle(channel, request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn send_push(State(state): State<AppState>, body: Bytes) -> Response {
    run_worker(state, Channel::Push, body).await
}

pub async fn send_zalo(State(state): State<AppState>, body: Bytes) -> Response {
    run_worker(state, Channel::Zalo, body).await
}

pub async fn send_email(State(state): State<AppState>, body: Bytes) -> Response {
    run_worker(state, Channel::Email, body).await
}

pub async fn send_sms(State(state): State<AppState>, body: Bytes) -> Response {
    run_worker(state, Channel::Sms, body).await
}

// === Zalo webhook ===

pub async fn webhook_ping() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

pub async fn zalo_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(ZALO_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.linker.handle(&body, signature).await {
        LinkOutcome::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::err("invalid signature")),
        )
            .into_response(),
        LinkOutcome::Malformed(message) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::err(format!("invalid JSON body: {}", message))),
        )
            .into_response(),
        LinkOutcome::Ignored => Json(json!({ "ok": true, "linked": false })).into_response(),
        LinkOutcome::Linked { .. } => Json(json!({ "ok": true, "linked": true })).into_response(),
        LinkOutcome::Rejected { reason } => {
            Json(json!({ "ok": true, "linked": false, "reason": reason })).into_response()
        }
    }
}

// === Jobs ===

pub async fn create_job(State(state): State<AppState>, body: Bytes) -> Response {
    let new: NewJob = match parse_json(&body) {
        Ok(new) => new,
        Err(response) => return response,
    };
    if let Err(e) = new.validate() {
        return error_response(e);
    }

    let job = NotificationJob::from_new(new);
    if let Err(e) = state.db.jobs().insert(&job).await {
        return error_response(e);
    }
    info!(job_id = %job.id, "Job created");
    state.job_created.notify_one();

    Json(ApiResponse::ok(json!({ "jobId": job.id }))).into_response()
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.db.jobs().get(&id).await {
        Ok(Some(job)) => Json(ApiResponse::ok(json!({ "job": job }))).into_response(),
        Ok(None) => error_response(Error::JobNotFound(id)),
        Err(e) => error_response(e),
    }
}

pub async fn list_deliveries(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.db.jobs().get(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(Error::JobNotFound(id)),
        Err(e) => return error_response(e),
    }
    match state.db.deliveries().list_by_job(&id).await {
        Ok(deliveries) => Json(ApiResponse::ok(json!({ "deliveries": deliveries }))).into_response(),
        Err(e) => error_response(e),
    }
}

// === Link codes ===

#[derive(Deserialize)]
pub struct LinkCodeRequest {
    pub uid: String,
}

pub async fn create_link_code(State(state): State<AppState>, body: Bytes) -> Response {
    let request: LinkCodeRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match issue_link_code(&state.db, &request.uid, state.link_code_ttl, Utc::now()).await {
        Ok(code) => Json(ApiResponse::ok(json!({
            "code": code.code,
            "expiresAtMs": code.expires_at_ms,
        })))
        .into_response(),
        Err(e) => error_response(e),
    }
}
