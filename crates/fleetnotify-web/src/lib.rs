//! fleetnotify HTTP API
//!
//! Public routes: health and the Zalo webhook. Channel workers, job intake
//! and link-code issue require the `x-internal-secret` header.

mod handlers;

use axum::{
    extract::{Request as AxumRequest, State},
    http::{header::HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response as AxumResponse},
    routing::{get, post},
    Router,
};
use fleetnotify_core::{ServiceConfig, INTERNAL_SECRET_HEADER};
use fleetnotify_db::Database;
use fleetnotify_dispatch::{ChannelWorker, Linker};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// JSON envelope: `{ok, ...data}` or `{ok: false, error}`
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Database,
    worker: ChannelWorker,
    linker: Arc<Linker>,
    job_created: Arc<Notify>,
    internal_secret: Option<String>,
    link_code_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(
        config: &ServiceConfig,
        db: Database,
        worker: ChannelWorker,
        job_created: Arc<Notify>,
    ) -> Self {
        if config.internal_secret.is_none() {
            warn!("No internal secret configured; internal routes are open");
        }
        Self {
            linker: Arc::new(Linker::new(db.clone(), config)),
            db,
            worker,
            job_created,
            internal_secret: config.internal_secret.clone().filter(|s| !s.is_empty()),
            link_code_ttl: chrono::Duration::seconds(config.link_code_ttl_secs as i64),
        }
    }
}

/// Internal shared-secret middleware
async fn internal_secret_auth(
    State(state): State<AppState>,
    request: AxumRequest,
    next: Next,
) -> AxumResponse {
    // Without a configured secret (development) everything is allowed
    let Some(expected) = &state.internal_secret else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(secret) if secret == expected => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Rejected request with bad internal secret");
            (StatusCode::UNAUTHORIZED, Json(ApiResponse::<()>::err("unauthorized"))).into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    create_router_with_cors(state, None)
}

/// Create the API router with custom CORS origin
pub fn create_router_with_cors(state: AppState, cors_origin: Option<String>) -> Router {
    let default_origin = HeaderValue::from_static("http://localhost:3000");
    let origin = cors_origin
        .and_then(|o| o.parse::<HeaderValue>().ok())
        .unwrap_or(default_origin);
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    let protected_routes = Router::new()
        .route("/workers/sendPush", post(handlers::send_push))
        .route("/workers/sendZalo", post(handlers::send_zalo))
        .route("/workers/sendEmail", post(handlers::send_email))
        .route("/workers/sendSms", post(handlers::send_sms))
        .route("/jobs", post(handlers::create_job))
        .route("/jobs/:id", get(handlers::get_job))
        .route("/jobs/:id/deliveries", get(handlers::list_deliveries))
        .route("/link-codes", post(handlers::create_link_code))
        .route_layer(middleware::from_fn_with_state(state.clone(), internal_secret_auth));

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/webhook/zalo",
            get(handlers::webhook_ping).post(handlers::zalo_webhook),
        );

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the task is dropped
pub async fn start_server(config: &ServiceConfig, state: AppState) -> std::io::Result<()> {
    let app = create_router_with_cors(state, config.cors_origin.clone());

    info!("fleetnotify API listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
