//! HTTP surface
//!
//! HTML pages for the booking desk and the admin view, plus the JSON API a
//! separate frontend talks to. Every registry call runs on the blocking pool
//! because a transition may wait on SQLite.

mod handlers;
mod pages;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::artifact::{NoArtifacts, QrTicketWriter, TicketArtifacts};
use crate::config::ParkingConfig;
use crate::registry::Registry;

pub use handlers::{
    ApiError, BookRequest, BookResponse, SlotView, ValidateRequest, ValidateResponse,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub artifacts: Arc<dyn TicketArtifacts>,
    pub cors_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, artifacts: Arc<dyn TicketArtifacts>) -> Self {
        Self {
            registry,
            artifacts,
            cors_origins: Arc::new(Vec::new()),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Arc::new(origins);
        self
    }

    /// Wire state from configuration around an already-initialized registry.
    pub fn from_config(registry: Arc<Registry>, config: &ParkingConfig) -> Self {
        let artifacts: Arc<dyn TicketArtifacts> = if config.artifacts.enabled {
            Arc::new(QrTicketWriter::new(&config.artifacts.dir))
        } else {
            Arc::new(NoArtifacts)
        };
        Self::new(registry, artifacts).with_cors_origins(config.server.cors_origins.clone())
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home_page))
        .route("/admin", get(handlers::admin_page))
        .route("/book/:slot_id", get(handlers::book_and_redirect))
        .route("/release/:slot_id", get(handlers::release_and_redirect))
        .route("/qr/:booking_id", get(handlers::ticket_image))
        .route("/health", get(handlers::health))
        .route("/api/slots", get(handlers::list_slots))
        .route("/api/slots/:slot_id", get(handlers::get_slot))
        .route("/api/occupancy", get(handlers::occupancy))
        .route("/api/book", post(handlers::book_slot))
        .route("/api/release", post(handlers::release_slot))
        .route("/api/validate", post(handlers::validate_ticket))
        .layer(from_fn_with_state(state.clone(), cors_middleware))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(state: AppState, bind: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    let local: SocketAddr = listener.local_addr()?;
    info!(
        addr = %local,
        slots = state.registry.len(),
        store = state.registry.store_name(),
        "parking server listening"
    );
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

fn origin_allowed(state: &AppState, origin: &str) -> bool {
    state.cors_origins.iter().any(|o| o == "*" || o == origin)
}

async fn cors_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let origin = req
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    if let Some(origin) = origin.filter(|o| origin_allowed(&state, o)) {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            let headers = resp.headers_mut();
            headers.insert("access-control-allow-origin", value);
            headers.insert(
                "access-control-allow-methods",
                HeaderValue::from_static("GET,POST,OPTIONS"),
            );
            headers.insert(
                "access-control-allow-headers",
                HeaderValue::from_static("content-type"),
            );
            headers.insert("vary", HeaderValue::from_static("origin"));
        }
    }
    resp
}
