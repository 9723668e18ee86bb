//! Route handlers.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{pages, AppState};
use crate::artifact::ArtifactError;
use crate::registry::{Booking, Occupancy, RegistryError, RegistryResult, Slot, SlotState};

/// Error returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    Registry(RegistryError),
    NotFound(String),
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Registry(err) => {
                let status = if err.is_expected() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, err.kind().as_str(), err.to_string())
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        };
        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}

/// Run a registry call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> RegistryResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("registry task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Best-effort ticket rendering. Never fails the request.
async fn issue_ticket(state: &AppState, booking: &Booking) -> Option<String> {
    let artifacts = state.artifacts.clone();
    let for_render = booking.clone();
    let outcome = tokio::task::spawn_blocking(move || artifacts.render(&for_render)).await;
    match outcome {
        Ok(Ok(path)) => {
            debug!(booking = %booking.booking_id, path = %path.display(), "ticket rendered");
            Some(format!("/qr/{}", booking.booking_id))
        }
        Ok(Err(ArtifactError::Disabled)) => None,
        Ok(Err(err)) => {
            warn!(booking = %booking.booking_id, error = %err, "ticket rendering failed");
            None
        }
        Err(err) => {
            warn!(booking = %booking.booking_id, error = %err, "ticket task failed");
            None
        }
    }
}

// ============================================================================
// JSON API
// ============================================================================

/// Slot as seen by API clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotView {
    pub slot_id: String,
    pub booking_id: Option<String>,
    pub state: SlotState,
}

impl From<Slot> for SlotView {
    fn from(slot: Slot) -> Self {
        let state = slot.state();
        Self {
            slot_id: slot.slot_id.to_string(),
            booking_id: slot.booking_id.map(|b| b.to_string()),
            state,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRequest {
    pub slot_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookResponse {
    pub slot_id: String,
    pub booking_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ticket_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub slot_id: String,
    pub booking_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidateResponse {
    pub status: String,
    pub message: String,
}

pub(super) async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub(super) async fn list_slots(
    State(state): State<AppState>,
) -> Result<Json<Vec<SlotView>>, ApiError> {
    let registry = state.registry.clone();
    let slots = blocking(move || Ok(registry.list())).await?;
    Ok(Json(slots.into_iter().map(SlotView::from).collect()))
}

pub(super) async fn get_slot(
    State(state): State<AppState>,
    Path(slot_id): Path<String>,
) -> Result<Json<SlotView>, ApiError> {
    let registry = state.registry.clone();
    match blocking(move || registry.get(&slot_id)).await {
        Ok(slot) => Ok(Json(slot.into())),
        Err(ApiError::Registry(RegistryError::SlotNotFound(id))) => {
            Err(ApiError::NotFound(format!("slot '{}' not found", id)))
        }
        Err(err) => Err(err),
    }
}

pub(super) async fn occupancy(State(state): State<AppState>) -> Result<Json<Occupancy>, ApiError> {
    let registry = state.registry.clone();
    Ok(Json(blocking(move || Ok(registry.occupancy())).await?))
}

pub(super) async fn book_slot(
    State(state): State<AppState>,
    Json(req): Json<BookRequest>,
) -> Result<(StatusCode, Json<BookResponse>), ApiError> {
    let registry = state.registry.clone();
    let booking = blocking(move || registry.book(&req.slot_id)).await?;
    let ticket_url = issue_ticket(&state, &booking).await;
    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            slot_id: booking.slot_id.to_string(),
            booking_id: booking.booking_id.to_string(),
            ticket_url,
        }),
    ))
}

pub(super) async fn release_slot(
    State(state): State<AppState>,
    Json(req): Json<BookRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let registry = state.registry.clone();
    let slot_id = req.slot_id.clone();
    blocking(move || registry.release(&slot_id)).await?;
    Ok(Json(json!({ "slot_id": req.slot_id, "released": true })))
}

/// Check a scanned ticket. Unknown slots are simply invalid tickets.
pub(super) async fn validate_ticket(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let registry = state.registry.clone();
    let valid = match blocking(move || registry.validate(&req.slot_id, &req.booking_id)).await {
        Ok(valid) => valid,
        Err(ApiError::Registry(RegistryError::SlotNotFound(_))) => false,
        Err(err) => return Err(err),
    };
    let (status, message) = if valid {
        ("Success", "Valid Ticket")
    } else {
        ("Failed", "Invalid Ticket")
    };
    Ok(Json(ValidateResponse {
        status: status.to_string(),
        message: message.to_string(),
    }))
}

pub(super) async fn ticket_image(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Response, ApiError> {
    let booking_id = booking_id.trim_end_matches(".svg").to_string();
    let path = state
        .artifacts
        .locate(&booking_id)
        .ok_or_else(|| ApiError::NotFound(format!("no ticket for booking '{}'", booking_id)))?;
    let body = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read ticket: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], body).into_response())
}

// ============================================================================
// HTML pages
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub(super) struct FlashQuery {
    pub error: Option<String>,
    pub slot: Option<String>,
    pub booked: Option<String>,
}

pub(super) async fn home_page(
    State(state): State<AppState>,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, ApiError> {
    let registry = state.registry.clone();
    let slots = blocking(move || Ok(registry.list())).await?;
    Ok(Html(pages::render_home(&slots, &flash.into())))
}

pub(super) async fn admin_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let registry = state.registry.clone();
    let slots = blocking(move || Ok(registry.list())).await?;
    let occupancy = Occupancy::of(&slots);
    Ok(Html(pages::render_admin(&slots, &occupancy)))
}

pub(super) async fn book_and_redirect(
    State(state): State<AppState>,
    Path(slot_id): Path<String>,
) -> Result<Redirect, ApiError> {
    let registry = state.registry.clone();
    let target = slot_id.clone();
    match blocking(move || registry.book(&target)).await {
        Ok(booking) => {
            issue_ticket(&state, &booking).await;
            Ok(Redirect::to(&format!(
                "/?booked={}&slot={}",
                booking.booking_id, booking.slot_id
            )))
        }
        Err(ApiError::Registry(err)) if err.is_expected() => Ok(flash_redirect(&err, &slot_id)),
        Err(err) => Err(err),
    }
}

pub(super) async fn release_and_redirect(
    State(state): State<AppState>,
    Path(slot_id): Path<String>,
) -> Result<Redirect, ApiError> {
    let registry = state.registry.clone();
    let target = slot_id.clone();
    match blocking(move || registry.release(&target)).await {
        Ok(()) => Ok(Redirect::to("/")),
        Err(ApiError::Registry(err)) if err.is_expected() => Ok(flash_redirect(&err, &slot_id)),
        Err(err) => Err(err),
    }
}

fn flash_redirect(err: &RegistryError, slot_id: &str) -> Redirect {
    let slot: String = slot_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(crate::registry::MAX_SLOT_ID_LEN)
        .collect();
    Redirect::to(&format!("/?error={}&slot={}", err.kind(), slot))
}

impl From<FlashQuery> for pages::Flash {
    fn from(q: FlashQuery) -> Self {
        match (q.error, q.booked) {
            (Some(kind), _) => pages::Flash::Error {
                kind,
                slot: q.slot.unwrap_or_default(),
            },
            (None, Some(booking_id)) => pages::Flash::Booked {
                booking_id,
                slot: q.slot.unwrap_or_default(),
            },
            (None, None) => pages::Flash::None,
        }
    }
}
