//! Ticket HTTP API.
//!
//! - `GET   /tickets`       tickets visible to the calling viewer
//! - `GET   /tickets/{id}`  one ticket, 404 when missing or not visible
//! - `POST  /tickets`       create a ticket and stamp its SLA deadline
//! - `PATCH /tickets/{id}`  edit status, priority, category, zone, branch or assignee
//!
//! The viewer arrives in `x-viewer-*` headers set by the authentication layer in front
//! of this service.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use supportdesk_core::domain::ticket::{Priority, Ticket, TicketId, TicketStatus};
use supportdesk_core::domain::viewer::{Role, Viewer};
use supportdesk_core::errors::{ApplicationError, InterfaceError};
use supportdesk_core::tickets::{NewTicket, TicketService, TicketUpdate};
use tracing::{info, warn};
use uuid::Uuid;

pub const VIEWER_ID_HEADER: &str = "x-viewer-id";
pub const VIEWER_ROLE_HEADER: &str = "x-viewer-role";
pub const VIEWER_ZONE_HEADER: &str = "x-viewer-zone";
pub const VIEWER_NAME_HEADER: &str = "x-viewer-name";
pub const CUSTOMER_IDENTITY_HEADER: &str = "x-customer-identity";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    tickets: Arc<TicketService>,
}

impl ApiState {
    pub fn new(tickets: Arc<TicketService>) -> Self {
        Self { tickets }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub id: Option<String>,
    pub title: String,
    pub priority: String,
    pub category: Option<String>,
    pub zone: String,
    pub branch: String,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, with = "double_option")]
    pub category: Option<Option<String>>,
    pub zone: Option<String>,
    pub branch: Option<String>,
    #[serde(default, with = "double_option")]
    pub assigned_to: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct TicketListResponse {
    pub tickets: Vec<Ticket>,
    pub count: usize,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/tickets", get(list_tickets).post(create_ticket))
        .route("/tickets/{id}", get(get_ticket).patch(update_ticket))
        .with_state(state)
}

pub async fn list_tickets(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<TicketListResponse> {
    let correlation_id = correlation_id(&headers);
    let viewer = viewer_from_headers(&headers, &correlation_id)?;

    let tickets =
        state.tickets.list_for(&viewer).await.map_err(|error| reject(error, &correlation_id))?;

    info!(
        event_name = "api.tickets.listed",
        correlation_id = %correlation_id,
        viewer_role = viewer.role.as_str(),
        visible = tickets.len(),
        "ticket list served"
    );
    Ok(Json(TicketListResponse { count: tickets.len(), tickets }))
}

pub async fn get_ticket(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Ticket> {
    let correlation_id = correlation_id(&headers);
    let viewer = viewer_from_headers(&headers, &correlation_id)?;

    let ticket = state
        .tickets
        .get_for(&viewer, &TicketId(id))
        .await
        .map_err(|error| reject(error, &correlation_id))?;
    Ok(Json(ticket))
}

pub async fn create_ticket(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), (StatusCode, Json<ApiError>)> {
    let correlation_id = correlation_id(&headers);
    let viewer = viewer_from_headers(&headers, &correlation_id)?;

    if request.title.trim().is_empty() {
        return Err(bad_request("title must not be empty", &correlation_id));
    }
    let priority = parse_priority(&request.priority, &correlation_id)?;

    let ticket = state
        .tickets
        .create(NewTicket {
            id: request.id.map(TicketId),
            title: request.title.trim().to_string(),
            priority,
            category: request.category,
            zone: request.zone,
            branch: request.branch,
            assigned_to: request.assigned_to,
            created_by: viewer.name.clone(),
        })
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn update_ticket(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateTicketRequest>,
) -> ApiResult<Ticket> {
    let correlation_id = correlation_id(&headers);
    let viewer = viewer_from_headers(&headers, &correlation_id)?;
    let id = TicketId(id);

    // Edits are limited to tickets the caller can already see.
    state.tickets.get_for(&viewer, &id).await.map_err(|error| reject(error, &correlation_id))?;

    let status = match request.status.as_deref() {
        Some(raw) => Some(TicketStatus::parse(raw).ok_or_else(|| {
            bad_request(&format!("unknown status `{raw}`"), &correlation_id)
        })?),
        None => None,
    };
    let priority = match request.priority.as_deref() {
        Some(raw) => Some(parse_priority(raw, &correlation_id)?),
        None => None,
    };

    let ticket = state
        .tickets
        .update(
            &id,
            TicketUpdate {
                status,
                priority,
                category: request.category,
                zone: request.zone,
                branch: request.branch,
                assigned_to: request.assigned_to,
            },
        )
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok(Json(ticket))
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn viewer_from_headers(
    headers: &HeaderMap,
    correlation_id: &str,
) -> Result<Viewer, (StatusCode, Json<ApiError>)> {
    let (Some(id), Some(role), Some(name)) = (
        header(headers, VIEWER_ID_HEADER),
        header(headers, VIEWER_ROLE_HEADER),
        header(headers, VIEWER_NAME_HEADER),
    ) else {
        return Err(bad_request("viewer identity headers are required", correlation_id));
    };
    let zone = header(headers, VIEWER_ZONE_HEADER).unwrap_or_default();

    let role = Role::parse(&role);
    if let Role::Other(unknown) = &role {
        warn!(
            event_name = "api.viewer.unknown_role",
            correlation_id = %correlation_id,
            role = %unknown,
            "unknown viewer role; no tickets will be visible"
        );
    }

    let mut viewer = Viewer::new(id, role, zone, name);
    if let Some(identity) = header(headers, CUSTOMER_IDENTITY_HEADER) {
        viewer = viewer.with_customer_identity(identity);
    }
    Ok(viewer)
}

fn parse_priority(raw: &str, correlation_id: &str) -> Result<Priority, (StatusCode, Json<ApiError>)> {
    Priority::parse(raw)
        .ok_or_else(|| bad_request(&format!("unknown priority `{raw}`"), correlation_id))
}

fn bad_request(message: &str, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    error_response(InterfaceError::BadRequest {
        message: message.to_string(),
        correlation_id: correlation_id.to_string(),
    })
}

fn reject(error: ApplicationError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    if matches!(error, ApplicationError::Persistence(_) | ApplicationError::Configuration(_)) {
        warn!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            error = %error,
            "ticket request failed"
        );
    }
    error_response(error.into_interface(correlation_id))
}

fn error_response(error: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let (status, kind) = match &error {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    let message = match &error {
        InterfaceError::BadRequest { message, .. } => message.clone(),
        _ => error.user_message().to_string(),
    };

    (
        status,
        Json(ApiError {
            error: kind.to_string(),
            message,
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

/// Distinguishes an absent field (no change) from an explicit `null` (clear the field).
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}
