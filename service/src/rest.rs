//! REST API handlers and `OpenAPI` documentation.
//!
//! Handlers take their services from `Extension` layers installed by
//! [`router`]'s caller; errors are RFC 7807 problem details.

// The OpenApi derive macro generates code that triggers this lint
#![allow(clippy::needless_for_each)]

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize, Serializer};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::congress::{ResolutionFailure, ResolvedDistrict};
use crate::constituents::{
    Address, Constituent, ConstituentError, ConstituentRepoError, ConstituentService, NewAddress,
};
use crate::messages::{
    Delivery, InboundOutcome, InboundPipeline, IntakeError, Message, MessageRepo,
    MessageRepoError, MessageStatus,
};

/// Serialize a `StatusCode` as its `u16` representation.
#[allow(clippy::trivially_copy_pass_by_ref)] // serde requires `&T` signature
fn serialize_status_code<S: Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

/// RFC 7807 Problem Details error response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// URI reference identifying the problem type
    #[serde(rename = "type")]
    pub problem_type: String,
    /// Short human-readable summary
    pub title: String,
    /// HTTP status code
    #[serde(serialize_with = "serialize_status_code")]
    #[schema(value_type = u16)]
    pub status: StatusCode,
    /// Human-readable explanation specific to this occurrence
    pub detail: String,
    /// URI reference identifying the specific occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ProblemExtensions>,
}

/// Machine-readable error code.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProblemExtensions {
    /// Stable error code, e.g. `RATE_LIMITED` or `UNDETERMINED`
    pub code: String,
    /// Field that caused the error (for validation errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ProblemDetails {
    fn new(status: StatusCode, slug: &str, title: &str, code: &str, detail: impl Into<String>) -> Self {
        Self {
            problem_type: format!("https://emailcongress.us/errors/{slug}"),
            title: title.to_string(),
            status,
            detail: detail.into(),
            instance: None,
            extensions: Some(ProblemExtensions {
                code: code.to_string(),
                field: None,
            }),
        }
    }

    /// Create an internal server error response.
    #[must_use]
    pub fn internal_error(detail: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal Server Error",
            "INTERNAL_ERROR",
            detail,
        )
    }

    #[must_use]
    pub fn not_found(detail: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not-found", "Not Found", "NOT_FOUND", detail)
    }

    #[must_use]
    pub fn bad_request(code: &str, detail: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad-request", "Bad Request", code, detail)
    }

    #[must_use]
    pub fn conflict(code: &str, detail: &str) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", "Conflict", code, detail)
    }

    /// A district that could not be resolved from the current address.
    #[must_use]
    pub fn unresolved(failure: ResolutionFailure) -> Self {
        let code = match failure {
            ResolutionFailure::Undetermined => "UNDETERMINED",
            ResolutionFailure::InvalidZip => "INVALID_ZIP",
        };
        let mut problem = Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "district-unresolved",
            "District Unresolved",
            code,
            failure.to_string(),
        );
        if let Some(ext) = problem.extensions.as_mut() {
            ext.field = Some("address".to_string());
        }
        problem
    }

    #[must_use]
    pub fn bad_gateway(detail: &str) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            "upstream",
            "Bad Gateway",
            "UPSTREAM_ERROR",
            detail,
        )
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<IntakeError> for ProblemDetails {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::UnknownSender => Self::not_found("sender not found"),
            IntakeError::NoAddress => Self::bad_request("NO_ADDRESS", &err.to_string()),
            IntakeError::NoRecipients => Self::bad_request("NO_RECIPIENTS", &err.to_string()),
            IntakeError::NotBlocked(_) => Self::conflict("NOT_BLOCKED", &err.to_string()),
            IntakeError::Messages(MessageRepoError::NotFound) => {
                Self::not_found("message not found")
            }
            other => {
                tracing::error!(error = %other, "message intake failed");
                Self::internal_error("message intake failed")
            }
        }
    }
}

impl From<ConstituentError> for ProblemDetails {
    fn from(err: ConstituentError) -> Self {
        match err {
            ConstituentError::InvalidAddress(e) => Self::bad_request("INVALID_ADDRESS", &e.to_string()),
            ConstituentError::Unresolved(failure) => Self::unresolved(failure),
            ConstituentError::Lookup(e) => {
                tracing::warn!(error = %e, "address lookup failed");
                Self::bad_gateway("address lookup failed")
            }
            ConstituentError::Repo(ConstituentRepoError::NotFound) => {
                Self::not_found("constituent not found")
            }
            ConstituentError::Repo(ConstituentRepoError::NoAddress) => {
                Self::not_found("constituent has no address")
            }
            ConstituentError::Repo(ConstituentRepoError::DuplicateEmail) => {
                Self::conflict("DUPLICATE_EMAIL", "email already registered")
            }
            ConstituentError::Repo(other) => {
                tracing::error!(error = %other, "constituent storage failed");
                Self::internal_error("constituent storage failed")
            }
        }
    }
}

// ─── Requests and responses ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMessageRequest {
    pub sender_id: Uuid,
    /// Recipient addresses as written by the sender
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Correlation id of the inbound email; generated when absent
    #[serde(default)]
    pub email_uid: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateMessageResponse {
    pub message: Message,
    pub outcome: InboundOutcome,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageDeliveries {
    pub message_id: Uuid,
    pub status: MessageStatus,
    pub delivery_attempts: i32,
    pub deliveries: Vec<Delivery>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterConstituentRequest {
    pub email: String,
    pub address: NewAddress,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterConstituentResponse {
    pub constituent: Constituent,
    pub address: Address,
}

// ─── OpenAPI ────────────────────────────────────────────────────────────────

/// `OpenAPI` documentation for the REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Email Congress API",
        version = "1.0.0",
        description = "Message intake and delivery status for constituent email to Congress",
        license(name = "MIT")
    ),
    servers(
        (url = "/api/v1", description = "REST API v1")
    ),
    paths(
        create_message,
        resend_message,
        get_deliveries,
        register_constituent,
        change_address,
        resolve_district
    ),
    components(schemas(
        CreateMessageRequest,
        CreateMessageResponse,
        MessageDeliveries,
        RegisterConstituentRequest,
        RegisterConstituentResponse,
        ResolvedDistrict,
        ResolutionFailure,
        ProblemDetails,
        ProblemExtensions
    ))
)]
pub struct ApiDoc;

/// REST routes, to be nested under `/api/v1`.
///
/// Expects `Extension<Arc<InboundPipeline>>`, `Extension<Arc<ConstituentService>>`
/// and `Extension<Arc<dyn MessageRepo>>` layers.
pub fn router() -> Router {
    Router::new()
        .route("/messages", post(create_message))
        .route("/messages/{id}/resend", post(resend_message))
        .route("/messages/{id}/deliveries", get(get_deliveries))
        .route("/constituents", post(register_constituent))
        .route("/constituents/{id}/address", post(change_address))
        .route("/constituents/{id}/district", post(resolve_district))
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// Accept an inbound message and run it through the pipeline
///
/// # Errors
///
/// Returns `ProblemDetails` for unknown senders, empty recipient lists and
/// storage failures.
#[utoipa::path(
    post,
    path = "/messages",
    tag = "Messages",
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message stored and processed", body = CreateMessageResponse),
        (status = 400, description = "Invalid message", body = ProblemDetails),
        (status = 404, description = "Unknown sender", body = ProblemDetails),
        (status = 500, description = "Internal server error", body = ProblemDetails)
    )
)]
pub async fn create_message(
    Extension(pipeline): Extension<Arc<InboundPipeline>>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<CreateMessageResponse>), ProblemDetails> {
    let mut message = pipeline
        .create_message(req.sender_id, req.to, req.subject, req.body, req.email_uid)
        .await?;
    let outcome = pipeline.process_inbound(&message).await?;
    message.status = outcome.status;
    Ok((
        StatusCode::CREATED,
        Json(CreateMessageResponse { message, outcome }),
    ))
}

/// Re-send a message that was blocked by the rate limit
///
/// # Errors
///
/// Returns `ProblemDetails` with 409 when the message is not blocked.
#[utoipa::path(
    post,
    path = "/messages/{id}/resend",
    tag = "Messages",
    params(("id" = Uuid, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message re-evaluated", body = InboundOutcome),
        (status = 404, description = "Unknown message", body = ProblemDetails),
        (status = 409, description = "Message is not blocked", body = ProblemDetails)
    )
)]
pub async fn resend_message(
    Extension(pipeline): Extension<Arc<InboundPipeline>>,
    Path(id): Path<Uuid>,
) -> Result<Json<InboundOutcome>, ProblemDetails> {
    Ok(Json(pipeline.resend(id).await?))
}

/// Per-legislator delivery status of a message
///
/// # Errors
///
/// Returns `ProblemDetails` with 404 for unknown messages.
#[utoipa::path(
    get,
    path = "/messages/{id}/deliveries",
    tag = "Messages",
    params(("id" = Uuid, Path, description = "Message id")),
    responses(
        (status = 200, description = "Delivery status", body = MessageDeliveries),
        (status = 404, description = "Unknown message", body = ProblemDetails)
    )
)]
pub async fn get_deliveries(
    Extension(messages): Extension<Arc<dyn MessageRepo>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageDeliveries>, ProblemDetails> {
    let message = messages.get_message(id).await.map_err(message_problem)?;
    let deliveries = messages.list_deliveries(id).await.map_err(message_problem)?;
    Ok(Json(MessageDeliveries {
        message_id: message.id,
        status: message.status,
        delivery_attempts: message.delivery_attempts,
        deliveries,
    }))
}

/// Register a constituent with a first address
///
/// # Errors
///
/// Returns `ProblemDetails` for invalid addresses and duplicate emails.
#[utoipa::path(
    post,
    path = "/constituents",
    tag = "Constituents",
    request_body = RegisterConstituentRequest,
    responses(
        (status = 201, description = "Constituent created", body = RegisterConstituentResponse),
        (status = 400, description = "Invalid address", body = ProblemDetails),
        (status = 409, description = "Email already registered", body = ProblemDetails)
    )
)]
pub async fn register_constituent(
    Extension(service): Extension<Arc<ConstituentService>>,
    Json(req): Json<RegisterConstituentRequest>,
) -> Result<(StatusCode, Json<RegisterConstituentResponse>), ProblemDetails> {
    let (constituent, address) = service.register(&req.email, req.address).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterConstituentResponse {
            constituent,
            address,
        }),
    ))
}

/// Replace the current address with a new generation
///
/// # Errors
///
/// Returns `ProblemDetails` for invalid addresses and unknown constituents.
#[utoipa::path(
    post,
    path = "/constituents/{id}/address",
    tag = "Constituents",
    params(("id" = Uuid, Path, description = "Constituent id")),
    request_body = NewAddress,
    responses(
        (status = 201, description = "New address generation", body = Address),
        (status = 400, description = "Invalid address", body = ProblemDetails),
        (status = 404, description = "Unknown constituent", body = ProblemDetails)
    )
)]
pub async fn change_address(
    Extension(service): Extension<Arc<ConstituentService>>,
    Path(id): Path<Uuid>,
    Json(address): Json<NewAddress>,
) -> Result<(StatusCode, Json<Address>), ProblemDetails> {
    let address = service.change_address(id, address).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// Resolve and record the district of a constituent's current address
///
/// # Errors
///
/// Returns `ProblemDetails` with 422 when no district can be determined.
#[utoipa::path(
    post,
    path = "/constituents/{id}/district",
    tag = "Constituents",
    params(("id" = Uuid, Path, description = "Constituent id")),
    responses(
        (status = 200, description = "District resolved and recorded", body = ResolvedDistrict),
        (status = 404, description = "Unknown constituent", body = ProblemDetails),
        (status = 422, description = "District could not be resolved", body = ProblemDetails)
    )
)]
pub async fn resolve_district(
    Extension(service): Extension<Arc<ConstituentService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResolvedDistrict>, ProblemDetails> {
    Ok(Json(service.resolve_district(id).await?))
}

fn message_problem(err: MessageRepoError) -> ProblemDetails {
    match err {
        MessageRepoError::NotFound => ProblemDetails::not_found("message not found"),
        other => {
            tracing::error!(error = %other, "message lookup failed");
            ProblemDetails::internal_error("message lookup failed")
        }
    }
}
