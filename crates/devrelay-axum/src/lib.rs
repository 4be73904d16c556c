// Axum HTTP layer for the device relay.
//
// All business logic lives in the `devrelay` service crate; handlers here
// only parse requests, call a service, and shape the `{success, message,
// data}` response envelope the mobile clients and the admin panel expect.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use devrelay::admin::AdminClaims;
use devrelay::message_log::IncomingMessage;
use devrelay::registry::DevicePatch;
use devrelay::{AdminAuth, DeviceRegistry, MessageLog, Phonebook, RelayOptions};
use devrelay_core::db::adapter::Adapter;
use devrelay_core::error::RelayError;

// ─── Error Handling ──────────────────────────────────────────────

/// HTTP-facing error: a `RelayError` plus the status it maps to.
struct ApiError {
    status: StatusCode,
    error: RelayError,
}

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        let status = match &error {
            RelayError::Validation(_)
            | RelayError::ExhaustedRetries
            | RelayError::AlreadyFetched => StatusCode::BAD_REQUEST,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Conflict(_) => StatusCode::CONFLICT,
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RelayError::Transaction(_) | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self { status, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self.error {
            RelayError::Validation(_) => "VALIDATION",
            RelayError::NotFound(_) => "NOT_FOUND",
            RelayError::Conflict(_) => "CONFLICT",
            RelayError::ExhaustedRetries => "EXHAUSTED_RETRIES",
            RelayError::AlreadyFetched => "ALREADY_FETCHED",
            RelayError::Unauthorized(_) => "UNAUTHORIZED",
            RelayError::Transaction(_) => "TRANSACTION",
            RelayError::Internal(_) => "INTERNAL",
        };
        if self.status.is_server_error() {
            tracing::error!(code, error = %self.error, "request failed");
        }
        let body = serde_json::json!({
            "success": false,
            "code": code,
            "message": self.error.to_string(),
        });
        (self.status, Json(body)).into_response()
    }
}

fn success(status: StatusCode, message: &str, data: impl serde::Serialize) -> Response {
    let body = serde_json::json!({
        "success": true,
        "message": message,
        "data": data,
    });
    (status, Json(body)).into_response()
}

// ─── App State ───────────────────────────────────────────────────

/// Shared state handed to every handler: one instance of each service.
#[derive(Clone)]
pub struct RelayApp {
    pub registry: DeviceRegistry,
    pub message_log: MessageLog,
    pub phonebook: Phonebook,
    pub admin: AdminAuth,
}

impl RelayApp {
    pub fn new(options: &RelayOptions, adapter: Arc<dyn Adapter>) -> Self {
        Self {
            registry: DeviceRegistry::new(adapter.clone()),
            message_log: MessageLog::new(adapter.clone()),
            phonebook: Phonebook::new(adapter.clone()),
            admin: AdminAuth::new(adapter, &options.secret, options.token_ttl_secs),
        }
    }

    /// Build the full router, CORS included.
    pub fn router(&self, options: &RelayOptions) -> Router {
        let api = Router::new()
            .route("/", get(handle_banner))
            .route("/save-data", post(handle_save_data))
            .route("/formdata", post(handle_formdata))
            .route("/save-multi-message", post(handle_save_multi_message))
            .route("/get-forwarded-number", post(handle_get_forwarded_number))
            .route("/add-to-and-message", post(handle_add_to_and_message))
            .route("/fetch-to-and-message", post(handle_fetch_to_and_message))
            .route("/set-forward-status", post(handle_set_forward_status))
            .route("/phonenumber", post(handle_phone_number))
            .route("/admin/signin", post(handle_admin_signin))
            .route("/admin/check-auth", get(handle_admin_check_auth))
            .route("/admin/form-data", get(handle_admin_form_data))
            .route("/admin/save-data", get(handle_admin_save_data));

        Router::new()
            .route("/", get(handle_banner))
            .nest("/api", api)
            .layer(cors_layer(&options.trusted_origins))
            .with_state(self.clone())
    }
}

fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "skipping unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn require_admin(app: &RelayApp, headers: &HeaderMap) -> Result<AdminClaims, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| RelayError::unauthorized("missing bearer token"))?;
    Ok(app.admin.check_auth(token)?)
}

// ─── Route Handlers ─────────────────────────────────────────────

async fn handle_banner() -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "message": "device relay service is running",
    }))
}

async fn handle_save_data(
    State(app): State<RelayApp>,
    Json(patch): Json<DevicePatch>,
) -> Result<Response, ApiError> {
    let device_id = app
        .registry
        .resolve_or_create_device_id(patch.device_id.as_deref())
        .await?;
    let (record, created) = app.registry.upsert(&device_id, &patch).await?;

    let (status, message) = if created {
        (StatusCode::CREATED, "Device data saved")
    } else {
        (StatusCode::OK, "Device data updated")
    };
    Ok(success(status, message, record))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FormDataRequest {
    sender_phone_number: Option<String>,
    #[serde(rename = "recieverPhoneNumber", alias = "receiverPhoneNumber")]
    reciever_phone_number: Option<String>,
    message: Option<String>,
    time: Option<String>,
    device_id: Option<String>,
}

async fn handle_formdata(
    State(app): State<RelayApp>,
    Json(body): Json<FormDataRequest>,
) -> Result<Response, ApiError> {
    let record = app
        .message_log
        .record_message(
            body.sender_phone_number.as_deref().unwrap_or(""),
            body.reciever_phone_number.as_deref().unwrap_or(""),
            body.message.as_deref().unwrap_or(""),
            body.time.as_deref().unwrap_or(""),
            body.device_id.as_deref().unwrap_or(""),
        )
        .await?;
    Ok(success(StatusCode::CREATED, "Message saved", record))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MultiMessageRequest {
    device_id: Option<String>,
    #[serde(alias = "recieverPhoneNumber")]
    receiver_phone_number: Option<String>,
    messages: Vec<IncomingMessage>,
}

async fn handle_save_multi_message(
    State(app): State<RelayApp>,
    Json(body): Json<MultiMessageRequest>,
) -> Result<Response, ApiError> {
    let outcome = app
        .message_log
        .record_message_batch(
            body.device_id.as_deref().unwrap_or(""),
            body.receiver_phone_number.as_deref(),
            &body.messages,
        )
        .await?;
    Ok(success(StatusCode::CREATED, "Messages saved", outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DeviceIdRequest {
    device_id: Option<String>,
}

async fn handle_get_forwarded_number(
    State(app): State<RelayApp>,
    Json(body): Json<DeviceIdRequest>,
) -> Result<Response, ApiError> {
    let report = app
        .registry
        .forwarding_status(body.device_id.as_deref().unwrap_or(""))
        .await?;
    Ok(success(StatusCode::OK, "Forwarding status", report))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MailboxRequest {
    phone_no: Option<String>,
    to: Option<String>,
    message: Option<String>,
}

async fn handle_add_to_and_message(
    State(app): State<RelayApp>,
    Json(body): Json<MailboxRequest>,
) -> Result<Response, ApiError> {
    let (record, created) = app
        .registry
        .set_mailbox(
            body.phone_no.as_deref().unwrap_or(""),
            body.to.as_deref().unwrap_or(""),
            body.message.as_deref().unwrap_or(""),
        )
        .await?;
    let (status, message) = if created {
        (StatusCode::CREATED, "Instruction saved")
    } else {
        (StatusCode::OK, "Instruction updated")
    };
    Ok(success(status, message, record))
}

async fn handle_fetch_to_and_message(
    State(app): State<RelayApp>,
    Json(body): Json<DeviceIdRequest>,
) -> Result<Response, ApiError> {
    let mailbox = app
        .registry
        .consume_mailbox(body.device_id.as_deref().unwrap_or(""))
        .await?;
    Ok(success(StatusCode::OK, "Instruction fetched", mailbox))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ForwardStatusRequest {
    mobile_number: Option<String>,
    is_forwarded: Option<String>,
}

async fn handle_set_forward_status(
    State(app): State<RelayApp>,
    Json(body): Json<ForwardStatusRequest>,
) -> Result<Response, ApiError> {
    let record = app
        .registry
        .set_forwarding_status(
            body.mobile_number.as_deref().unwrap_or(""),
            body.is_forwarded.as_deref().unwrap_or(""),
        )
        .await?;
    Ok(success(StatusCode::OK, "Forwarding status updated", record))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PhoneNumberRequest {
    phone_number: Option<String>,
}

async fn handle_phone_number(
    State(app): State<RelayApp>,
    Json(body): Json<PhoneNumberRequest>,
) -> Result<Response, ApiError> {
    let record = app
        .phonebook
        .add_phone_number(body.phone_number.as_deref().unwrap_or(""))
        .await?;
    Ok(success(StatusCode::CREATED, "Phone number saved", record))
}

// ─── Admin Handlers ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SignInRequest {
    email: Option<String>,
    password: Option<String>,
}

async fn handle_admin_signin(
    State(app): State<RelayApp>,
    Json(body): Json<SignInRequest>,
) -> Result<Response, ApiError> {
    let signed = app
        .admin
        .sign_in(
            body.email.as_deref().unwrap_or(""),
            body.password.as_deref().unwrap_or(""),
        )
        .await?;
    let payload = serde_json::json!({
        "success": true,
        "message": "signed in",
        "token": signed.token,
        "admin": signed.claims,
    });
    Ok((StatusCode::OK, Json(payload)).into_response())
}

async fn handle_admin_check_auth(
    State(app): State<RelayApp>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let claims = require_admin(&app, &headers)?;
    Ok(success(StatusCode::OK, "authorized", claims))
}

async fn handle_admin_form_data(
    State(app): State<RelayApp>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_admin(&app, &headers)?;
    let messages = app.admin.list_messages().await?;
    Ok(success(StatusCode::OK, "Messages", messages))
}

async fn handle_admin_save_data(
    State(app): State<RelayApp>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_admin(&app, &headers)?;
    let devices = app.admin.list_devices().await?;
    Ok(success(StatusCode::OK, "Devices", devices))
}
