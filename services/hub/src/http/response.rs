use axum::{http::StatusCode, response::IntoResponse, Json};
use hub_protocol::HttpErrorEnvelope;
use hub_store::KernelError;

pub type HttpResponse = axum::response::Response;
pub type HttpResult<T> = Result<Json<T>, HttpResponse>;

fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> HttpResponse {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.to_owned(),
            message: message.into(),
            details: None,
        }),
    )
        .into_response()
}

fn json_error_with_details(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
    details: serde_json::Value,
) -> HttpResponse {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.to_owned(),
            message: message.into(),
            details: Some(details),
        }),
    )
        .into_response()
}

pub fn missing_auth() -> HttpResponse {
    json_error(StatusCode::UNAUTHORIZED, "missing-auth", "missing bearer token")
}

pub fn invalid_auth() -> HttpResponse {
    json_error(StatusCode::UNAUTHORIZED, "invalid-auth", "bearer token rejected")
}

pub fn payload_too_large(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::PAYLOAD_TOO_LARGE, "payload-too-large", message)
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, "invalid-input", message)
}

/// Projects a [`KernelError`] to its HTTP status + error taxonomy code
/// (§7). The WS path never takes this route — mutation errors are an
/// HTTP-only concept there.
pub fn kernel_error(err: KernelError) -> HttpResponse {
    match err {
        KernelError::InvalidInput(msg) => json_error(StatusCode::BAD_REQUEST, "invalid-input", msg),
        KernelError::ContentTooLarge(msg) => payload_too_large(msg),
        KernelError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not-found", msg),
        KernelError::VersionConflict { current_version } => json_error_with_details(
            StatusCode::CONFLICT,
            "version-conflict",
            "the message has been modified since expected_version",
            serde_json::json!({ "current_version": current_version }),
        ),
        KernelError::CrossChannelMove => json_error(
            StatusCode::CONFLICT,
            "cross-channel-move",
            "retopic target topic is not in the source topic's channel",
        ),
        KernelError::StoreBusy => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "store-busy",
            "store is busy; retry the request",
        ),
        KernelError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal-error", e.to_string())
        }
    }
}
