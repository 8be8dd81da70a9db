use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use quitute_core::DomainError;
use quitute_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        ServiceError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        ServiceError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        ServiceError::OutOfStock {
            item_id,
            stock_quantity,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "out_of_stock",
                "message": message,
                "item_id": item_id,
                "stock_quantity": stock_quantity,
            })),
        )
            .into_response(),
        ServiceError::InsufficientStock {
            item_id,
            requested,
            stock_quantity,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "item_id": item_id,
                "requested": requested,
                "stock_quantity": stock_quantity,
            })),
        )
            .into_response(),
        ServiceError::StoreUnavailable(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message)
        }
        ServiceError::ChannelUnavailable(_) => {
            json_error(StatusCode::BAD_GATEWAY, "channel_unavailable", message)
        }
        ServiceError::Internal(_) => {
            tracing::error!(error = %message, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
        }
    }
}

/// Malformed input in a request body or path.
pub fn invalid_input(err: DomainError) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "validation_error",
        rejection.body_text(),
    )
}

pub fn path_rejection(rejection: PathRejection) -> axum::response::Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "validation_error",
        rejection.body_text(),
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
