use std::sync::Arc;

use axum::{Json, extract::Extension, extract::rejection::JsonRejection, response::IntoResponse};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// `POST /availability {item_id, email}`.
///
/// 200 in both cases: `available=false` means the customer is now waiting.
pub async fn check_availability(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::AvailabilityRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };
    let item_id = match dto::parse_item_id(body.item_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let email = match dto::parse_email(&body.email) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.availability.check_availability(item_id, &email).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
