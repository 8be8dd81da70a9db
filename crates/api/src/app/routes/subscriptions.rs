use std::sync::Arc;

use axum::{Json, extract::Extension, extract::rejection::JsonRejection, response::IntoResponse};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn subscribe(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::SubscriptionRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };
    let email = match dto::parse_email(&body.email) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.subscriptions.subscribe(&email).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
