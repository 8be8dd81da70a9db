use std::sync::Arc;

use axum::{
    Json, extract::Extension, extract::rejection::JsonRejection, http::StatusCode,
    response::IntoResponse,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// `POST /sales {item_id, quantity?, email}`; quantity defaults to 1.
pub async fn sell(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::SaleRequest>, JsonRejection>,
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
    let quantity = body.quantity.unwrap_or(1);

    match services.sales.sell(item_id, quantity, &email).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
