use std::sync::Arc;

use axum::{Json, extract::Extension, extract::rejection::JsonRejection, response::IntoResponse};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// `POST /interests {item_id, email, desired_quantity?}`: explicit "notify me".
pub async fn register_interest(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::InterestRequest>, JsonRejection>,
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

    match services
        .availability
        .register_interest(item_id, &email, body.desired_quantity)
        .await
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
