use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(restock))
        .route("/simulate", post(simulate))
        .route("/delivery", post(standard_delivery))
}

/// `POST /restock [{item_id, name, quantity}]`.
pub async fn restock(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Vec<dto::RestockLine>>, JsonRejection>,
) -> axum::response::Response {
    let Json(lines) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };
    let entries = match dto::parse_restock_lines(lines) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.restock.restock(entries).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// `POST /restock/simulate {num_items?}`; an empty body picks a random count.
pub async fn simulate(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    let request: dto::SimulateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        dto::SimulateRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
            }
        }
    };

    match services.simulator.simulate(request.num_items).await {
        Ok(outcome) => Json(dto::SimulationView {
            entries: outcome.entries,
            summary: outcome.summary,
        })
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// `POST /restock/delivery`: every catalog item at its standard quantity.
pub async fn standard_delivery(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.simulator.standard_delivery().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
