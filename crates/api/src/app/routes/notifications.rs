use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::PathRejection},
    response::IntoResponse,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// `POST /notifications/{item_id}`: run the dispatcher by hand.
/// Safe to repeat; already-notified customers are skipped.
pub async fn notify_interested(
    Extension(services): Extension<Arc<AppServices>>,
    path: Result<Path<i64>, PathRejection>,
) -> axum::response::Response {
    let item_id = match dto::path_item_id(path) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.dispatcher.notify_interested(item_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
