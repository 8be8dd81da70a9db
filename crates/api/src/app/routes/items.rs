use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::PathRejection},
    response::IntoResponse,
    routing::get,
};

use quitute_infra::ServiceError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_items))
        .route("/:id", get(get_item))
        .route("/:id/reservations", get(list_reservations))
        .route("/:id/interests", get(list_interests))
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.store.list_items().await {
        Ok(items) => Json(items.iter().map(dto::ItemView::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::service_error_to_response(e.into()),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    path: Result<Path<i64>, PathRejection>,
) -> axum::response::Response {
    let item_id = match dto::path_item_id(path) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.store.get_item(item_id).await {
        Ok(Some(item)) => Json(dto::ItemView::from(&item)).into_response(),
        Ok(None) => errors::service_error_to_response(ServiceError::NotFound(item_id)),
        Err(e) => errors::service_error_to_response(e.into()),
    }
}

pub async fn list_reservations(
    Extension(services): Extension<Arc<AppServices>>,
    path: Result<Path<i64>, PathRejection>,
) -> axum::response::Response {
    let item_id = match dto::path_item_id(path) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.store.reservations_for_item(item_id).await {
        Ok(reservations) => Json(reservations).into_response(),
        Err(e) => errors::service_error_to_response(e.into()),
    }
}

pub async fn list_interests(
    Extension(services): Extension<Arc<AppServices>>,
    path: Result<Path<i64>, PathRejection>,
) -> axum::response::Response {
    let item_id = match dto::path_item_id(path) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.store.interests_for_item(item_id).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::service_error_to_response(e.into()),
    }
}
