use axum::{
    Router,
    routing::{get, post},
};

pub mod availability;
pub mod interests;
pub mod items;
pub mod notifications;
pub mod restock;
pub mod sales;
pub mod subscriptions;
pub mod system;

/// Router for every endpoint (no auth: storefront triggers are public).
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/availability", post(availability::check_availability))
        .route("/sales", post(sales::sell))
        .route("/interests", post(interests::register_interest))
        .route("/subscriptions", post(subscriptions::subscribe))
        .route("/notifications/:item_id", post(notifications::notify_interested))
        .nest("/restock", restock::router())
        .nest("/items", items::router())
}
