//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: picks store/bus/channel implementations and builds services
//! - `routes/`: HTTP routes + handlers (one file per operation area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, StartupError> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(router_with(services))
}

/// Router over already-built services (tests inject their own).
pub fn router_with(services: Arc<AppServices>) -> Router {
    routes::router()
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
