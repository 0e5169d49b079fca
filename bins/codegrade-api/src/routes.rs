// Route definitions for the Codegrade API

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{handlers, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/evaluate", post(handlers::evaluate))
        .route("/evaluation/:id", get(handlers::get_evaluation))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
}
