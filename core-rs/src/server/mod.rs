//! HTTP service
//!
//! Thin axum layer over `FetchPipeline`. Handlers hold no state of their
//! own; everything shared lives in `AppState`.

pub mod error;
pub mod routes;

use crate::pipeline::FetchPipeline;
use crate::tags::TagSet;
use axum::extract::Request;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use error::{ApiError, ErrorBody};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<FetchPipeline>,
    /// Tags of the host running the service, used when a module request
    /// names none
    pub host_tags: Arc<TagSet>,
}

impl AppState {
    pub fn new(pipeline: FetchPipeline, host_tags: TagSet) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            host_tags: Arc::new(host_tags),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/get_package",
            get(routes::get_package_query).post(routes::get_package_json),
        )
        .route("/get_modules", post(routes::get_modules))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                id = %Uuid::new_v4(),
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .with_state(state)
}

/// Bind and serve until Ctrl+C
pub async fn serve(state: AppState, bind: &str) -> crate::errors::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(address = %listener.local_addr()?, "pkgrelay listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
        })
        .await?;
    Ok(())
}
