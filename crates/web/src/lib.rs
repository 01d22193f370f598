//! HTTP front end for contract risk analysis.

use anyhow::Context;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use riskscan_core::pipeline::AppContext;
use std::time::Instant;
use tracing::{info, Instrument};

pub mod error;
pub mod flash;
pub mod forms;
mod handlers;
pub mod views;

#[derive(Clone)]
pub struct AppState {
    pub ctx: AppContext,
}

impl AppState {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_body = state.ctx.config.server.max_body_mb * 1024 * 1024;
    Router::new()
        .route("/", get(handlers::dashboard))
        .route("/healthz", get(handlers::healthz))
        .route("/analyze", get(handlers::upload_form))
        .route("/analyze/run", post(handlers::run_analysis))
        .route("/analyze/:id", get(handlers::view_result))
        .route("/analyze/:id/export", post(handlers::export_report))
        .route("/analyze/:id/pdf", get(handlers::view_pdf))
        .route("/analyze/:id/pdf/highlighted", get(handlers::view_pdf_highlighted))
        .route("/analyze/:id/pdf/viewer/:mode", get(handlers::pdf_viewer))
        .route("/analyze/:id/pdf/coords/:mode", get(handlers::pdf_coords))
        .route("/analyze/:id/explain/:hit_id", post(handlers::explain_hit))
        .route("/history", get(handlers::list_history))
        .route("/history/:id", get(handlers::history_entry))
        .route("/history/:id/reanalyze", post(handlers::reanalyze))
        .route("/history/:id/delete", post(handlers::delete_analysis))
        .route(
            "/settings",
            get(handlers::settings_page).post(handlers::save_settings),
        )
        .route("/api/analyses/:id", get(handlers::analysis_json))
        .layer(from_fn(request_tracing))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

async fn request_tracing(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request.uri().path().to_string();
    let span = tracing::info_span!("http.request", method = %method, route = %route);
    let started = Instant::now();
    let response = next.run(request).instrument(span).await;
    info!(
        %method,
        %route,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Binds `server.bind` and serves until the process is stopped.
pub async fn serve(ctx: AppContext) -> anyhow::Result<()> {
    let bind = ctx.config.server.bind.clone();
    let app = build_router(AppState::new(ctx));
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "listening");
    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}
