use crate::error::AppError;
use crate::flash::{redirect_with, Flash, Level};
use crate::{forms, views, AppState};
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use riskscan_core::parser;
use riskscan_core::pipeline::{self, PdfCoordinates, PipelineError};
use riskscan_core::sweep::LOGO_PREFIX;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

type HandlerResult = Result<Response, AppError>;

fn result_path(id: i64) -> String {
    format!("/analyze/{id}")
}

async fn file_response(path: PathBuf, content_type: &str, disposition: String) -> HandlerResult {
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub(crate) async fn healthz() -> &'static str {
    "ok"
}

pub(crate) async fn dashboard(State(state): State<AppState>, Query(flash): Query<Flash>) -> HandlerResult {
    let overview = pipeline::overview(&state.ctx).await?;
    Ok(Html(views::dashboard(&overview, &flash)).into_response())
}

pub(crate) async fn upload_form(State(state): State<AppState>, Query(flash): Query<Flash>) -> HandlerResult {
    let settings = state.ctx.settings().await;
    Ok(Html(views::upload_form(settings.upload_max_mb, &flash)).into_response())
}

pub(crate) async fn run_analysis(State(state): State<AppState>, mut multipart: Multipart) -> HandlerResult {
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await?;
            upload = Some((name, data));
        }
    }
    let (name, data) = upload.unwrap_or_default();
    match pipeline::ingest_upload(&state.ctx, &name, &data).await {
        Ok(analysis) => Ok(Redirect::to(&result_path(analysis.id)).into_response()),
        Err(err) if err.is_rejection() => {
            let level = match &err {
                PipelineError::EmptyUpload => Level::Warning,
                _ => Level::Danger,
            };
            Ok(redirect_with("/analyze", level, &err.to_string()).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn view_result(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(flash): Query<Flash>,
) -> HandlerResult {
    let view = pipeline::load_result(&state.ctx, id).await?;
    Ok(Html(views::result(&view, &flash)).into_response())
}

pub(crate) async fn export_report(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    let exported = pipeline::export_reports(&state.ctx, id).await?;
    if let Some(err) = &exported.pdf_error {
        warn!(analysis = id, error = %err, "exported without pdf");
    }
    let name = exported
        .html_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.html".to_string());
    file_response(
        exported.html_path,
        "text/html; charset=utf-8",
        format!("attachment; filename=\"{name}\""),
    )
    .await
}

fn not_pdf_redirect(id: i64, err: &PipelineError) -> Response {
    redirect_with(&result_path(id), Level::Warning, &err.to_string()).into_response()
}

pub(crate) async fn view_pdf(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    match pipeline::original_pdf(&state.ctx, id).await {
        Ok(path) => file_response(path, "application/pdf", "inline".to_string()).await,
        Err(err @ PipelineError::NotPdf) => Ok(not_pdf_redirect(id, &err)),
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn view_pdf_highlighted(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    match pipeline::highlighted_pdf(&state.ctx, id).await {
        Ok(pdf) => {
            if let Some(warning) = &pdf.warning {
                warn!(analysis = id, %warning, "highlighted pdf");
            }
            file_response(pdf.path, "application/pdf", "inline".to_string()).await
        }
        Err(err @ PipelineError::NotPdf) => Ok(not_pdf_redirect(id, &err)),
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn pdf_viewer(
    State(state): State<AppState>,
    Path((id, mode)): Path<(i64, String)>,
    Query(flash): Query<Flash>,
) -> HandlerResult {
    match pipeline::original_pdf(&state.ctx, id).await {
        Ok(_) => {}
        Err(err @ PipelineError::NotPdf) => return Ok(not_pdf_redirect(id, &err)),
        Err(err) => return Err(err.into()),
    }
    let (file_url, overlay) = if mode == "highlighted" {
        (format!("/analyze/{id}/pdf/highlighted"), false)
    } else {
        (format!("/analyze/{id}/pdf"), true)
    };
    let coords_url = format!("/analyze/{id}/pdf/coords/{mode}");
    Ok(Html(views::pdf_viewer(id, &file_url, &coords_url, overlay, &flash)).into_response())
}

#[derive(Serialize)]
struct CoordsBody {
    ok: bool,
    #[serde(flatten)]
    coords: PdfCoordinates,
}

pub(crate) async fn pdf_coords(State(state): State<AppState>, Path((id, _mode)): Path<(i64, String)>) -> Response {
    match pipeline::pdf_coordinates(&state.ctx, id).await {
        Ok(coords) => Json(CoordsBody { ok: true, coords }).into_response(),
        Err(PipelineError::NotPdf) => AppError::BadRequest("Not a PDF".to_string()).into_json(),
        Err(err) => AppError::from(err).into_json(),
    }
}

pub(crate) async fn explain_hit(
    State(state): State<AppState>,
    Path((id, hit_id)): Path<(i64, i64)>,
) -> Response {
    match pipeline::explain_hit(&state.ctx, id, hit_id).await {
        Ok(explanation) => Json(json!({ "ok": true, "explanation": explanation })).into_response(),
        Err(err) => AppError::from(err).into_json(),
    }
}

pub(crate) async fn list_history(State(state): State<AppState>, Query(flash): Query<Flash>) -> HandlerResult {
    let rows = pipeline::history(&state.ctx).await?;
    Ok(Html(views::history(&rows, &flash)).into_response())
}

pub(crate) async fn history_entry(Path(id): Path<i64>) -> Redirect {
    Redirect::to(&result_path(id))
}

pub(crate) async fn reanalyze(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    match pipeline::reanalyze(&state.ctx, id).await {
        Ok(analysis) => Ok(redirect_with(
            &result_path(analysis.id),
            Level::Success,
            "Re-analysis completed.",
        )
        .into_response()),
        Err(err @ PipelineError::SourceMissing) => {
            Ok(redirect_with("/history", Level::Danger, &err.to_string()).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn delete_analysis(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    pipeline::delete_analysis(&state.ctx, id).await?;
    Ok(redirect_with("/history", Level::Success, "Analysis deleted.").into_response())
}

pub(crate) async fn settings_page(State(state): State<AppState>, Query(flash): Query<Flash>) -> HandlerResult {
    let settings = state.ctx.settings().await;
    Ok(Html(views::settings(&settings, &flash)).into_response())
}

pub(crate) async fn save_settings(State(state): State<AppState>, mut multipart: Multipart) -> HandlerResult {
    let mut form = HashMap::new();
    let mut logo: Option<(String, Bytes)> = None;
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "logo" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await?;
            if !file_name.is_empty() && !data.is_empty() {
                logo = Some((file_name, data));
            }
        } else {
            form.insert(name, field.text().await?);
        }
    }

    let current = state.ctx.settings().await;
    let mut next = match forms::apply_settings_form(&current, &form) {
        Ok(next) => next,
        Err(message) => return Ok(redirect_with("/settings", Level::Danger, &message).into_response()),
    };
    if let Some((file_name, data)) = logo {
        let dir = state.ctx.config.paths.upload_dir();
        let path = dir.join(format!("{LOGO_PREFIX}{}", parser::sanitize_filename(&file_name)));
        tokio::fs::create_dir_all(&dir)
            .await
            .context("creating upload dir")?;
        tokio::fs::write(&path, &data)
            .await
            .with_context(|| format!("saving logo {}", path.display()))?;
        info!(path = %path.display(), "logo uploaded");
        next.logo_path = path.to_string_lossy().into_owned();
    }
    state.ctx.save_settings(next).await?;
    Ok(redirect_with("/settings", Level::Success, "Settings saved.").into_response())
}

pub(crate) async fn analysis_json(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match pipeline::load_result(&state.ctx, id).await {
        Ok(view) => Json(view).into_response(),
        Err(err) => AppError::from(err).into_json(),
    }
}
