//! Subcommand bodies. Each returns the text to print so it can be tested.

use anyhow::{bail, Context, Result};
use riskscan_core::pipeline::{self, AppContext};
use riskscan_core::settings::Settings;
use riskscan_core::sweep;
use serde_json::Value;
use std::fmt::Write;
use std::path::Path;

fn timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

async fn describe(ctx: &AppContext, analysis_id: i64, json: bool) -> Result<String> {
    let view = pipeline::load_result(ctx, analysis_id).await?;
    if json {
        return Ok(serde_json::to_string_pretty(&view)?);
    }
    let mut out = format!(
        "analysis {}: {} ({} hits, risk score {})\n",
        view.analysis.id,
        view.contract.filename,
        view.hits.len(),
        view.analysis.risk_score
    );
    for (i, hit) in view.hits.iter().enumerate() {
        let page = view
            .hit_pages
            .get(&hit.id)
            .map(|p| format!(" p.{p}"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  #{:<3} {:<24} {:.2} {:<6}{} {}",
            i + 1,
            hit.category,
            hit.prob,
            hit.severity,
            page,
            excerpt(&hit.text_excerpt, 70)
        );
    }
    if !view.summary_text.is_empty() {
        let _ = writeln!(out, "\n{}", view.summary_text);
    }
    Ok(out)
}

fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{cut}...")
}

pub async fn analyze(ctx: &AppContext, path: &Path, json: bool) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let analysis = pipeline::ingest_upload(ctx, &name, &bytes).await?;
    describe(ctx, analysis.id, json).await
}

pub async fn reanalyze(ctx: &AppContext, analysis_id: i64, json: bool) -> Result<String> {
    let analysis = pipeline::reanalyze(ctx, analysis_id).await?;
    describe(ctx, analysis.id, json).await
}

pub async fn show(ctx: &AppContext, analysis_id: i64, json: bool) -> Result<String> {
    describe(ctx, analysis_id, json).await
}

pub async fn history(ctx: &AppContext, json: bool) -> Result<String> {
    let rows = pipeline::history(ctx).await?;
    if json {
        return Ok(serde_json::to_string_pretty(&rows)?);
    }
    let mut out = String::new();
    for row in &rows {
        let a = &row.listing;
        let _ = writeln!(
            out,
            "{:>4}  {:<32} {:>3} {:>4}  {:<24} {}",
            a.id,
            a.filename,
            a.risk_score,
            a.total_hits,
            row.top_category.as_deref().unwrap_or("-"),
            timestamp(a.finished_at)
        );
    }
    if rows.is_empty() {
        out.push_str("no analyses\n");
    }
    Ok(out)
}

pub async fn delete(ctx: &AppContext, analysis_id: i64) -> Result<String> {
    let deleted = pipeline::delete_analysis(ctx, analysis_id).await?;
    let mut out = format!("deleted analysis {}", deleted.analysis_id);
    if deleted.contract_removed {
        let _ = write!(out, " and contract {}", deleted.contract.filename);
    }
    out.push('\n');
    Ok(out)
}

pub async fn export(ctx: &AppContext, analysis_id: i64) -> Result<String> {
    let exported = pipeline::export_reports(ctx, analysis_id).await?;
    let mut out = format!("html: {}\n", exported.html_path.display());
    match (&exported.pdf_path, &exported.pdf_error) {
        (Some(pdf), _) => {
            let _ = writeln!(out, "pdf:  {}", pdf.display());
        }
        (None, Some(err)) => {
            let _ = writeln!(out, "pdf:  {err}");
        }
        (None, None) => {}
    }
    Ok(out)
}

pub async fn sweep(ctx: &AppContext, dry_run: bool) -> Result<String> {
    let report = sweep::sweep(ctx, dry_run).await?;
    let verb = if report.dry_run { "would remove" } else { "removed" };
    let mut out = String::new();
    for path in report.orphan_uploads.iter().chain(&report.orphan_artifacts) {
        let _ = writeln!(out, "{verb} {}", path.display());
    }
    let _ = writeln!(out, "{} orphan file(s)", report.total());
    Ok(out)
}

pub async fn settings_show(ctx: &AppContext) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ctx.settings().await)?)
}

/// Applies `key=value` assignments on top of the current settings.
pub fn apply_assignments(current: &Settings, assignments: &[String]) -> Result<Settings> {
    let mut value = serde_json::to_value(current)?;
    let Value::Object(map) = &mut value else {
        bail!("settings are not an object");
    };
    for assignment in assignments {
        let (key, raw) = assignment
            .split_once('=')
            .with_context(|| format!("expected key=value, got {assignment:?}"))?;
        let key = key.trim();
        let Some(slot) = map.get_mut(key) else {
            bail!("unknown setting {key:?}");
        };
        *slot = if key == "category_thresholds" {
            let parsed = Settings::parse_category_thresholds(raw).map_err(anyhow::Error::msg)?;
            serde_json::to_value(parsed)?
        } else {
            match slot {
                Value::String(_) => Value::String(raw.to_string()),
                _ => serde_json::from_str(raw.trim())
                    .with_context(|| format!("invalid value for {key}: {raw}"))?,
            }
        };
    }
    let next: Settings = serde_json::from_value(value).context("invalid settings")?;
    if !(0.0..=1.0).contains(&next.threshold) {
        bail!("threshold must be within 0..1");
    }
    Ok(next)
}

pub async fn settings_set(ctx: &AppContext, assignments: &[String]) -> Result<String> {
    let next = apply_assignments(&ctx.settings().await, assignments)?;
    ctx.save_settings(next).await?;
    settings_show(ctx).await
}
