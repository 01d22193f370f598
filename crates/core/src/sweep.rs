//! Removes uploads and report artifacts the database no longer references.

use crate::pipeline::{artifact_owner, remove_quietly, AppContext};
use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

const ARTIFACT_PATTERNS: [&str; 3] = ["*_report.html", "*_report.pdf", "*_highlighted.pdf"];
/// Uploaded report logos share the upload directory but belong to settings.
pub const LOGO_PREFIX: &str = "logo_";

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub orphan_uploads: Vec<PathBuf>,
    pub orphan_artifacts: Vec<PathBuf>,
    /// Nothing was deleted.
    pub dry_run: bool,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.orphan_uploads.len() + self.orphan_artifacts.len()
    }
}

fn build_globset(patterns: &[&str]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat)?);
    }
    Ok(builder.build()?)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn files_under(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }
    WalkDir::new(root)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && !is_hidden(e.path()))
        .map(|e| e.into_path())
        .collect()
}

fn is_logo(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(LOGO_PREFIX))
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Finds orphans in the upload and report directories and deletes them unless `dry_run`.
pub async fn sweep(ctx: &AppContext, dry_run: bool) -> anyhow::Result<SweepReport> {
    let known_paths: HashSet<PathBuf> = storage::contract_paths(&ctx.pool)
        .await?
        .iter()
        .map(|p| canonical(Path::new(p)))
        .collect();
    let known_ids = storage::analysis_ids(&ctx.pool).await?;
    let artifacts = build_globset(&ARTIFACT_PATTERNS)?;
    let upload_dir = ctx.config.paths.upload_dir();
    let report_dir = ctx.config.paths.report_dir();

    let (orphan_uploads, orphan_artifacts) = tokio::task::spawn_blocking(move || {
        let uploads: Vec<PathBuf> = files_under(&upload_dir)
            .into_iter()
            .filter(|p| !is_logo(p) && !known_paths.contains(&canonical(p)))
            .collect();
        let reports: Vec<PathBuf> = files_under(&report_dir)
            .into_iter()
            .filter(|p| {
                let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
                    return false;
                };
                artifacts.is_match(name)
                    && artifact_owner(name).map_or(true, |id| !known_ids.contains(&id))
            })
            .collect();
        (uploads, reports)
    })
    .await
    .context("sweep walker failed")?;

    if !dry_run {
        for path in orphan_uploads.iter().chain(&orphan_artifacts) {
            remove_quietly(path);
        }
    }
    info!(
        uploads = orphan_uploads.len(),
        artifacts = orphan_artifacts.len(),
        dry_run,
        "sweep finished"
    );
    Ok(SweepReport {
        orphan_uploads,
        orphan_artifacts,
        dry_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_patterns_ignore_other_files() {
        let set = build_globset(&ARTIFACT_PATTERNS).unwrap();
        assert!(set.is_match("analysis_3_report.html"));
        assert!(set.is_match("analysis_3_highlighted.pdf"));
        assert!(!set.is_match("logo.png"));
        assert!(!set.is_match("analysis_3_notes.txt"));
    }

    #[test]
    fn lists_only_visible_top_level_files() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.pdf"), b"x").unwrap();
        std::fs::write(temp.path().join(".hidden"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("sub/b.pdf"), b"x").unwrap();
        let files = files_under(temp.path());
        assert_eq!(files, vec![temp.path().join("a.pdf")]);
        assert!(files_under(&temp.path().join("missing")).is_empty());
    }
}
