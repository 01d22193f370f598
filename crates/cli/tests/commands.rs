use providers::{ClauseClassifier, Prediction, ProviderError, ProviderRegistry};
use riskscan_cli::commands;
use riskscan_core::config::AppConfig;
use riskscan_core::pipeline::AppContext;
use riskscan_core::settings::DEFAULT_MODEL;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use storage::Table;
use tempfile::tempdir;

struct KeywordClassifier;

#[async_trait::async_trait]
impl ClauseClassifier for KeywordClassifier {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>, ProviderError> {
        Ok(texts
            .iter()
            .map(|t| Prediction {
                label: if t.contains("terminate") { "Termination" } else { "Other" }.into(),
                score: 0.9,
            })
            .collect())
    }

    fn model_spec(&self) -> &str {
        DEFAULT_MODEL
    }
}

async fn context(root: &Path) -> AppContext {
    let registry = ProviderRegistry::new().with_classifier(Arc::new(KeywordClassifier));
    AppContext::open(AppConfig::rooted_at(root), registry)
        .await
        .unwrap()
}

fn write_docx(path: &Path) {
    let xml = "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>\
        <w:p><w:r><w:t>This agreement is made between the supplier and the customer named in the schedule below.</w:t></w:r></w:p>\
        <w:p><w:r><w:t>Either party may terminate this agreement at any time by giving thirty days written notice.</w:t></w:r></w:p>\
        </w:body></w:document>";
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("word/document.xml", zip::write::FileOptions::default())
        .unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap();
}

#[tokio::test]
async fn analyze_history_and_delete() {
    let temp = tempdir().unwrap();
    let ctx = context(&temp.path().join("data")).await;
    let source = temp.path().join("supply deal.docx");
    write_docx(&source);

    let out = commands::analyze(&ctx, &source, false).await.unwrap();
    assert!(out.starts_with("analysis 1: supply_deal.docx (1 hits"));
    assert!(out.contains("Termination"));

    let json: serde_json::Value =
        serde_json::from_str(&commands::show(&ctx, 1, true).await.unwrap()).unwrap();
    assert_eq!(json["hits"][0]["category"], "Termination");

    let out = commands::reanalyze(&ctx, 1, false).await.unwrap();
    assert!(out.starts_with("analysis 2:"));

    let out = commands::history(&ctx, false).await.unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].trim_start().starts_with('2'));
    assert!(lines[0].contains("Termination"));

    assert_eq!(commands::delete(&ctx, 2).await.unwrap(), "deleted analysis 2\n");
    let out = commands::delete(&ctx, 1).await.unwrap();
    assert_eq!(out, "deleted analysis 1 and contract supply_deal.docx\n");
    assert_eq!(storage::count_rows(&ctx.pool, Table::Contracts).await.unwrap(), 0);
    assert_eq!(commands::history(&ctx, false).await.unwrap(), "no analyses\n");
}

#[tokio::test]
async fn analyze_rejects_unsupported_files() {
    let temp = tempdir().unwrap();
    let ctx = context(&temp.path().join("data")).await;
    let source = temp.path().join("notes.txt");
    std::fs::write(&source, "plain text").unwrap();

    let err = commands::analyze(&ctx, &source, false).await.unwrap_err();
    assert_eq!(err.to_string(), "Unsupported file type. Allowed: PDF or DOCX.");
    assert!(commands::analyze(&ctx, &temp.path().join("missing.pdf"), false)
        .await
        .is_err());
}

#[tokio::test]
async fn export_writes_reports() {
    let temp = tempdir().unwrap();
    let ctx = context(&temp.path().join("data")).await;
    let source = temp.path().join("deal.docx");
    write_docx(&source);
    commands::analyze(&ctx, &source, false).await.unwrap();

    let out = commands::export(&ctx, 1).await.unwrap();
    assert!(out.starts_with("html: "));
    assert!(out.contains("analysis_1_report.html"));
    assert!(ctx.artifacts(1).report_html.exists());
}

#[tokio::test]
async fn sweep_reports_orphans() {
    let temp = tempdir().unwrap();
    let ctx = context(&temp.path().join("data")).await;
    let stray = ctx.config.paths.upload_dir().join("stray.pdf");
    std::fs::write(&stray, b"%PDF-1.4").unwrap();

    let out = commands::sweep(&ctx, true).await.unwrap();
    assert!(out.contains("would remove"));
    assert!(out.ends_with("1 orphan file(s)\n"));
    assert!(stray.exists());

    let out = commands::sweep(&ctx, false).await.unwrap();
    assert!(out.contains("removed"));
    assert!(!stray.exists());
}

#[tokio::test]
async fn settings_set_persists() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("data");
    let ctx = context(&root).await;

    let out = commands::settings_set(
        &ctx,
        &["threshold=0.8".to_string(), "merge_window_chars=120".to_string()],
    )
    .await
    .unwrap();
    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(json["merge_window_chars"], 120);

    let reopened = context(&root).await;
    let settings = reopened.settings().await;
    assert_eq!(settings.threshold, 0.8);
    assert_eq!(settings.merge_window_chars, 120);

    assert!(commands::settings_set(&ctx, &["nope=1".to_string()]).await.is_err());
}
