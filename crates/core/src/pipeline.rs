//! Request-scoped operations: upload, analyze, view, export, delete.

use crate::config::{AppConfig, ClassifierConfig};
use crate::classifier::{self, ClassifyOptions};
use crate::highlight::{self, HighlightSpan};
use crate::models::ParsedDocument;
use crate::parser::{self, page_for_offset};
use crate::pdf_highlight::{self, HitInput, HitRect};
use crate::report;
use crate::scoring;
use crate::settings::Settings;
use crate::summarizer;
use anyhow::Context;
use providers::gemini::{GeminiConfig, GeminiProvider};
use providers::huggingface::{self, HuggingFaceConfig, HuggingFaceFactory};
use providers::noop::NoopFactory;
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::{ClassifierFactory, LlmProvider, ProviderRegistry};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::models::{
    Analysis, AnalysisListing, Contract, DeletedAnalysis, Hit, NewAnalysis, NewContract, NewHit,
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const MODEL_VERSION: &str = "1.0";
pub const UNREADABLE_SOURCE: &str = "(Unable to load source text. File moved or deleted.)";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Please choose a file.")]
    EmptyUpload,
    #[error("Unsupported file type. Allowed: PDF or DOCX.")]
    UnsupportedType,
    #[error("File too large (> {0} MB).")]
    TooLarge(u64),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Original file not found on disk.")]
    SourceMissing,
    #[error("Original file is not a PDF or not found.")]
    NotPdf,
    #[error("Gemini disabled in settings.")]
    LlmDisabled,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    /// Rejections caused by the request itself, shown to the user as-is.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Shared state every operation runs against.
#[derive(Clone)]
pub struct AppContext {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub registry: ProviderRegistry,
    settings: Arc<RwLock<Settings>>,
}

impl AppContext {
    /// Opens the database, applies migrations, creates data directories and loads settings.
    pub async fn open(config: AppConfig, registry: ProviderRegistry) -> anyhow::Result<Self> {
        let pool = storage::connect(&config.database.path)
            .await
            .context("db connect")?;
        storage::migrate(&pool).await.context("db migrate")?;
        tokio::fs::create_dir_all(config.paths.upload_dir())
            .await
            .context("creating upload dir")?;
        tokio::fs::create_dir_all(config.paths.report_dir())
            .await
            .context("creating report dir")?;
        let settings = Settings::load(Path::new(&config.paths.settings_path))?;
        Ok(Self {
            pool,
            config: Arc::new(config),
            registry,
            settings: Arc::new(RwLock::new(settings)),
        })
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Persists and activates new settings.
    pub async fn save_settings(&self, settings: Settings) -> anyhow::Result<()> {
        let mut guard = self.settings.write().await;
        settings.save(Path::new(&self.config.paths.settings_path))?;
        *guard = settings;
        info!("settings saved");
        Ok(())
    }

    pub fn llm(&self) -> Option<Arc<dyn LlmProvider>> {
        self.registry.llm(None).ok()
    }

    /// `gemini_model` only applies to the Gemini provider; others keep their own model.
    pub fn llm_model<'a>(&self, settings: &'a Settings) -> Option<&'a str> {
        match self.registry.preferred_llm.as_deref() {
            Some("gemini") => Some(settings.gemini_model.as_str()),
            _ => None,
        }
    }

    pub fn artifacts(&self, analysis_id: i64) -> Artifacts {
        Artifacts::for_analysis(&self.config.paths.report_dir(), analysis_id)
    }
}

/// Provider registry from the environment: Hugging Face classifier endpoint plus
/// whichever LLMs have API keys.
pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let token = std::env::var("HF_API_TOKEN").ok().filter(|t| !t.is_empty());
    let mut reg = ProviderRegistry::new().with_classifier_factory(classifier_factory(&config.classifier, token));

    if let Some(key) = std::env::var_os("GEMINI_API_KEY").filter(|k| !k.is_empty()) {
        let provider = GeminiProvider::new(GeminiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url: config.llm.gemini_base_url.clone(),
            model: crate::settings::DEFAULT_GEMINI_MODEL.to_string(),
        });
        reg = reg.with_llm("gemini", Arc::new(provider));
    }

    if let Some(key) = std::env::var_os("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
        let base = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string());
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url: base,
            chat_model: DEFAULT_OPENAI_MODEL.to_string(),
        });
        reg = reg.with_llm("openai", Arc::new(provider));
    }

    reg.set_preferred_llm(&config.llm.provider)
}

/// The public inference API refuses anonymous calls; with no token and no
/// endpoint of its own the deployment labels every segment `Other`.
pub fn classifier_factory(
    config: &ClassifierConfig,
    api_token: Option<String>,
) -> Arc<dyn ClassifierFactory> {
    let base_url = config.base_url.trim().trim_end_matches('/');
    if base_url.is_empty() || (base_url == huggingface::DEFAULT_BASE_URL && api_token.is_none()) {
        warn!("no classifier endpoint configured (set HF_API_TOKEN or classifier.base_url); no clauses will be flagged");
        return Arc::new(NoopFactory);
    }
    Arc::new(HuggingFaceFactory::new(HuggingFaceConfig {
        base_url: base_url.to_string(),
        api_token,
    }))
}

/// Generated files owned by one analysis.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub report_html: PathBuf,
    pub report_pdf: PathBuf,
    pub highlighted_pdf: PathBuf,
}

impl Artifacts {
    pub fn for_analysis(report_dir: &Path, analysis_id: i64) -> Self {
        let name = |suffix: &str| report_dir.join(format!("analysis_{analysis_id}_{suffix}"));
        Self {
            report_html: name("report.html"),
            report_pdf: name("report.pdf"),
            highlighted_pdf: name("highlighted.pdf"),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.report_html, &self.report_pdf, &self.highlighted_pdf]
    }
}

/// Analysis id encoded in an artifact file name, if it is one.
pub fn artifact_owner(file_name: &str) -> Option<i64> {
    let rest = file_name.strip_prefix("analysis_")?;
    let (id, _) = rest.split_once('_')?;
    id.parse().ok()
}

async fn blocking<T, F>(f: F) -> PipelineResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let out = tokio::task::spawn_blocking(f)
        .await
        .context("blocking task failed")??;
    Ok(out)
}

/// Removes a file if present; failures are logged and ignored.
pub fn remove_quietly(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed file"),
        Err(err) => warn!(path = %path.display(), error = %err, "could not remove file"),
    }
}

async fn parse_source(path: PathBuf) -> PipelineResult<ParsedDocument> {
    blocking(move || parser::parse_document(&path)).await
}

/// Stores an upload, records its contract and runs the first analysis.
pub async fn ingest_upload(
    ctx: &AppContext,
    original_name: &str,
    bytes: &[u8],
) -> PipelineResult<Analysis> {
    if original_name.trim().is_empty() {
        return Err(PipelineError::EmptyUpload);
    }
    if !parser::is_allowed_upload(original_name) {
        return Err(PipelineError::UnsupportedType);
    }
    let settings = ctx.settings().await;
    if bytes.len() as u64 > settings.upload_max_bytes() {
        return Err(PipelineError::TooLarge(settings.upload_max_mb));
    }

    let filename = parser::sanitize_filename(original_name);
    let upload_dir = ctx.config.paths.upload_dir();
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .context("creating upload dir")?;
    let stamp = chrono::Utc::now().timestamp();
    let mut stored = upload_dir.join(format!("{stamp}_{filename}"));
    let mut n = 1;
    while stored.exists() {
        stored = upload_dir.join(format!("{stamp}_{n}_{filename}"));
        n += 1;
    }
    tokio::fs::write(&stored, bytes)
        .await
        .with_context(|| format!("saving upload {}", stored.display()))?;
    info!(file = %stored.display(), size = bytes.len(), "upload stored");

    let path = stored.clone();
    let parsed = blocking(move || {
        let parsed = parser::parse_document(&path)?;
        let hash = parser::file_checksum(&path)?;
        Ok((parsed, hash))
    })
    .await;
    let (parsed, file_hash) = match parsed {
        Ok(v) => v,
        Err(err) => {
            remove_quietly(&stored);
            return Err(err);
        }
    };

    let scored = match score_parsed(ctx, &parsed, &settings).await {
        Ok(scored) => scored,
        Err(err) => {
            remove_quietly(&stored);
            return Err(err);
        }
    };
    let new_contract = NewContract {
        filename,
        path: stored.to_string_lossy().into_owned(),
        file_hash: Some(file_hash),
        num_pages: parsed.num_pages as i64,
    };
    let (contract, analysis) = match storage::insert_contract_with_analysis(
        &ctx.pool,
        &new_contract,
        &scored.new_analysis(0),
        &scored.hits,
    )
    .await
    {
        Ok(rows) => rows,
        Err(err) => {
            remove_quietly(&stored);
            return Err(err.into());
        }
    };
    finish_analysis(ctx, &contract, analysis, &scored, &settings).await
}

/// Runs a fresh analysis of a stored contract with the current settings.
pub async fn analyze_contract(ctx: &AppContext, contract: &Contract) -> PipelineResult<Analysis> {
    let path = PathBuf::from(&contract.path);
    if !path.exists() {
        return Err(PipelineError::SourceMissing);
    }
    let parsed = parse_source(path).await?;
    let settings = ctx.settings().await;
    analyze_parsed(ctx, contract, &parsed, &settings).await
}

/// Classifier output for one document, ready to be stored.
struct Scored {
    model_name: String,
    risk_score: i64,
    hits: Vec<NewHit>,
    by_category: BTreeMap<String, Vec<String>>,
}

impl Scored {
    fn new_analysis(&self, contract_id: i64) -> NewAnalysis {
        NewAnalysis {
            contract_id,
            model_name: self.model_name.clone(),
            model_version: MODEL_VERSION.to_string(),
            risk_score: self.risk_score,
        }
    }
}

async fn score_parsed(
    ctx: &AppContext,
    parsed: &ParsedDocument,
    settings: &Settings,
) -> PipelineResult<Scored> {
    let model_spec = settings.model_name_or_path.as_str();
    let clf = ctx
        .registry
        .classifier(model_spec)
        .with_context(|| format!("loading classifier {model_spec}"))?;
    let spans = classifier::classify_text(
        &parsed.text,
        &parsed.page_offsets,
        clf.as_ref(),
        ClassifyOptions {
            settings,
            batch_size: ctx.config.classifier.batch_size,
        },
    )
    .await?;

    let risk_score = scoring::risk_score(spans.iter().map(|s| (s.category.as_str(), s.prob)));
    let mut by_category: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for s in &spans {
        by_category.entry(s.category.clone()).or_default().push(s.text.clone());
    }
    let hits = spans
        .into_iter()
        .map(|s| NewHit {
            severity: s.severity.as_str().to_string(),
            category: s.category,
            prob: s.prob as f64,
            page_no: s.page_no as i64,
            start_char: s.start as i64,
            end_char: s.end as i64,
            text_excerpt: s.text,
            ambiguous: s.ambiguous,
        })
        .collect();
    Ok(Scored {
        model_name: classifier::model_display_name(model_spec),
        risk_score,
        hits,
        by_category,
    })
}

async fn analyze_parsed(
    ctx: &AppContext,
    contract: &Contract,
    parsed: &ParsedDocument,
    settings: &Settings,
) -> PipelineResult<Analysis> {
    let scored = score_parsed(ctx, parsed, settings).await?;
    let analysis =
        storage::insert_analysis(&ctx.pool, &scored.new_analysis(contract.id), &scored.hits).await?;
    finish_analysis(ctx, contract, analysis, &scored, settings).await
}

/// Logs the stored analysis and writes the optional summary.
async fn finish_analysis(
    ctx: &AppContext,
    contract: &Contract,
    analysis: Analysis,
    scored: &Scored,
    settings: &Settings,
) -> PipelineResult<Analysis> {
    info!(
        analysis = analysis.id,
        contract = contract.id,
        hits = analysis.total_hits,
        risk_score = scored.risk_score,
        "analysis finished"
    );
    if settings.enable_gemini {
        let llm = ctx.llm();
        let text = summarizer::generate_overall_summary(
            llm.as_deref(),
            ctx.llm_model(settings),
            &scored.by_category,
        )
        .await;
        storage::insert_summary(&ctx.pool, analysis.id, &text).await?;
    }
    Ok(analysis)
}

async fn analysis_with_contract(
    ctx: &AppContext,
    analysis_id: i64,
) -> PipelineResult<(Analysis, Contract)> {
    let analysis = storage::get_analysis(&ctx.pool, analysis_id)
        .await?
        .ok_or(PipelineError::NotFound("analysis"))?;
    let contract = storage::get_contract(&ctx.pool, analysis.contract_id)
        .await?
        .ok_or(PipelineError::NotFound("contract"))?;
    Ok((analysis, contract))
}

/// New analysis of the same contract; earlier analyses stay as they are.
pub async fn reanalyze(ctx: &AppContext, analysis_id: i64) -> PipelineResult<Analysis> {
    let (_, contract) = analysis_with_contract(ctx, analysis_id).await?;
    analyze_contract(ctx, &contract).await
}

/// Deletes an analysis and its artifacts, plus the contract and upload when nothing else uses them.
pub async fn delete_analysis(ctx: &AppContext, analysis_id: i64) -> PipelineResult<DeletedAnalysis> {
    let deleted = storage::delete_analysis(&ctx.pool, analysis_id)
        .await?
        .ok_or(PipelineError::NotFound("analysis"))?;
    for path in ctx.artifacts(analysis_id).all() {
        remove_quietly(path);
    }
    if deleted.contract_removed {
        remove_quietly(Path::new(&deleted.contract.path));
    }
    info!(
        analysis = analysis_id,
        contract_removed = deleted.contract_removed,
        "analysis deleted"
    );
    Ok(deleted)
}

/// Everything the result page shows.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisView {
    pub analysis: Analysis,
    pub contract: Contract,
    #[serde(skip)]
    pub text: String,
    pub source_available: bool,
    #[serde(skip)]
    pub annotated_html: String,
    pub hits: Vec<Hit>,
    /// 1-based anchor number of each hit id in the annotated preview.
    pub hit_index: HashMap<i64, usize>,
    pub counts: BTreeMap<String, usize>,
    #[serde(skip)]
    pub hits_by_category: BTreeMap<String, Vec<Hit>>,
    pub category_colors: BTreeMap<String, String>,
    pub summary_text: String,
    pub is_pdf: bool,
    pub hit_pages: HashMap<i64, u32>,
}

pub async fn load_result(ctx: &AppContext, analysis_id: i64) -> PipelineResult<AnalysisView> {
    let (analysis, contract) = analysis_with_contract(ctx, analysis_id).await?;
    let source = PathBuf::from(&contract.path);
    let parsed = match parse_source(source.clone()).await {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(analysis = analysis_id, error = %err, "source text unavailable");
            None
        }
    };
    let hits = storage::hits_for_analysis(&ctx.pool, analysis_id).await?;

    let text = parsed
        .as_ref()
        .map(|p| p.text.clone())
        .unwrap_or_else(|| UNREADABLE_SOURCE.to_string());
    let spans: Vec<HighlightSpan<'_>> = hits
        .iter()
        .map(|h| HighlightSpan {
            start: h.start_char.max(0) as usize,
            end: h.end_char.max(0) as usize,
            category: &h.category,
            prob: h.prob as f32,
        })
        .collect();
    let annotated_html = highlight::inject_highlights(&text, &spans);

    let mut hit_index = HashMap::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut hits_by_category: BTreeMap<String, Vec<Hit>> = BTreeMap::new();
    for (i, h) in hits.iter().enumerate() {
        hit_index.insert(h.id, i + 1);
        *counts.entry(h.category.clone()).or_default() += 1;
        hits_by_category.entry(h.category.clone()).or_default().push(h.clone());
    }
    let category_colors = hits_by_category
        .keys()
        .map(|c| (c.clone(), highlight::category_color(c).to_string()))
        .collect();

    let is_pdf = parser::is_pdf(&source);
    let mut hit_pages = HashMap::new();
    if is_pdf {
        if let Some(p) = &parsed {
            for h in &hits {
                hit_pages.insert(h.id, page_for_offset(&p.page_offsets, h.start_char.max(0) as usize));
            }
        }
    }
    let summary_text = storage::latest_summary(&ctx.pool, analysis_id)
        .await?
        .map(|s| s.output_text)
        .unwrap_or_default();

    Ok(AnalysisView {
        analysis,
        contract,
        text,
        source_available: parsed.is_some(),
        annotated_html,
        hits,
        hit_index,
        counts,
        hits_by_category,
        category_colors,
        summary_text,
        is_pdf,
        hit_pages,
    })
}

#[derive(Debug, Clone)]
pub struct ExportedReports {
    pub html_path: PathBuf,
    pub pdf_path: Option<PathBuf>,
    /// Why the PDF could not be written; the HTML export still succeeded.
    pub pdf_error: Option<String>,
}

pub async fn export_reports(ctx: &AppContext, analysis_id: i64) -> PipelineResult<ExportedReports> {
    let (_, contract) = analysis_with_contract(ctx, analysis_id).await?;
    let hits = storage::hits_for_analysis(&ctx.pool, analysis_id).await?;
    let summary = storage::latest_summary(&ctx.pool, analysis_id)
        .await?
        .map(|s| s.output_text)
        .unwrap_or_default();
    let settings = ctx.settings().await;
    let title = format!("Risk Report - {}", contract.filename);
    let artifacts = ctx.artifacts(analysis_id);

    let logo = Some(settings.logo_path.as_str()).filter(|l| !l.is_empty());
    let html = report::render_report_html(&title, &hits, &summary, &settings.disclaimer, logo);
    let html_path = artifacts.report_html.clone();
    let pdf_path = artifacts.report_pdf.clone();
    let disclaimer = settings.disclaimer.clone();
    let pdf_result = {
        let html_path = html_path.clone();
        let pdf_path = pdf_path.clone();
        blocking(move || {
            report::save_html_report(&html_path, &html)?;
            Ok(report::save_pdf_report(&pdf_path, &title, &hits, &summary, &disclaimer))
        })
        .await?
    };
    let (pdf_path, pdf_error) = match pdf_result {
        Ok(()) => (Some(pdf_path), None),
        Err(err) => {
            warn!(analysis = analysis_id, error = %err, "pdf export failed");
            (None, Some(format!("PDF export failed: {err:#}")))
        }
    };
    info!(analysis = analysis_id, "report exported");
    Ok(ExportedReports {
        html_path,
        pdf_path,
        pdf_error,
    })
}

fn hit_inputs(hits: &[Hit]) -> Vec<HitInput> {
    hits.iter()
        .map(|h| HitInput {
            id: h.id,
            category: h.category.clone(),
            prob: h.prob as f32,
            text_excerpt: h.text_excerpt.clone(),
        })
        .collect()
}

async fn pdf_source(ctx: &AppContext, analysis_id: i64) -> PipelineResult<PathBuf> {
    let (_, contract) = analysis_with_contract(ctx, analysis_id).await?;
    let path = PathBuf::from(&contract.path);
    if !parser::is_pdf(&path) || !path.exists() {
        return Err(PipelineError::NotPdf);
    }
    Ok(path)
}

/// Path of the uploaded PDF behind an analysis.
pub async fn original_pdf(ctx: &AppContext, analysis_id: i64) -> PipelineResult<PathBuf> {
    pdf_source(ctx, analysis_id).await
}

#[derive(Debug, Clone)]
pub struct HighlightedPdf {
    pub path: PathBuf,
    pub warning: Option<String>,
}

/// The annotated copy of the uploaded PDF, generated on first request.
pub async fn highlighted_pdf(ctx: &AppContext, analysis_id: i64) -> PipelineResult<HighlightedPdf> {
    let src = pdf_source(ctx, analysis_id).await?;
    let out = ctx.artifacts(analysis_id).highlighted_pdf;
    if out.exists() {
        return Ok(HighlightedPdf {
            path: out,
            warning: None,
        });
    }
    let hits = hit_inputs(&storage::hits_for_analysis(&ctx.pool, analysis_id).await?);
    let (src_c, out_c) = (src.clone(), out.clone());
    let generated = blocking(move || Ok(pdf_highlight::generate_highlighted_pdf(&src_c, &hits, &out_c))).await?;
    match generated {
        Ok(0) => Ok(HighlightedPdf {
            path: out,
            warning: Some("No highlights were added (texts not found in PDF).".to_string()),
        }),
        Ok(_) => Ok(HighlightedPdf {
            path: out,
            warning: None,
        }),
        Err(err) => {
            warn!(analysis = analysis_id, error = %err, "highlighting failed, serving original");
            let warning = Some(format!("Failed to generate highlighted PDF: {err:#}"));
            let copied = out
                .parent()
                .map(std::fs::create_dir_all)
                .transpose()
                .and_then(|_| std::fs::copy(&src, &out));
            match copied {
                Ok(_) => Ok(HighlightedPdf { path: out, warning }),
                Err(copy_err) => {
                    warn!(error = %copy_err, "could not copy original pdf");
                    Ok(HighlightedPdf { path: src, warning })
                }
            }
        }
    }
}

/// Highlight boxes for the in-browser viewer.
#[derive(Debug, Clone, Serialize)]
pub struct PdfCoordinates {
    pub rects: Vec<HitRect>,
    pub pages_by_hit: BTreeMap<String, u32>,
    pub page_heights_points: BTreeMap<String, f32>,
    pub hits: Vec<HitInput>,
}

pub async fn pdf_coordinates(ctx: &AppContext, analysis_id: i64) -> PipelineResult<PdfCoordinates> {
    let src = pdf_source(ctx, analysis_id).await?;
    let hits = storage::hits_for_analysis(&ctx.pool, analysis_id).await?;
    let inputs = hit_inputs(&hits);
    let for_task = inputs.clone();
    let (map, offsets) = blocking(move || {
        let map = pdf_highlight::compute_hit_rects(&src, &for_task)?;
        let offsets = parser::parse_document(&src)
            .map(|p| p.page_offsets)
            .unwrap_or_default();
        Ok((map, offsets))
    })
    .await?;
    let pages_by_hit = hits
        .iter()
        .map(|h| {
            let page = page_for_offset(&offsets, h.start_char.max(0) as usize).max(1);
            (h.id.to_string(), page)
        })
        .collect();
    let page_heights_points = map
        .page_heights
        .iter()
        .map(|(page, h)| (page.to_string(), *h))
        .collect();
    Ok(PdfCoordinates {
        rects: map.rects,
        pages_by_hit,
        page_heights_points,
        hits: inputs,
    })
}

/// Plain-language explanation of one hit from the configured LLM.
pub async fn explain_hit(ctx: &AppContext, analysis_id: i64, hit_id: i64) -> PipelineResult<String> {
    let settings = ctx.settings().await;
    let hit = storage::get_hit(&ctx.pool, analysis_id, hit_id)
        .await?
        .ok_or(PipelineError::NotFound("hit"))?;
    if !settings.enable_gemini {
        return Err(PipelineError::LlmDisabled);
    }
    let llm = ctx.llm();
    Ok(summarizer::generate_clause_explanation(
        llm.as_deref(),
        ctx.llm_model(&settings),
        &hit.category,
        &hit.text_excerpt,
    )
    .await)
}

/// Dashboard figures: latest analyses and hit totals per category.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub recent: Vec<AnalysisListing>,
    pub category_counts: Vec<(String, i64)>,
}

pub async fn overview(ctx: &AppContext) -> PipelineResult<Overview> {
    Ok(Overview {
        recent: storage::list_analyses(&ctx.pool, Some(5)).await?,
        category_counts: storage::category_counts(&ctx.pool).await?,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryRow {
    #[serde(flatten)]
    pub listing: AnalysisListing,
    pub top_category: Option<String>,
}

pub async fn history(ctx: &AppContext) -> PipelineResult<Vec<HistoryRow>> {
    let listings = storage::list_analyses(&ctx.pool, None).await?;
    let mut top = storage::top_categories(&ctx.pool).await?;
    Ok(listings
        .into_iter()
        .map(|listing| HistoryRow {
            top_category: top.remove(&listing.id),
            listing,
        })
        .collect())
}
