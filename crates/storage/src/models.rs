use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Contract {
    pub id: i64,
    pub filename: String,
    pub path: String,
    pub file_hash: Option<String>,
    pub uploaded_at: i64,
    pub num_pages: i64,
}

#[derive(Debug, Clone)]
pub struct NewContract {
    pub filename: String,
    pub path: String,
    pub file_hash: Option<String>,
    pub num_pages: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Analysis {
    pub id: i64,
    pub contract_id: i64,
    pub model_name: Option<String>,
    pub model_version: Option<String>,
    pub risk_score: i64,
    pub total_hits: i64,
    pub finished_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub contract_id: i64,
    pub model_name: String,
    pub model_version: String,
    pub risk_score: i64,
}

/// History row: an analysis with its contract's file name.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnalysisListing {
    pub id: i64,
    pub contract_id: i64,
    pub filename: String,
    pub model_name: Option<String>,
    pub risk_score: i64,
    pub total_hits: i64,
    pub finished_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Hit {
    pub id: i64,
    pub analysis_id: i64,
    pub category: String,
    pub prob: f64,
    pub severity: String,
    pub page_no: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub text_excerpt: String,
    pub ambiguous: bool,
}

#[derive(Debug, Clone)]
pub struct NewHit {
    pub category: String,
    pub prob: f64,
    pub severity: String,
    pub page_no: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub text_excerpt: String,
    pub ambiguous: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Summary {
    pub id: i64,
    pub analysis_id: i64,
    pub output_text: String,
    pub created_at: i64,
}

/// Outcome of deleting an analysis.
#[derive(Debug, Clone)]
pub struct DeletedAnalysis {
    pub analysis_id: i64,
    pub contract: Contract,
    /// The contract had no other analyses and was removed too.
    pub contract_removed: bool,
}
