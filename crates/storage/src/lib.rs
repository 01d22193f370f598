//! Storage layer: SQLite schemas and helpers.
//!
//! Holds DB pool setup, the migration runner, and the queries for contracts,
//! analyses, hits and summaries.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::debug;

pub mod models;

use models::{
    Analysis, AnalysisListing, Contract, DeletedAnalysis, Hit, NewAnalysis, NewContract, NewHit,
    Summary,
};

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let mut url = database_url.to_string();
    if !database_url.starts_with("sqlite:") {
        let path = std::path::PathBuf::from(database_url);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            url = format!("sqlite:///{}", norm.trim_start_matches('/'));
        } else {
            url = format!("sqlite://{}", norm);
        }
    }
    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    debug!(%url, "connecting to database");
    let pool = opts.connect_with(options).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn insert_contract(pool: &SqlitePool, new: &NewContract) -> anyhow::Result<Contract> {
    let contract = sqlx::query_as::<_, Contract>(
        "INSERT INTO contracts (filename, path, file_hash, num_pages) VALUES (?1, ?2, ?3, ?4)
         RETURNING id, filename, path, file_hash, uploaded_at, num_pages",
    )
    .bind(&new.filename)
    .bind(&new.path)
    .bind(&new.file_hash)
    .bind(new.num_pages)
    .fetch_one(pool)
    .await?;
    Ok(contract)
}

pub async fn get_contract(pool: &SqlitePool, id: i64) -> anyhow::Result<Option<Contract>> {
    let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(contract)
}

async fn write_analysis(
    conn: &mut SqliteConnection,
    new: &NewAnalysis,
    hits: &[NewHit],
) -> anyhow::Result<Analysis> {
    let analysis = sqlx::query_as::<_, Analysis>(
        "INSERT INTO analyses (contract_id, model_name, model_version, risk_score, total_hits)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, contract_id, model_name, model_version, risk_score, total_hits, finished_at",
    )
    .bind(new.contract_id)
    .bind(&new.model_name)
    .bind(&new.model_version)
    .bind(new.risk_score)
    .bind(hits.len() as i64)
    .fetch_one(&mut *conn)
    .await?;

    for hit in hits {
        sqlx::query(
            "INSERT INTO hits (analysis_id, category, prob, severity, page_no, start_char, end_char, text_excerpt, ambiguous)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(analysis.id)
        .bind(&hit.category)
        .bind(hit.prob)
        .bind(&hit.severity)
        .bind(hit.page_no)
        .bind(hit.start_char)
        .bind(hit.end_char)
        .bind(&hit.text_excerpt)
        .bind(hit.ambiguous)
        .execute(&mut *conn)
        .await?;
    }
    Ok(analysis)
}

/// Inserts an analysis and all of its hits in one transaction.
pub async fn insert_analysis(
    pool: &SqlitePool,
    new: &NewAnalysis,
    hits: &[NewHit],
) -> anyhow::Result<Analysis> {
    let mut tx = pool.begin().await?;
    let analysis = write_analysis(&mut *tx, new, hits).await?;
    tx.commit().await?;
    Ok(analysis)
}

/// Inserts a new contract together with its first analysis and hits.
/// `analysis.contract_id` is ignored; either everything lands or nothing does.
pub async fn insert_contract_with_analysis(
    pool: &SqlitePool,
    contract: &NewContract,
    analysis: &NewAnalysis,
    hits: &[NewHit],
) -> anyhow::Result<(Contract, Analysis)> {
    let mut tx = pool.begin().await?;
    let contract = sqlx::query_as::<_, Contract>(
        "INSERT INTO contracts (filename, path, file_hash, num_pages) VALUES (?1, ?2, ?3, ?4)
         RETURNING id, filename, path, file_hash, uploaded_at, num_pages",
    )
    .bind(&contract.filename)
    .bind(&contract.path)
    .bind(&contract.file_hash)
    .bind(contract.num_pages)
    .fetch_one(&mut *tx)
    .await?;
    let new = NewAnalysis {
        contract_id: contract.id,
        ..analysis.clone()
    };
    let analysis = write_analysis(&mut *tx, &new, hits).await?;
    tx.commit().await?;
    Ok((contract, analysis))
}

pub async fn get_analysis(pool: &SqlitePool, id: i64) -> anyhow::Result<Option<Analysis>> {
    let analysis = sqlx::query_as::<_, Analysis>("SELECT * FROM analyses WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(analysis)
}

/// Newest first; `limit` of `None` returns everything.
pub async fn list_analyses(
    pool: &SqlitePool,
    limit: Option<i64>,
) -> anyhow::Result<Vec<AnalysisListing>> {
    let rows = sqlx::query_as::<_, AnalysisListing>(
        "SELECT a.id, a.contract_id, c.filename, a.model_name, a.risk_score, a.total_hits, a.finished_at
         FROM analyses a JOIN contracts c ON c.id = a.contract_id
         ORDER BY a.finished_at DESC, a.id DESC
         LIMIT ?1",
    )
    .bind(limit.unwrap_or(-1))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn analyses_for_contract(
    pool: &SqlitePool,
    contract_id: i64,
) -> anyhow::Result<Vec<Analysis>> {
    let rows = sqlx::query_as::<_, Analysis>(
        "SELECT * FROM analyses WHERE contract_id = ?1 ORDER BY id",
    )
    .bind(contract_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Hits of one analysis in document order.
pub async fn hits_for_analysis(pool: &SqlitePool, analysis_id: i64) -> anyhow::Result<Vec<Hit>> {
    let rows = sqlx::query_as::<_, Hit>(
        "SELECT * FROM hits WHERE analysis_id = ?1 ORDER BY start_char ASC, id ASC",
    )
    .bind(analysis_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_hit(
    pool: &SqlitePool,
    analysis_id: i64,
    hit_id: i64,
) -> anyhow::Result<Option<Hit>> {
    let hit = sqlx::query_as::<_, Hit>("SELECT * FROM hits WHERE id = ?1 AND analysis_id = ?2")
        .bind(hit_id)
        .bind(analysis_id)
        .fetch_optional(pool)
        .await?;
    Ok(hit)
}

pub async fn insert_summary(
    pool: &SqlitePool,
    analysis_id: i64,
    text: &str,
) -> anyhow::Result<Summary> {
    let summary = sqlx::query_as::<_, Summary>(
        "INSERT INTO summaries (analysis_id, output_text) VALUES (?1, ?2)
         RETURNING id, analysis_id, output_text, created_at",
    )
    .bind(analysis_id)
    .bind(text)
    .fetch_one(pool)
    .await?;
    Ok(summary)
}

pub async fn latest_summary(
    pool: &SqlitePool,
    analysis_id: i64,
) -> anyhow::Result<Option<Summary>> {
    let summary = sqlx::query_as::<_, Summary>(
        "SELECT * FROM summaries WHERE analysis_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(analysis_id)
    .fetch_optional(pool)
    .await?;
    Ok(summary)
}

/// Deletes an analysis with its hits and summaries. When it was the contract's
/// last analysis the contract row goes too. Files are left to the caller.
pub async fn delete_analysis(
    pool: &SqlitePool,
    analysis_id: i64,
) -> anyhow::Result<Option<DeletedAnalysis>> {
    let mut tx = pool.begin().await?;
    let Some(analysis) = sqlx::query_as::<_, Analysis>("SELECT * FROM analyses WHERE id = ?1")
        .bind(analysis_id)
        .fetch_optional(&mut *tx)
        .await?
    else {
        return Ok(None);
    };
    let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = ?1")
        .bind(analysis.contract_id)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM hits WHERE analysis_id = ?1")
        .bind(analysis_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM summaries WHERE analysis_id = ?1")
        .bind(analysis_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM analyses WHERE id = ?1")
        .bind(analysis_id)
        .execute(&mut *tx)
        .await?;

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses WHERE contract_id = ?1")
        .bind(contract.id)
        .fetch_one(&mut *tx)
        .await?;
    let contract_removed = remaining == 0;
    if contract_removed {
        sqlx::query("DELETE FROM contracts WHERE id = ?1")
            .bind(contract.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(Some(DeletedAnalysis {
        analysis_id,
        contract,
        contract_removed,
    }))
}

/// Hit totals per category across all analyses.
pub async fn category_counts(pool: &SqlitePool) -> anyhow::Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        "SELECT category, COUNT(id) FROM hits GROUP BY category ORDER BY COUNT(id) DESC, category",
    )
    .fetch_all(pool)
    .await?;
    let mut counts = Vec::with_capacity(rows.len());
    for row in rows {
        counts.push((row.try_get::<String, _>(0)?, row.try_get::<i64, _>(1)?));
    }
    Ok(counts)
}

/// Most frequent hit category for each analysis that has hits.
pub async fn top_categories(pool: &SqlitePool) -> anyhow::Result<HashMap<i64, String>> {
    let rows = sqlx::query(
        "SELECT analysis_id, category, COUNT(id) AS n, MIN(start_char) AS first_at
         FROM hits GROUP BY analysis_id, category",
    )
    .fetch_all(pool)
    .await?;
    let mut best: HashMap<i64, (String, i64, i64)> = HashMap::new();
    for row in rows {
        let analysis_id: i64 = row.try_get("analysis_id")?;
        let category: String = row.try_get("category")?;
        let n: i64 = row.try_get("n")?;
        let first_at: i64 = row.try_get("first_at")?;
        let replace = match best.get(&analysis_id) {
            None => true,
            Some((_, bn, bfirst)) => n > *bn || (n == *bn && first_at < *bfirst),
        };
        if replace {
            best.insert(analysis_id, (category, n, first_at));
        }
    }
    Ok(best.into_iter().map(|(id, (cat, _, _))| (id, cat)).collect())
}

pub async fn contract_paths(pool: &SqlitePool) -> anyhow::Result<HashSet<String>> {
    let paths: Vec<String> = sqlx::query_scalar("SELECT path FROM contracts")
        .fetch_all(pool)
        .await?;
    Ok(paths.into_iter().collect())
}

pub async fn analysis_ids(pool: &SqlitePool) -> anyhow::Result<HashSet<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM analyses")
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().collect())
}

pub async fn count_rows(pool: &SqlitePool, table: Table) -> anyhow::Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
    let n: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(n)
}

#[derive(Debug, Clone, Copy)]
pub enum Table {
    Contracts,
    Analyses,
    Hits,
    Summaries,
}

impl Table {
    fn as_str(self) -> &'static str {
        match self {
            Table::Contracts => "contracts",
            Table::Analyses => "analyses",
            Table::Hits => "hits",
            Table::Summaries => "summaries",
        }
    }
}
