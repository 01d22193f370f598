//! Runtime-editable settings, persisted as JSON next to the database.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_MODEL: &str = "nlpaueb/legal-bert-base-uncased";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Margin above a threshold within which a hit is flagged ambiguous.
pub const AMBIGUITY_MARGIN: f32 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_name_or_path: String,
    pub threshold: f32,
    /// Per-category overrides of `threshold`, keyed case-insensitively.
    pub category_thresholds: BTreeMap<String, f32>,
    pub merge_window_chars: usize,
    pub disclaimer: String,
    pub upload_max_mb: u64,
    pub enable_gemini: bool,
    pub gemini_model: String,
    pub logo_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_name_or_path: DEFAULT_MODEL.to_string(),
            threshold: 0.6,
            category_thresholds: BTreeMap::new(),
            merge_window_chars: 80,
            disclaimer: "This report is generated automatically and is not legal advice."
                .to_string(),
            upload_max_mb: 15,
            enable_gemini: false,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            logo_path: String::new(),
        }
    }
}

impl Settings {
    /// Missing file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        let settings = serde_json::from_str(&raw)
            .with_context(|| format!("parsing settings {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).with_context(|| format!("writing settings {}", path.display()))?;
        Ok(())
    }

    pub fn threshold_for(&self, category: &str) -> f32 {
        let key = category.trim().to_lowercase();
        self.category_thresholds
            .iter()
            .find(|(k, _)| k.trim().to_lowercase() == key)
            .map(|(_, v)| *v)
            .unwrap_or(self.threshold)
    }

    pub fn upload_max_bytes(&self) -> u64 {
        self.upload_max_mb.saturating_mul(1024 * 1024)
    }

    /// Parses `Category=0.7` lines (or comma separated pairs) as entered in the settings form.
    pub fn parse_category_thresholds(raw: &str) -> Result<BTreeMap<String, f32>, String> {
        let mut out = BTreeMap::new();
        for item in raw.split(|c| c == '\n' || c == ',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (name, value) = item
                .split_once('=')
                .ok_or_else(|| format!("expected Category=value, got {item:?}"))?;
            let value: f32 = value
                .trim()
                .parse()
                .map_err(|_| format!("invalid threshold for {}", name.trim()))?;
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("threshold for {} must be within 0..1", name.trim()));
            }
            out.insert(name.trim().to_string(), value);
        }
        Ok(out)
    }

    pub fn format_category_thresholds(&self) -> String {
        self.category_thresholds
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
