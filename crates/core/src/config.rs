use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub upload_dir: String,
    pub report_dir: String,
    pub settings_path: String,
}

impl PathsConfig {
    pub fn upload_dir(&self) -> PathBuf {
        PathBuf::from(&self.upload_dir)
    }

    pub fn report_dir(&self) -> PathBuf {
        PathBuf::from(&self.report_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Hard cap on request bodies; the per-upload limit lives in settings.
    pub max_body_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_body_mb: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub batch_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: providers::huggingface::DEFAULT_BASE_URL.to_string(),
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `gemini` or `openai`.
    pub provider: String,
    pub gemini_base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            gemini_base_url: providers::gemini::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// Everything under one directory; used by tests and `--data-dir`.
    pub fn rooted_at(root: &std::path::Path) -> Self {
        let join = |p: &str| root.join(p).to_string_lossy().into_owned();
        Self {
            database: DatabaseConfig {
                path: join("riskscan.db"),
            },
            paths: PathsConfig {
                upload_dir: join("uploads"),
                report_dir: join("reports"),
                settings_path: join("settings.json"),
            },
            server: ServerConfig::default(),
            classifier: ClassifierConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder()
        .set_default("database.path", "data/riskscan.db")?
        .set_default("paths.upload_dir", "data/uploads")?
        .set_default("paths.report_dir", "data/reports")?
        .set_default("paths.settings_path", "data/settings.json")?;
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(config::Environment::with_prefix("RISKSCAN").separator("__"));
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_file_over_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("riskscan.toml");
        std::fs::write(
            &file,
            "[database]\npath = \"x.db\"\n[server]\nbind = \"0.0.0.0:9000\"\nmax_body_mb = 8\n",
        )
        .unwrap();
        let cfg = load(Some(&file.to_string_lossy())).unwrap();
        assert_eq!(cfg.database.path, "x.db");
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert_eq!(cfg.paths.upload_dir, "data/uploads");
        assert_eq!(cfg.classifier.batch_size, 16);
    }
}
