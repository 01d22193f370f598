use anyhow::Result;
use clap::{Parser, Subcommand};
use riskscan_core::config::{self, AppConfig};
use riskscan_core::pipeline::{self, AppContext};
use riskscan_cli::commands;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut cfg = match &cli.data_dir {
        Some(dir) => AppConfig::rooted_at(dir),
        None => config::load(cli.config.as_deref())?,
    };
    if let Commands::Serve { bind: Some(bind) } = &cli.command {
        cfg.server.bind = bind.clone();
    }
    let registry = pipeline::build_registry(&cfg);
    let ctx = AppContext::open(cfg, registry).await?;

    let out = match cli.command {
        Commands::Serve { .. } => {
            web::serve(ctx).await?;
            return Ok(());
        }
        Commands::Analyze { path, json } => commands::analyze(&ctx, Path::new(&path), json).await?,
        Commands::Show { id, json } => commands::show(&ctx, id, json).await?,
        Commands::Reanalyze { id, json } => commands::reanalyze(&ctx, id, json).await?,
        Commands::History { json } => commands::history(&ctx, json).await?,
        Commands::Delete { id } => commands::delete(&ctx, id).await?,
        Commands::Export { id } => commands::export(&ctx, id).await?,
        Commands::Sweep { dry_run } => commands::sweep(&ctx, dry_run).await?,
        Commands::Settings { command } => match command {
            SettingsCommand::Show => commands::settings_show(&ctx).await?,
            SettingsCommand::Set { assignments } => commands::settings_set(&ctx, &assignments).await?,
        },
    };
    print!("{out}");
    if !out.ends_with('\n') {
        println!();
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "riskscan")]
#[command(about = "Flag risky clauses in contracts", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    /// Keep database, uploads and reports under one directory (ignores --config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web UI
    Serve {
        /// Override server.bind, e.g. 0.0.0.0:8080
        #[arg(long)]
        bind: Option<String>,
    },
    /// Upload and analyze a PDF or DOCX
    Analyze {
        path: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stored analysis
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Re-run the classifier over an analysis' contract
    Reanalyze {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// List past analyses, newest first
    History {
        #[arg(long)]
        json: bool,
    },
    /// Delete an analysis (and its contract when it was the last one)
    Delete { id: i64 },
    /// Write HTML and PDF reports into the report dir
    Export { id: i64 },
    /// Remove uploads and reports no row refers to
    Sweep {
        /// Only list what would be removed
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Show or change runtime settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print current settings as JSON
    Show,
    /// Set one or more values, e.g. threshold=0.7 category_thresholds="Termination=0.8"
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
}
