pub mod commands;

use std::fmt;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use lazycuts_core::{
    load_lazycuts_config, BroadcastReport, Catalog, CatalogError, ComposeError, LazyCutsConfig,
    MediaTools, PlaylistComposer,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use commands::{cache, BuildArgs, CacheCommands};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] lazycuts_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("build failed: {0}")]
    Compose(#[from] ComposeError),
    #[error("{0} check(s) failed")]
    CheckFailed(usize),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Lazy Cuts broadcast assembler", long_about = None)]
pub struct Cli {
    /// Path to lazycuts.toml
    #[arg(long, default_value = "configs/lazycuts.toml")]
    pub config: PathBuf,
    /// Overrides paths.base_dir from the configuration
    #[arg(long)]
    pub base_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assemble a broadcast from the catalog
    Build(BuildArgs),
    /// Summarize shows and interstitial pools
    Catalog,
    /// Inspect or clear the processed-clip cache
    #[command(subcommand)]
    Cache(CacheCommands),
    /// Verify catalog folders and external tools
    Check,
}

pub fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Build(args) => {
            let report = runtime.block_on(context.build(args))?;
            render(&report, cli.format)?;
        }
        Commands::Catalog => {
            let summary = context.catalog_summary()?;
            render(&summary, cli.format)?;
        }
        Commands::Cache(CacheCommands::List) => {
            let listing = cache::list(&context.config.cache_dir())?;
            render(&listing, cli.format)?;
        }
        Commands::Cache(CacheCommands::Purge) => {
            let purged = cache::purge(&context.config.cache_dir())?;
            render(&purged, cli.format)?;
        }
        Commands::Check => {
            let report = runtime.block_on(context.health_check());
            render(&report, cli.format)?;
            let failures = report
                .iter()
                .filter(|entry| matches!(entry.status, CheckStatus::Error))
                .count();
            if failures > 0 {
                return Err(AppError::CheckFailed(failures));
            }
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: LazyCutsConfig,
    config_path: PathBuf,
    tools: MediaTools,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let mut config = load_lazycuts_config(&config_path)?;
        if let Some(base_dir) = &cli.base_dir {
            config.paths.base_dir = base_dir.to_string_lossy().to_string();
        }
        let tools = MediaTools::new(&config.tools);
        Ok(Self {
            config,
            config_path,
            tools,
        })
    }

    async fn build(&self, args: &BuildArgs) -> Result<BroadcastReport> {
        let mut rng = match args.seed {
            Some(seed) => {
                info!(seed, "building broadcast with fixed seed");
                ChaCha20Rng::seed_from_u64(seed)
            }
            None => ChaCha20Rng::from_entropy(),
        };
        let composer = PlaylistComposer::with_tools(self.config.clone(), self.tools.clone());
        Ok(composer.run(&mut rng).await?)
    }

    fn catalog_summary(&self) -> Result<CatalogSummary> {
        let catalog = Catalog::new(&self.config);
        let mut shows = Vec::new();
        for folder in catalog.show_folders()? {
            let episodes = catalog.episodes(&folder)?.len();
            shows.push(ShowSummary {
                name: folder.name,
                episodes,
            });
        }
        Ok(CatalogSummary {
            shows,
            bumpers: catalog.bumpers()?.len(),
            commercials: catalog.commercials()?.len(),
            promos: catalog.promos()?.len(),
            overlay: catalog.overlay_asset(),
        })
    }

    async fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = vec![
            self.check_path("lazycuts.toml", &self.config_path),
            self.check_directory("shows", &self.config.shows_root(), true),
            self.check_directory("bumpers", &self.config.bumpers_root(), true),
            self.check_directory("commercials", &self.config.commercials_root(), true),
            self.check_directory("promos", &self.config.promos_root(), true),
            self.check_directory("screenbug", &self.config.screenbug_root(), false),
        ];
        results.push(match self.tools.check().await {
            Ok(()) => HealthEntry::ok(
                "ffmpeg/ffprobe",
                format!("{} / {}", self.config.tools.ffmpeg, self.config.tools.ffprobe),
            ),
            Err(err) => HealthEntry::error("ffmpeg/ffprobe", err.to_string()),
        });
        results
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::error(name, format!("{path} missing", path = path.display()))
        }
    }

    fn check_directory(&self, name: &str, path: &Path, required: bool) -> HealthEntry {
        if path.is_dir() {
            return HealthEntry::ok(name, format!("{}", path.display()));
        }
        let detail = format!("{path} not found", path = path.display());
        if required {
            HealthEntry::error(name, detail)
        } else {
            HealthEntry::warn(name, detail)
        }
    }
}

impl DisplayFallback for BroadcastReport {
    fn display(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    pub shows: Vec<ShowSummary>,
    pub bumpers: usize,
    pub commercials: usize,
    pub promos: usize,
    pub overlay: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ShowSummary {
    pub name: String,
    pub episodes: usize,
}

impl DisplayFallback for CatalogSummary {
    fn display(&self) -> String {
        let mut lines = vec![format!("Shows: {}", self.shows.len())];
        for show in &self.shows {
            lines.push(format!("  {} ({} episodes)", show.name, show.episodes));
        }
        lines.push(format!("Bumpers: {}", self.bumpers));
        lines.push(format!("Commercials: {}", self.commercials));
        lines.push(format!("Promos: {}", self.promos));
        lines.push(match &self.overlay {
            Some(path) => format!("Overlay: {}", path.display()),
            None => "Overlay: none".to_string(),
        });
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| format!("[{}] {}: {}", entry.status, entry.name, entry.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
