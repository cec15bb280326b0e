use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use whatnext_scraper::app::ports::{AvailabilityProbe, BrowserLauncher, ImageFetcher};
use whatnext_scraper::app::report::{RunReport, SourceReport, SourceStatus};
use whatnext_scraper::app::scrape_use_case::{OrchestratorSettings, SourceOrchestrator};
use whatnext_scraper::config::Config;
use whatnext_scraper::constants;
use whatnext_scraper::error::ScraperError;
use whatnext_scraper::infra::http_client::{build_client, ReqwestImageFetcher, ReqwestProbe};
use whatnext_scraper::infra::static_browser::StaticHtmlLauncher;
use whatnext_scraper::registry::SourceRegistry;
use whatnext_scraper::storage::{EventStore, InMemoryStorage, Storage};
use whatnext_scraper::{logging, metrics};

#[derive(Parser)]
#[command(name = "whatnext_scraper")]
#[command(about = "Turkish ticketing site event scraper")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to $WHATNEXT_CONFIG or config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// JSON store snapshot to load before and save after the run
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every enabled source, or the listed ones
    Run {
        /// Specific sources to run (comma-separated). Available: biletix, biletino, biletinial
        #[arg(long)]
        sources: Option<String>,
        /// Only walk this city (name or URL parameter)
        #[arg(long)]
        city: Option<String>,
    },
    /// Scrape a single source
    Source {
        name: String,
        #[arg(long)]
        city: Option<String>,
    },
    /// List the configured sources
    List,
}

fn load_registry(config: &Config) -> anyhow::Result<SourceRegistry> {
    let registry = match &config.scraper.registry_dir {
        Some(dir) => SourceRegistry::load_from_directory(dir)?,
        None => SourceRegistry::builtin()?,
    };
    Ok(registry)
}

fn load_store(path: Option<&Path>) -> anyhow::Result<Arc<InMemoryStorage>> {
    let store = match path {
        Some(path) => InMemoryStorage::load_snapshot(path)
            .with_context(|| format!("loading store snapshot {}", path.display()))?,
        None => InMemoryStorage::new(),
    };
    Ok(Arc::new(store))
}

fn build_orchestrator(
    config: &Config,
    registry: SourceRegistry,
    store: Arc<dyn Storage>,
) -> anyhow::Result<Arc<SourceOrchestrator>> {
    let client = build_client(&config.browser.user_agent, config.browser.request_timeout())?;
    let launcher: Arc<dyn BrowserLauncher> = Arc::new(StaticHtmlLauncher);
    let probe: Arc<dyn AvailabilityProbe> = Arc::new(ReqwestProbe::new(client.clone()));
    let images: Arc<dyn ImageFetcher> = Arc::new(ReqwestImageFetcher::new(client));

    let orchestrator = SourceOrchestrator::new(
        Arc::new(registry),
        store,
        launcher,
        probe,
        OrchestratorSettings::from_config(config),
    )
    .with_image_fetcher(images);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current card");
            cancel.cancel();
        }
    });
    Ok(Arc::new(orchestrator))
}

fn print_source_summary(source: &SourceReport) {
    let icon = match source.status {
        SourceStatus::Completed => "✅",
        SourceStatus::Unavailable => "⚠️ ",
        SourceStatus::Failed => "❌",
        SourceStatus::Cancelled => "⏹️ ",
    };
    println!("\n{} {} ({:?})", icon, source.source_id, source.status);
    println!("   Units: {}", source.units.len());
    println!("   Cards: {}", source.cards());
    println!("   Inserted: {}", source.inserted());
    println!("   Merged: {}", source.merged());
    println!("   Skipped: {}", source.skipped());
    println!("   Dropped cards: {}", source.dropped());
    println!("   Errors: {}", source.error_count());
    for err in source.errors.iter().chain(source.units.iter().flat_map(|u| u.errors.iter())) {
        println!("   - {}", err);
    }
}

async fn finish_run(
    mut report: RunReport,
    config: &Config,
    store: &InMemoryStorage,
    store_path: Option<&Path>,
) -> anyhow::Result<()> {
    if report.finished_at.is_none() {
        report.finish();
    }
    println!("\n📊 Run summary");
    for source in &report.sources {
        print_source_summary(source);
    }
    println!(
        "\n   Total inserted: {}, merged: {}, events stored: {}",
        report.total_inserted(),
        report.total_merged(),
        store.count_events().await?
    );

    match report.write_to(Path::new(&config.scraper.output_dir)).await {
        Ok(path) => println!("   Report: {}", path.display()),
        Err(e) => error!("Failed to write run report: {}", e),
    }
    if let Some(path) = store_path {
        store.save_snapshot(path)?;
        info!("Saved store snapshot to {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if config.metrics.enabled {
        metrics::init_metrics(config.metrics.port);
    }
    let registry = load_registry(&config)?;

    match cli.command {
        Commands::List => {
            let builtin = constants::get_supported_sources();
            println!("📋 Configured sources:");
            for source in registry.all_sources() {
                println!(
                    "   {} [{}] priority={} {}{}",
                    source.source_id,
                    if source.enabled { "enabled" } else { "disabled" },
                    source.priority,
                    source.display_name,
                    if builtin.contains(&source.source_id.as_str()) { "" } else { " (custom)" }
                );
            }
        }
        Commands::Run { sources, city } => {
            let store_path = cli.store.or_else(|| config.scraper.store_path.clone());
            let store = load_store(store_path.as_deref())?;
            let orchestrator = build_orchestrator(&config, registry, store.clone())?;

            println!("🔄 Running scraper...");
            let report = match sources {
                None => orchestrator.run_all(city.as_deref()).await,
                Some(list) => {
                    let mut report = RunReport::new(city.as_deref());
                    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        match orchestrator.run_source(name, city.as_deref()).await {
                            Ok(source) => report.sources.push(source),
                            Err(e @ ScraperError::UnknownSource(_)) => {
                                warn!("{}", e);
                                println!("⚠️  Unknown source: {}", name);
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                    report
                }
            };
            finish_run(report, &config, &store, store_path.as_deref()).await?;
        }
        Commands::Source { name, city } => {
            let store_path = cli.store.or_else(|| config.scraper.store_path.clone());
            let store = load_store(store_path.as_deref())?;
            let orchestrator = build_orchestrator(&config, registry, store.clone())?;

            println!("🔄 Running {}...", name);
            let source = orchestrator.run_source(&name, city.as_deref()).await?;
            let mut report = RunReport::new(city.as_deref());
            report.sources.push(source);
            finish_run(report, &config, &store, store_path.as_deref()).await?;
        }
    }

    Ok(())
}
