//! Drives every configured source through extract, enrich, classify, build
//! and resolve, one listing page at a time.

use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, instrument, warn, Instrument};

use crate::app::ports::{AvailabilityProbe, BrowserLauncher, BrowserOptions, BrowserSession, ImageFetcher};
use crate::app::report::{RunReport, SourceReport, SourceStatus, UnitReport};
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::domain::{Event, EventImage};
use crate::error::{Result, ScraperError};
use crate::infra::http_client::DEFAULT_USER_AGENT;
use crate::metrics::PipelineMetrics;
use crate::pipeline::builder::{BuildContext, EventBuilder};
use crate::pipeline::classify::EventTypeClassifier;
use crate::pipeline::dates::{DateNormalizer, MonthFallback};
use crate::pipeline::enrich::{merge_fields, DetailEnricher};
use crate::pipeline::extract::PageExtractor;
use crate::pipeline::resolver::{DuplicateResolver, Resolution, SkipReason};
use crate::pipeline::similarity::TitleSimilarity;
use crate::registry::{SourceConfig, SourceRegistry, WorkUnit};
use crate::storage::Storage;

const WINDOW_SIZE: (u32, u32) = (1920, 1080);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_parallel_sources: usize,
    pub download_images: bool,
    pub unknown_month: MonthFallback,
    pub similarity: TitleSimilarity,
    pub dedup_exhibitions: bool,
    pub browser_binary: Option<String>,
    pub user_agent: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_parallel_sources: 1,
            download_images: true,
            unknown_month: MonthFallback::default(),
            similarity: TitleSimilarity::default(),
            dedup_exhibitions: false,
            browser_binary: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_parallel_sources: config.scraper.max_parallel_sources.max(1),
            download_images: config.scraper.download_images,
            unknown_month: config.dedup.unknown_month,
            similarity: TitleSimilarity::new(config.dedup.similarity)
                .with_threshold(config.dedup.similarity_threshold),
            dedup_exhibitions: config.dedup.dedup_exhibitions,
            browser_binary: config.browser.binary_path.clone(),
            user_agent: config.browser.user_agent.clone(),
        }
    }
}

pub struct SourceOrchestrator {
    registry: Arc<SourceRegistry>,
    store: Arc<dyn Storage>,
    launcher: Arc<dyn BrowserLauncher>,
    probe: Arc<dyn AvailabilityProbe>,
    images: Option<Arc<dyn ImageFetcher>>,
    resolver: DuplicateResolver,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
    today: Option<NaiveDate>,
}

impl SourceOrchestrator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        store: Arc<dyn Storage>,
        launcher: Arc<dyn BrowserLauncher>,
        probe: Arc<dyn AvailabilityProbe>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            store,
            launcher,
            probe,
            images: None,
            resolver: DuplicateResolver::new(settings.similarity, settings.dedup_exhibitions),
            settings,
            cancel: CancellationToken::new(),
            today: None,
        }
    }

    pub fn with_image_fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.images = Some(fetcher);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pins the first day walked by sources with `days_ahead`.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Scrapes every enabled source, in priority order when sequential.
    /// Failures stay inside the report.
    #[instrument(skip(self))]
    pub async fn run_all(self: &Arc<Self>, city: Option<&str>) -> RunReport {
        let mut report = RunReport::new(city);
        let sources: Vec<String> =
            self.registry.get_enabled_sources().iter().map(|s| s.source_id.clone()).collect();
        info!("Running {} enabled source(s)", sources.len());

        if self.settings.max_parallel_sources <= 1 {
            for source_id in &sources {
                report.sources.push(self.run_registered(source_id, city).await);
            }
        } else {
            let semaphore = Arc::new(Semaphore::new(self.settings.max_parallel_sources));
            let mut tasks = JoinSet::new();
            for (index, source_id) in sources.iter().cloned().enumerate() {
                let this = Arc::clone(self);
                let semaphore = Arc::clone(&semaphore);
                let city = city.map(str::to_string);
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    (index, this.run_registered(&source_id, city.as_deref()).await)
                });
            }

            let mut finished = Vec::with_capacity(sources.len());
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => finished.push(result),
                    Err(e) => error!("Source task panicked or was aborted: {}", e),
                }
            }
            finished.sort_by_key(|(index, _)| *index);
            report.sources.extend(finished.into_iter().map(|(_, source)| source));
        }

        report.finish();
        report
    }

    /// Scrapes one source by id. Disabled sources run too when named.
    pub async fn run_source(&self, name: &str, city: Option<&str>) -> Result<SourceReport> {
        let source = self
            .registry
            .get_source_config(name)
            .ok_or_else(|| ScraperError::UnknownSource(name.to_string()))?;
        if !source.enabled {
            info!("Source {} is disabled, running it on request", source.source_id);
        }
        Ok(self.scrape_source(source, city).await)
    }

    async fn run_registered(&self, source_id: &str, city: Option<&str>) -> SourceReport {
        match self.registry.get_source_config(source_id) {
            Some(source) => self.scrape_source(source, city).await,
            None => {
                let mut report = SourceReport::new(source_id);
                report.status = SourceStatus::Failed;
                report.errors.push(ScraperError::UnknownSource(source_id.to_string()).to_string());
                report
            }
        }
    }

    #[instrument(skip(self, source), fields(source = %source.source_id))]
    async fn scrape_source(&self, source: &SourceConfig, city: Option<&str>) -> SourceReport {
        let mut report = SourceReport::new(&source.source_id);
        if self.cancel.is_cancelled() {
            report.status = SourceStatus::Cancelled;
            return report;
        }

        if !self.probe.is_available(&source.base_url, source.availability_marker.as_deref()).await {
            let err = ScraperError::UnavailableSource(source.source_id.clone());
            warn!("{}, skipping", err);
            PipelineMetrics::record_unavailable(&source.source_id);
            report.status = SourceStatus::Unavailable;
            report.errors.push(err.to_string());
            return report;
        }

        let dates = DateNormalizer::new(self.settings.unknown_month).with_formats(&source.date_formats);
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let units = source.work_units(today, city);
        if units.is_empty() {
            warn!("No work units for {} with city filter {:?}", source.source_id, city);
        }

        for unit in &units {
            if self.cancel.is_cancelled() {
                break;
            }
            let unit_report = self
                .scrape_unit(source, unit, &dates)
                .instrument(info_span!("unit", unit = %unit.label()))
                .await;
            report.units.push(unit_report);
        }

        report.status = if self.cancel.is_cancelled() {
            SourceStatus::Cancelled
        } else if !report.units.is_empty() && report.units.iter().all(|u| u.failed) {
            SourceStatus::Failed
        } else {
            SourceStatus::Completed
        };
        info!(
            "{} finished as {:?}: {} cards, {} dropped, {} inserted, {} merged, {} skipped",
            source.source_id,
            report.status,
            report.cards(),
            report.dropped(),
            report.inserted(),
            report.merged(),
            report.skipped()
        );
        report
    }

    fn browser_options(&self, source: &SourceConfig) -> BrowserOptions {
        BrowserOptions {
            binary_path: source.browser_binary.clone().or_else(|| self.settings.browser_binary.clone()),
            timeout: source.wait_timeout(),
            user_agent: self.settings.user_agent.clone(),
            window_size: WINDOW_SIZE,
        }
    }

    /// One session per unit; it is closed on every path.
    async fn scrape_unit(&self, source: &SourceConfig, unit: &WorkUnit, dates: &DateNormalizer) -> UnitReport {
        let url = source.search_url(unit);
        let mut report = UnitReport::new(unit.label(), url.clone());
        let started = Instant::now();

        let outcome = match self.launcher.open(&self.browser_options(source)).await {
            Ok(mut session) => {
                let result = self.process_unit(session.as_mut(), source, unit, dates, &url, &mut report).await;
                if let Err(e) = session.close().await {
                    warn!("Failed to close browser session: {}", e);
                }
                result
            }
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            error!("Unit {} failed: {}", report.label, e);
            report.failed = true;
            report.errors.push(e.to_string());
        }

        PipelineMetrics::record_unit(
            &source.source_id,
            report.cards,
            started.elapsed().as_secs_f64(),
            report.failed,
        );
        report
    }

    async fn process_unit(
        &self,
        session: &mut dyn BrowserSession,
        source: &SourceConfig,
        unit: &WorkUnit,
        dates: &DateNormalizer,
        url: &str,
        report: &mut UnitReport,
    ) -> Result<()> {
        let page = PageExtractor::new(source, &self.cancel).extract(session, url).await?;
        report.cards = page.cards.len();
        report.dropped = page.dropped;
        for _ in 0..page.dropped {
            PipelineMetrics::record_skipped(&source.source_id, "missing_field");
        }
        let cards = page.cards;

        let store: &dyn Storage = self.store.as_ref();
        let builder = EventBuilder::new(source, dates);
        let ctx = BuildContext { city: unit.city.as_ref().map(|c| c.name.clone()) };
        let enricher = source.detail.as_ref().map(|d| DetailEnricher::new(d, source.wait_timeout()));

        for basic in &cards {
            if self.cancel.is_cancelled() {
                info!("Cancelled after {} of {} cards", report.built + report.skipped, cards.len());
                break;
            }

            let detail = match &enricher {
                Some(enricher) if !basic.ticket_url.is_empty() => Some(enricher.enrich(session, &basic.ticket_url).await),
                _ => None,
            };
            let fields = merge_fields(basic, detail.as_ref());
            let event_type = EventTypeClassifier::classify(&fields.title, &fields.description, &unit.category);

            let Some(mut event) = builder.build(event_type, basic, detail.as_ref(), store, &ctx).await else {
                report.skipped += 1;
                PipelineMetrics::record_skipped(&source.source_id, "unbuildable");
                continue;
            };
            report.built += 1;

            if self.settings.download_images && !fields.image_url.is_empty() {
                self.attach_image(&mut event, &fields.image_url).await;
            }

            match self.resolver.resolve(event, store, source.concert_policy).await {
                Resolution::Inserted(_) => {
                    report.inserted += 1;
                    PipelineMetrics::record_inserted(&source.source_id);
                }
                Resolution::Merged(_) => {
                    report.merged += 1;
                    PipelineMetrics::record_merged(&source.source_id);
                }
                Resolution::Skipped(reason) => {
                    report.skipped += 1;
                    let label = match &reason {
                        SkipReason::Duplicate(_) => "duplicate",
                        SkipReason::MissingKey(_) => "missing_key",
                        SkipReason::Failed(msg) => {
                            report.errors.push(msg.clone());
                            "failed"
                        }
                    };
                    PipelineMetrics::record_skipped(&source.source_id, label);
                }
            }
        }
        Ok(())
    }

    async fn attach_image(&self, event: &mut Event, image_url: &str) {
        let Some(fetcher) = &self.images else {
            return;
        };
        match fetcher.fetch(image_url).await {
            Ok(image) => {
                event.image = Some(EventImage {
                    data_base64: image.data_base64,
                    mime_type: image.mime_type,
                    source_url: image_url.to_string(),
                })
            }
            Err(e) => warn!("Image {} not downloaded: {}", image_url, e),
        }
    }
}
