//! Data-driven source definitions.
//!
//! Every ticketing site is described by one JSON file: its URLs, the
//! categories and cities to walk, how incremental loading works, and the CSS
//! selectors for listing cards and detail pages. The copies under `registry/`
//! are compiled in as defaults; a directory of the same files overrides them.

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, ScraperError};
use crate::pipeline::enrich::DetailSelectors;
use crate::pipeline::extract::{CardSelectors, IncrementalLoading};
use crate::pipeline::resolver::ConcertPolicy;
use crate::types::{EventSource, EventType};

const BUILTIN_SOURCES: &[(&str, &str)] = &[
    ("biletinial.json", include_str!("../registry/biletinial.json")),
    ("biletino.json", include_str!("../registry/biletino.json")),
    ("biletix.json", include_str!("../registry/biletix.json")),
];

fn default_wait_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// A listing category as the site names it, plus the type it maps to.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceCategory {
    pub name: String,
    /// Value substituted for `{category}` in the search URL.
    pub param: String,
    pub default_type: EventType,
    /// When set, the category decides the type unless stand-up markers appear.
    #[serde(default)]
    pub implies_type: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceCity {
    pub name: String,
    /// Value substituted for `{city}`, already URL-encoded.
    pub param: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub source: EventSource,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: u32,
    pub base_url: String,
    /// Text the landing page title must contain for the site to count as up.
    #[serde(default)]
    pub availability_marker: Option<String>,
    /// Supports `{base_url}`, `{category}`, `{city}` and `{date}`.
    pub search_url_template: String,
    pub categories: Vec<SourceCategory>,
    #[serde(default)]
    pub cities: Vec<SourceCity>,
    /// Walk each of the next N days, substituting `{date}` as `yyyy-MM-dd`.
    #[serde(default)]
    pub days_ahead: Option<u32>,
    #[serde(default)]
    pub browser_binary: Option<String>,
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    #[serde(default)]
    pub loading: IncrementalLoading,
    pub card: CardSelectors,
    #[serde(default)]
    pub detail: Option<DetailSelectors>,
    #[serde(default)]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub concert_policy: ConcertPolicy,
    /// Types this source may emit. Empty means all.
    #[serde(default)]
    pub supported_types: Vec<EventType>,
}

/// One listing page to scrape: a category, optionally narrowed by city and day.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub category: SourceCategory,
    pub city: Option<SourceCity>,
    pub date: Option<NaiveDate>,
}

impl WorkUnit {
    pub fn label(&self) -> String {
        let mut label = self.category.name.clone();
        if let Some(city) = &self.city {
            label.push('/');
            label.push_str(&city.name);
        }
        if let Some(date) = &self.date {
            label.push('/');
            label.push_str(&date.format("%Y-%m-%d").to_string());
        }
        label
    }
}

impl SourceConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn supports(&self, event_type: EventType) -> bool {
        self.supported_types.is_empty() || self.supported_types.contains(&event_type)
    }

    pub fn search_url(&self, unit: &WorkUnit) -> String {
        let city = unit.city.as_ref().map(|c| c.param.as_str()).unwrap_or_default();
        let date = unit.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        self.search_url_template
            .replace("{base_url}", self.base_url.trim_end_matches('/'))
            .replace("{category}", &unit.category.param)
            .replace("{city}", city)
            .replace("{date}", &date)
    }

    /// Categories x cities x days, in that nesting order.
    ///
    /// `city_filter` matches a city's name or param case-insensitively. A
    /// source without cities ignores the filter.
    pub fn work_units(&self, today: NaiveDate, city_filter: Option<&str>) -> Vec<WorkUnit> {
        let cities: Vec<Option<SourceCity>> = if self.cities.is_empty() {
            vec![None]
        } else {
            self.cities
                .iter()
                .filter(|c| match city_filter {
                    Some(filter) => {
                        c.name.eq_ignore_ascii_case(filter) || c.param.eq_ignore_ascii_case(filter)
                    }
                    None => true,
                })
                .cloned()
                .map(Some)
                .collect()
        };

        let dates: Vec<Option<NaiveDate>> = match self.days_ahead {
            Some(days) if days > 0 => {
                (0..days).map(|offset| Some(today + ChronoDuration::days(i64::from(offset)))).collect()
            }
            _ => vec![None],
        };

        let mut units = Vec::new();
        for category in &self.categories {
            for city in &cities {
                for date in &dates {
                    units.push(WorkUnit { category: category.clone(), city: city.clone(), date: *date });
                }
            }
        }
        units
    }

    fn validate(&self) -> Result<()> {
        if self.source_id.trim().is_empty() {
            return Err(ScraperError::Config("source_id must not be empty".to_string()));
        }
        if self.categories.is_empty() {
            return Err(ScraperError::Config(format!("{} has no categories", self.source_id)));
        }
        if self.card.card.trim().is_empty() {
            return Err(ScraperError::Config(format!("{} has no card selector", self.source_id)));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SourceRegistry {
    sources: HashMap<String, SourceConfig>,
}

impl SourceRegistry {
    pub fn from_configs(configs: Vec<SourceConfig>) -> Result<Self> {
        let mut sources = HashMap::new();
        for config in configs {
            config.validate()?;
            sources.insert(config.source_id.to_lowercase(), config);
        }
        Ok(Self { sources })
    }

    /// The source definitions shipped with the crate.
    pub fn builtin() -> Result<Self> {
        let mut configs = Vec::new();
        for (name, content) in BUILTIN_SOURCES {
            let config: SourceConfig = serde_json::from_str(content).map_err(|e| {
                ScraperError::Config(format!("Failed to parse built-in source {}: {}", name, e))
            })?;
            configs.push(config);
        }
        Self::from_configs(configs)
    }

    /// Load all source configurations from the registry directory
    pub fn load_from_directory<P: AsRef<Path>>(registry_dir: P) -> Result<Self> {
        let dir_path = registry_dir.as_ref();
        if !dir_path.exists() {
            return Err(ScraperError::Config(format!(
                "Registry directory does not exist: {}",
                dir_path.display()
            )));
        }

        let mut configs = Vec::new();
        for entry in fs::read_dir(dir_path)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let config: SourceConfig = serde_json::from_str(&content).map_err(|e| {
                ScraperError::Config(format!("Failed to parse source config {}: {}", path.display(), e))
            })?;
            debug!("Loaded source {} from {}", config.source_id, path.display());
            configs.push(config);
        }

        info!("Loaded {} source definitions from {}", configs.len(), dir_path.display());
        Self::from_configs(configs)
    }

    /// Case-insensitive lookup by source id.
    pub fn get_source_config(&self, source_id: &str) -> Option<&SourceConfig> {
        self.sources.get(&source_id.to_lowercase())
    }

    pub fn is_source_enabled(&self, source_id: &str) -> bool {
        self.get_source_config(source_id).map_or(false, |s| s.enabled)
    }

    /// Enabled sources in run order (priority, then id).
    pub fn get_enabled_sources(&self) -> Vec<&SourceConfig> {
        let mut enabled: Vec<&SourceConfig> = self.sources.values().filter(|s| s.enabled).collect();
        enabled.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.source_id.cmp(&b.source_id)));
        enabled
    }

    pub fn all_sources(&self) -> Vec<&SourceConfig> {
        let mut all: Vec<&SourceConfig> = self.sources.values().collect();
        all.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.source_id.cmp(&b.source_id)));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sources_load_in_priority_order() {
        let registry = SourceRegistry::builtin().unwrap();
        let ids: Vec<&str> = registry.get_enabled_sources().iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, vec!["biletinial", "biletino", "biletix"]);
        assert_eq!(ids, crate::constants::get_supported_sources());
        assert!(registry.get_source_config("BILETIX").is_some());
        assert!(registry.get_source_config("unknown").is_none());
    }

    #[test]
    fn biletinial_walks_days_per_category_and_city() {
        let registry = SourceRegistry::builtin().unwrap();
        let source = registry.get_source_config("biletinial").unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();

        let units = source.work_units(today, Some("istanbul"));
        assert_eq!(units.len(), source.categories.len() * 7);
        assert_eq!(units[6].date, NaiveDate::from_ymd_opt(2025, 1, 5));

        let url = source.search_url(&units[0]);
        assert!(url.starts_with("https://biletinial.com/tr-tr/tiyatro/istanbul?date=2024-12-30"));
    }

    #[test]
    fn city_filter_without_match_yields_no_units() {
        let registry = SourceRegistry::builtin().unwrap();
        let source = registry.get_source_config("biletino").unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert!(source.work_units(today, Some("trabzon")).is_empty());
        assert_eq!(
            source.work_units(today, None).len(),
            source.categories.len() * source.cities.len()
        );
    }

    #[test]
    fn loads_overrides_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config: SourceConfig =
            serde_json::from_str(include_str!("../registry/biletix.json")).unwrap();
        config.enabled = false;
        fs::write(dir.path().join("biletix.json"), serde_json::to_string(&config).unwrap()).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = SourceRegistry::load_from_directory(dir.path()).unwrap();
        assert_eq!(registry.all_sources().len(), 1);
        assert!(!registry.is_source_enabled("biletix"));
        assert!(registry.get_enabled_sources().is_empty());
    }

    #[test]
    fn missing_directory_is_a_config_error() {
        let result = SourceRegistry::load_from_directory("/nonexistent/registry");
        assert!(matches!(result, Err(ScraperError::Config(_))));
    }
}
