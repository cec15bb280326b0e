use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Completed,
    Unavailable,
    Failed,
    Cancelled,
}

/// Counts for one listing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitReport {
    pub label: String,
    pub url: String,
    pub cards: usize,
    /// Cards on the page that lacked a title or date.
    pub dropped: usize,
    pub built: usize,
    pub inserted: usize,
    pub merged: usize,
    pub skipped: usize,
    /// The page could not be loaded or read at all.
    pub failed: bool,
    pub errors: Vec<String>,
}

impl UnitReport {
    pub fn new(label: String, url: String) -> Self {
        Self { label, url, ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub status: SourceStatus,
    pub units: Vec<UnitReport>,
    pub errors: Vec<String>,
}

impl SourceReport {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            status: SourceStatus::Completed,
            units: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn cards(&self) -> usize {
        self.units.iter().map(|u| u.cards).sum()
    }

    pub fn inserted(&self) -> usize {
        self.units.iter().map(|u| u.inserted).sum()
    }

    pub fn merged(&self) -> usize {
        self.units.iter().map(|u| u.merged).sum()
    }

    pub fn skipped(&self) -> usize {
        self.units.iter().map(|u| u.skipped).sum()
    }

    pub fn dropped(&self) -> usize {
        self.units.iter().map(|u| u.dropped).sum()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len() + self.units.iter().map(|u| u.errors.len()).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub city: Option<String>,
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn new(city: Option<&str>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            city: city.map(str::to_string),
            sources: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn source(&self, source_id: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    pub fn total_inserted(&self) -> usize {
        self.sources.iter().map(SourceReport::inserted).sum()
    }

    pub fn total_merged(&self) -> usize {
        self.sources.iter().map(SourceReport::merged).sum()
    }

    /// Writes `run-<timestamp>.json` under `output_dir`, creating it if needed.
    pub async fn write_to(&self, output_dir: &Path) -> Result<PathBuf> {
        if !output_dir.exists() {
            tokio::fs::create_dir_all(output_dir).await?;
            debug!("Created output directory: {:?}", output_dir);
        }
        let path = output_dir.join(format!("run-{}.json", self.started_at.format("%Y%m%dT%H%M%SZ")));
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_over_units() {
        let mut source = SourceReport::new("biletix");
        source.units.push(UnitReport { inserted: 2, merged: 1, cards: 4, ..UnitReport::default() });
        source.units.push(UnitReport {
            inserted: 1,
            skipped: 3,
            dropped: 1,
            cards: 4,
            errors: vec!["timeout".to_string()],
            ..UnitReport::default()
        });
        source.errors.push("probe".to_string());

        let mut report = RunReport::new(Some("istanbul"));
        report.sources.push(source);

        let biletix = report.source("biletix").unwrap();
        assert_eq!(biletix.cards(), 8);
        assert_eq!(biletix.skipped(), 3);
        assert_eq!(biletix.dropped(), 1);
        assert_eq!(biletix.error_count(), 2);
        assert_eq!(report.total_inserted(), 3);
        assert_eq!(report.total_merged(), 1);
    }

    #[tokio::test]
    async fn writes_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = RunReport::new(None);
        report.sources.push(SourceReport { status: SourceStatus::Unavailable, ..SourceReport::new("biletino") });
        report.finish();

        let path = report.write_to(&dir.path().join("out")).await.unwrap();
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["sources"][0]["status"], "unavailable");
        assert!(written["finished_at"].is_string());
    }
}
