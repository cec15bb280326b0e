use scraper::{ElementRef as HtmlElement, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::app::ports::BrowserSession;
use crate::infra::static_browser::{element_text, page_title, parse_selector};
use crate::pipeline::interaction::open_page;
use crate::types::RawEventInfo;

/// One way of locating a detail-page field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStrategy {
    /// Text of the first element matching the selector.
    Css(String),
    /// Text of the `<p>` following a `<label>` that contains this text.
    Labeled(String),
    /// Text of the n-th (zero-based) match of the selector.
    Nth { selector: String, index: usize },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailSelectors {
    #[serde(default)]
    pub title: Vec<FieldStrategy>,
    /// Stripped from the page `<title>` when used as the title fallback.
    #[serde(default)]
    pub page_title_suffix: Option<String>,
    #[serde(default)]
    pub description: Vec<FieldStrategy>,
    #[serde(default)]
    pub start_date: Vec<FieldStrategy>,
    #[serde(default)]
    pub end_date: Vec<FieldStrategy>,
    #[serde(default)]
    pub venue: Vec<FieldStrategy>,
    #[serde(default)]
    pub location: Vec<FieldStrategy>,
    /// `"Venue, District, City"` style text split into venue and location.
    #[serde(default)]
    pub combined_location: Vec<FieldStrategy>,
}

/// Visits detail pages to fill in what listing cards leave out.
pub struct DetailEnricher<'a> {
    selectors: &'a DetailSelectors,
    timeout: Duration,
}

impl<'a> DetailEnricher<'a> {
    pub fn new(selectors: &'a DetailSelectors, timeout: Duration) -> Self {
        Self { selectors, timeout }
    }

    /// Never fails: navigation problems yield an empty record carrying only the URL.
    #[instrument(skip(self, session))]
    pub async fn enrich(&self, session: &mut dyn BrowserSession, url: &str) -> RawEventInfo {
        if let Err(e) = open_page(session, url, self.timeout).await {
            warn!("Could not open detail page {}: {}", url, e);
            return RawEventInfo { ticket_url: url.to_string(), ..RawEventInfo::default() };
        }
        let html = match session.page_source().await {
            Ok(html) => html,
            Err(e) => {
                warn!("Could not read detail page {}: {}", url, e);
                return RawEventInfo { ticket_url: url.to_string(), ..RawEventInfo::default() };
            }
        };
        let current = session.current_url().await.unwrap_or_else(|_| url.to_string());
        parse_detail(&html, self.selectors, &current)
    }
}

fn select_all<'d>(document: &'d Html, css: &str) -> Vec<HtmlElement<'d>> {
    match parse_selector(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(e) => {
            debug!("{}", e);
            Vec::new()
        }
    }
}

fn labeled_value(document: &Html, label: &str) -> String {
    let Ok(label_selector) = Selector::parse("label") else {
        return String::new();
    };
    document
        .select(&label_selector)
        .filter(|l| element_text(l).contains(label))
        .filter_map(|l| {
            l.next_siblings()
                .filter_map(HtmlElement::wrap)
                .find(|sibling| sibling.value().name() == "p")
        })
        .map(|p| element_text(&p))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn resolve_field(document: &Html, strategies: &[FieldStrategy]) -> String {
    for strategy in strategies {
        let value = match strategy {
            FieldStrategy::Css(css) => select_all(document, css)
                .first()
                .map(element_text)
                .unwrap_or_default(),
            FieldStrategy::Labeled(label) => labeled_value(document, label),
            FieldStrategy::Nth { selector, index } => select_all(document, selector)
                .get(*index)
                .map(element_text)
                .unwrap_or_default(),
        };
        if !value.is_empty() {
            return value;
        }
    }
    String::new()
}

/// Splits `"Venue, District, City"` at the first comma.
/// Without a comma the whole text is the location.
pub fn split_location(combined: &str) -> (String, String) {
    match combined.split_once(',') {
        Some((venue, rest)) => (venue.trim().to_string(), rest.trim().to_string()),
        None => (String::new(), combined.trim().to_string()),
    }
}

/// Reads a detail page. Missing fields come back empty.
pub fn parse_detail(html: &str, selectors: &DetailSelectors, url: &str) -> RawEventInfo {
    let document = Html::parse_document(html);

    let mut title = resolve_field(&document, &selectors.title);
    if title.is_empty() {
        let page = page_title(html);
        title = match &selectors.page_title_suffix {
            Some(suffix) => page.trim_end_matches(suffix.as_str()).trim().to_string(),
            None => page,
        };
    }

    let start = resolve_field(&document, &selectors.start_date);
    let end = resolve_field(&document, &selectors.end_date);
    let date_str = if end.is_empty() || end == start {
        start
    } else if start.is_empty() {
        String::new()
    } else {
        format!("{} - {}", start, end)
    };

    let mut venue_name = resolve_field(&document, &selectors.venue);
    let mut location = resolve_field(&document, &selectors.location);
    let combined = resolve_field(&document, &selectors.combined_location);
    if !combined.is_empty() {
        let (venue, rest) = split_location(&combined);
        if venue_name.is_empty() {
            venue_name = venue;
        }
        if location.is_empty() {
            location = rest;
        }
    }

    RawEventInfo {
        title,
        date_str,
        venue_name,
        location,
        ticket_url: url.to_string(),
        image_url: String::new(),
        description: resolve_field(&document, &selectors.description),
    }
}

fn prefer(detail: &str, basic: &str) -> String {
    if detail.trim().is_empty() {
        basic.to_string()
    } else {
        detail.to_string()
    }
}

/// Field-by-field merge: a non-empty detail value wins over the card value.
pub fn merge_fields(basic: &RawEventInfo, detail: Option<&RawEventInfo>) -> RawEventInfo {
    let Some(detail) = detail else {
        return basic.clone();
    };
    RawEventInfo {
        title: prefer(&detail.title, &basic.title),
        date_str: prefer(&detail.date_str, &basic.date_str),
        venue_name: prefer(&detail.venue_name, &basic.venue_name),
        location: prefer(&detail.location, &basic.location),
        ticket_url: prefer(&detail.ticket_url, &basic.ticket_url),
        image_url: prefer(&detail.image_url, &basic.image_url),
        description: prefer(&detail.description, &basic.description),
    }
}
