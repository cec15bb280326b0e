//! Listing-page extraction: load every card a search page will give us, then
//! read each card's fields with the source's selectors.

use scraper::{ElementRef as HtmlElement, Html};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::{BrowserSession, Locator};
use crate::cancel::{sleep_unless_cancelled, CancellationToken};
use crate::error::{Result, ScraperError};
use crate::infra::static_browser::{element_text, parse_selector};
use crate::pipeline::interaction::{
    dismiss_cookie_consent, open_page, suppress_overlays, tiered_click, wait_for_elements,
    SCROLL_TO_BOTTOM_SCRIPT,
};
use crate::registry::SourceConfig;
use crate::types::RawEventInfo;

fn default_max_attempts() -> u32 {
    20
}

fn default_wait_ms() -> u64 {
    2000
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_image_attributes() -> Vec<String> {
    vec!["src".to_string(), "data-src".to_string()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Everything is on the first page.
    #[default]
    None,
    /// A "load more" control appends cards.
    Button,
    /// Scrolling to the bottom appends cards.
    Scroll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalLoading {
    #[serde(default)]
    pub mode: LoadMode,
    #[serde(default)]
    pub button_selector: Option<String>,
    #[serde(default)]
    pub end_marker_selector: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause after each attempt before cards are counted again.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
    /// Pause after consent handling, before the first attempt.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// How long to wait for the first card. Unset means look once.
    #[serde(default)]
    pub card_wait_secs: Option<u64>,
}

impl Default for IncrementalLoading {
    fn default() -> Self {
        Self {
            mode: LoadMode::None,
            button_selector: None,
            end_marker_selector: None,
            max_attempts: default_max_attempts(),
            wait_ms: default_wait_ms(),
            settle_ms: default_settle_ms(),
            card_wait_secs: None,
        }
    }
}

/// Mobile layouts split the date into three elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatePartSelectors {
    pub day: String,
    pub month: String,
    pub year: String,
}

/// Per-field selector lists, tried in order. The first non-empty value wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardSelectors {
    pub card: String,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub date: Vec<String>,
    #[serde(default)]
    pub secondary_date: Option<String>,
    #[serde(default)]
    pub date_parts: Option<DatePartSelectors>,
    #[serde(default)]
    pub venue: Vec<String>,
    #[serde(default)]
    pub location: Vec<String>,
    /// Elements whose `href` is the detail/ticket link.
    #[serde(default)]
    pub link: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_image_attributes")]
    pub image_attributes: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardSkip {
    #[error("card has no title")]
    MissingTitle,
    #[error("card {0:?} has no date")]
    MissingDate(String),
}

/// Why incremental loading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStop {
    NotIncremental,
    EndMarker,
    LoaderGone,
    Stalled,
    MaxAttempts,
    Cancelled,
}

/// Cards read from one listing page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub cards: Vec<RawEventInfo>,
    /// Cards left out for a missing title or date, or unreadable markup.
    pub dropped: usize,
}

pub struct PageExtractor<'a> {
    source: &'a SourceConfig,
    cancel: &'a CancellationToken,
}

impl<'a> PageExtractor<'a> {
    pub fn new(source: &'a SourceConfig, cancel: &'a CancellationToken) -> Self {
        Self { source, cancel }
    }

    /// Loads `url`, exhausts incremental loading and returns the cards in
    /// page order. Cards without a title or date are logged and counted as dropped.
    #[instrument(skip(self, session), fields(source = %self.source.source_id))]
    pub async fn extract(&self, session: &mut dyn BrowserSession, url: &str) -> Result<ExtractedPage> {
        open_page(session, url, self.source.wait_timeout()).await?;

        let card_locator = Locator::css(&self.source.card.card);
        let initial = match self.source.loading.card_wait_secs {
            Some(secs) => {
                match wait_for_elements(session, &card_locator, Duration::from_secs(secs), self.cancel).await {
                    Ok(count) => count,
                    Err(ScraperError::Timeout(_)) => 0,
                    Err(ScraperError::Cancelled) => {
                        info!("Cancelled while waiting for cards on {}", url);
                        return Ok(ExtractedPage::default());
                    }
                    Err(e) => return Err(e),
                }
            }
            None => session.find_all(&card_locator).await?.len(),
        };
        if initial == 0 {
            info!("No event cards found on {}", url);
            return Ok(ExtractedPage::default());
        }

        let stop = self.load_all(session, &card_locator).await;
        debug!(?stop, "Incremental loading finished");

        let cards = session.find_all(&card_locator).await?;
        let mut page = ExtractedPage { cards: Vec::with_capacity(cards.len()), dropped: 0 };
        for (index, card) in cards.into_iter().enumerate() {
            let html = match session.outer_html(card).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(index, "Could not read card: {}", e);
                    page.dropped += 1;
                    continue;
                }
            };
            match parse_card(&html, &self.source.card, &self.source.base_url) {
                Ok(raw) => page.cards.push(raw),
                Err(reason) => {
                    warn!(index, "Skipping card: {}", reason);
                    page.dropped += 1;
                }
            }
        }
        info!("Extracted {} cards from {} ({} dropped)", page.cards.len(), url, page.dropped);
        Ok(page)
    }

    /// Triggers incremental loading until an end condition holds.
    pub async fn load_all(&self, session: &mut dyn BrowserSession, card_locator: &Locator) -> LoadStop {
        let loading = &self.source.loading;
        let button = match (loading.mode, &loading.button_selector) {
            (LoadMode::None, _) => return LoadStop::NotIncremental,
            (LoadMode::Button, None) => {
                warn!("Button loading configured without a button selector");
                return LoadStop::NotIncremental;
            }
            (LoadMode::Button, Some(selector)) => Some(Locator::css(selector)),
            (LoadMode::Scroll, _) => None,
        };

        dismiss_cookie_consent(session).await;
        suppress_overlays(session).await;
        if !sleep_unless_cancelled(self.cancel, Duration::from_millis(loading.settle_ms)).await {
            return LoadStop::Cancelled;
        }

        let mut last_count = count_matches(session, card_locator).await;
        let mut stalled = 0;

        for attempt in 1..=loading.max_attempts {
            if self.cancel.is_cancelled() {
                return LoadStop::Cancelled;
            }
            if self.end_marker_displayed(session).await {
                return LoadStop::EndMarker;
            }

            let triggered = match &button {
                Some(button) => {
                    if count_matches(session, button).await == 0 {
                        return LoadStop::LoaderGone;
                    }
                    dismiss_cookie_consent(session).await;
                    tiered_click(session, button).await
                }
                None => match session.execute_script(SCROLL_TO_BOTTOM_SCRIPT).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("Scroll failed: {}", e);
                        false
                    }
                },
            };
            if !triggered {
                debug!(attempt, "Load-more attempt failed");
            }

            if !sleep_unless_cancelled(self.cancel, Duration::from_millis(loading.wait_ms)).await {
                return LoadStop::Cancelled;
            }

            let count = count_matches(session, card_locator).await;
            if count > last_count {
                debug!(attempt, count, "More cards loaded");
                last_count = count;
                stalled = 0;
            } else {
                stalled += 1;
                if stalled >= 2 {
                    return LoadStop::Stalled;
                }
            }
        }
        LoadStop::MaxAttempts
    }

    async fn end_marker_displayed(&self, session: &mut dyn BrowserSession) -> bool {
        let Some(selector) = &self.source.loading.end_marker_selector else {
            return false;
        };
        let Ok(found) = session.find_all(&Locator::css(selector)).await else {
            return false;
        };
        for marker in found {
            if session.is_displayed(marker).await.unwrap_or(false) {
                return true;
            }
        }
        false
    }
}

async fn count_matches(session: &mut dyn BrowserSession, locator: &Locator) -> usize {
    session.find_all(locator).await.map(|found| found.len()).unwrap_or(0)
}

fn select_first<'d>(document: &'d Html, css: &str) -> Option<HtmlElement<'d>> {
    match parse_selector(css) {
        Ok(selector) => document.select(&selector).next(),
        Err(e) => {
            debug!("{}", e);
            None
        }
    }
}

fn first_text(document: &Html, selectors: &[String]) -> String {
    selectors
        .iter()
        .filter_map(|css| select_first(document, css))
        .map(|el| element_text(&el))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn first_attribute(document: &Html, selectors: &[String], attributes: &[String]) -> String {
    for css in selectors {
        let Some(el) = select_first(document, css) else {
            continue;
        };
        for name in attributes {
            if let Some(value) = el.value().attr(name) {
                let value = value.trim();
                if !value.is_empty() && !value.starts_with("data:") {
                    return value.to_string();
                }
            }
        }
    }
    String::new()
}

/// Resolves `href` against `base_url`; falls back to the raw value.
pub fn resolve_url(base_url: &str, href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }
    reqwest::Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Reads one card's outer HTML into a [`RawEventInfo`].
pub fn parse_card(
    html: &str,
    selectors: &CardSelectors,
    base_url: &str,
) -> std::result::Result<RawEventInfo, CardSkip> {
    let document = Html::parse_fragment(html);

    let title = first_text(&document, &selectors.title);
    if title.is_empty() {
        return Err(CardSkip::MissingTitle);
    }

    let mut date_str = first_text(&document, &selectors.date);
    if date_str.is_empty() {
        if let Some(parts) = &selectors.date_parts {
            let day = first_text(&document, std::slice::from_ref(&parts.day));
            let month = first_text(&document, std::slice::from_ref(&parts.month));
            let year = first_text(&document, std::slice::from_ref(&parts.year));
            if !day.is_empty() && !month.is_empty() && !year.is_empty() {
                date_str = format!("{} {} {}", day, month, year);
            }
        }
    } else if let Some(secondary) = &selectors.secondary_date {
        let second = first_text(&document, std::slice::from_ref(secondary));
        if !second.is_empty() && second != date_str {
            date_str = format!("{} - {}", date_str, second.trim_start_matches(['-', ' ']));
        }
    }
    if date_str.is_empty() {
        return Err(CardSkip::MissingDate(title));
    }

    let link = first_attribute(&document, &selectors.link, &["href".to_string()]);
    let image = match &selectors.image {
        Some(css) => first_attribute(&document, std::slice::from_ref(css), &selectors.image_attributes),
        None => String::new(),
    };

    Ok(RawEventInfo {
        title,
        date_str,
        venue_name: first_text(&document, &selectors.venue),
        location: first_text(&document, &selectors.location),
        ticket_url: resolve_url(base_url, &link),
        image_url: resolve_url(base_url, &image),
        description: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn biletix_like() -> CardSelectors {
        CardSelectors {
            card: ".searchResultEvent".to_string(),
            title: strings(&[".ln1.searchResultEventName", ".searchResultEventNameMobile"]),
            date: strings(&[".fld3 .ln1"]),
            secondary_date: Some(".fld3 .ln2".to_string()),
            date_parts: Some(DatePartSelectors {
                day: ".day".to_string(),
                month: ".month".to_string(),
                year: ".year".to_string(),
            }),
            venue: strings(&[".searchResultPlace"]),
            location: strings(&[".searchResultCity"]),
            link: strings(&["a[href*='/etkinlik/']"]),
            image: None,
            image_attributes: default_image_attributes(),
        }
    }

    #[test]
    fn reads_desktop_card() {
        let html = r#"<div class="searchResultEvent">
            <a href="/etkinlik/ABC123/TURKIYE/tr"><span class="ln1 searchResultEventName">Duman</span></a>
            <div class="fld3"><span class="ln1">Cum, 25/12/24</span><span class="ln2"></span></div>
            <span class="searchResultPlace">Volkswagen Arena</span>
            <span class="searchResultCity">İstanbul</span>
        </div>"#;
        let raw = parse_card(html, &biletix_like(), "https://www.biletix.com").unwrap();
        assert_eq!(raw.title, "Duman");
        assert_eq!(raw.date_str, "Cum, 25/12/24");
        assert_eq!(raw.venue_name, "Volkswagen Arena");
        assert_eq!(raw.location, "İstanbul");
        assert_eq!(raw.ticket_url, "https://www.biletix.com/etkinlik/ABC123/TURKIYE/tr");
    }

    #[test]
    fn secondary_date_becomes_range() {
        let html = r#"<div class="searchResultEvent">
            <span class="ln1 searchResultEventName">Hamlet</span>
            <div class="fld3"><span class="ln1">01.03.2025</span><span class="ln2">- 05.03.2025</span></div>
        </div>"#;
        let raw = parse_card(html, &biletix_like(), "https://www.biletix.com").unwrap();
        assert_eq!(raw.date_str, "01.03.2025 - 05.03.2025");
        assert_eq!(raw.ticket_url, "");
    }

    #[test]
    fn falls_back_to_mobile_fields() {
        let html = r#"<div class="searchResultEvent">
            <span class="searchResultEventNameMobile">Cem Yılmaz</span>
            <span class="day">7</span><span class="month">Ara</span><span class="year">2024</span>
        </div>"#;
        let raw = parse_card(html, &biletix_like(), "https://www.biletix.com").unwrap();
        assert_eq!(raw.title, "Cem Yılmaz");
        assert_eq!(raw.date_str, "7 Ara 2024");
        assert_eq!(raw.venue_name, "");
    }

    #[test]
    fn missing_required_fields_skip_the_card() {
        let no_title = r#"<div><div class="fld3"><span class="ln1">01.03.2025</span></div></div>"#;
        assert_eq!(parse_card(no_title, &biletix_like(), ""), Err(CardSkip::MissingTitle));

        let no_date = r#"<div><span class="ln1 searchResultEventName">Hamlet</span></div>"#;
        assert_eq!(
            parse_card(no_date, &biletix_like(), ""),
            Err(CardSkip::MissingDate("Hamlet".to_string()))
        );
    }

    #[test]
    fn image_prefers_real_urls_over_placeholders() {
        let selectors = CardSelectors {
            card: "div.product".to_string(),
            title: strings(&["h3.title"]),
            date: strings(&["p.date"]),
            link: strings(&["a.event-url"]),
            image: Some("img.swiper-lazy".to_string()),
            image_attributes: default_image_attributes(),
            ..CardSelectors::default()
        };
        let html = r#"<div class="product">
            <a class="event-url" href="/en/e-abc"><img class="swiper-lazy" src="data:image/gif;base64,R0lG" data-src="https://cdn.biletino.com/p.jpg"></a>
            <h3 class="title">Jazz Night</h3><p class="date">14 March 2025</p>
        </div>"#;
        let raw = parse_card(html, &selectors, "https://biletino.com").unwrap();
        assert_eq!(raw.image_url, "https://cdn.biletino.com/p.jpg");
        assert_eq!(raw.ticket_url, "https://biletino.com/en/e-abc");
    }

    #[test]
    fn resolves_relative_links() {
        assert_eq!(resolve_url("https://biletinial.com", "/tr-tr/tiyatro/x"), "https://biletinial.com/tr-tr/tiyatro/x");
        assert_eq!(resolve_url("https://biletinial.com", "https://other.example/a"), "https://other.example/a");
        assert_eq!(resolve_url("not a url", "/x"), "/x");
        assert_eq!(resolve_url("https://biletinial.com", ""), "");
    }
}
