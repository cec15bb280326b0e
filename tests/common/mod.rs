#![allow(dead_code)]

//! Scripted browser, probe and image fetcher for pipeline tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use whatnext_scraper::app::ports::{
    AvailabilityProbe, BrowserLauncher, BrowserOptions, BrowserSession, ElementRef, FetchedImage, ImageFetcher,
    Locator,
};
use whatnext_scraper::error::{Result, ScraperError};
use whatnext_scraper::infra::static_browser::{page_title, select_snapshots, SnapshotArena};
use whatnext_scraper::pipeline::interaction::SCROLL_TO_BOTTOM_SCRIPT;
use whatnext_scraper::registry::SourceConfig;

/// A page whose card list can grow when load-more is triggered.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: String,
    pub cards: Vec<String>,
    /// Each trigger appends the next batch.
    pub batches: Vec<Vec<String>>,
    /// Rendered while batches remain.
    pub load_more_button: Option<String>,
    /// Rendered once every batch is loaded.
    pub end_marker: Option<String>,
    /// Extra markup, used for detail pages.
    pub body: String,
    /// Rendered until its accept button is clicked.
    pub consent_banner: bool,
}

impl FakePage {
    pub fn listing(cards: &[&str]) -> Self {
        Self {
            title: "Listing".to_string(),
            cards: cards.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn detail(title: &str, body: &str) -> Self {
        Self { title: title.to_string(), body: body.to_string(), ..Self::default() }
    }

    fn render(&self, loaded: usize, consent_dismissed: bool) -> String {
        let mut cards: Vec<&str> = self.cards.iter().map(String::as_str).collect();
        for batch in self.batches.iter().take(loaded) {
            cards.extend(batch.iter().map(String::as_str));
        }
        let all_loaded = loaded >= self.batches.len();
        let button = match (&self.load_more_button, all_loaded) {
            (Some(button), false) => button.as_str(),
            _ => "",
        };
        let marker = match (&self.end_marker, all_loaded) {
            (Some(marker), true) => marker.as_str(),
            _ => "",
        };
        let banner = if self.consent_banner && !consent_dismissed {
            format!("<div id=\"onetrust-banner-sdk\"><button id=\"{}\">Kabul et</button></div>", CONSENT_BUTTON_ID)
        } else {
            String::new()
        };
        format!(
            "<html><head><title>{}</title></head><body>{}{}<div id=\"results\">{}</div>{}{}</body></html>",
            self.title,
            banner,
            self.body,
            cards.join(""),
            button,
            marker
        )
    }
}

pub const CONSENT_BUTTON_ID: &str = "onetrust-accept-btn-handler";

/// How the fake page reacts to clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickMode {
    #[default]
    Works,
    /// Native clicks are intercepted; script clicks go through.
    NativeFails,
    /// A popup covers the page after every load until overlays are hidden.
    /// Native clicks always fail.
    OverlayAfterLoad,
    /// Every click fails.
    AllFail,
}

#[derive(Debug, Default)]
pub struct SessionLog {
    pub opened: usize,
    pub closed: usize,
    pub navigations: Vec<String>,
    pub load_triggers: usize,
    pub consent_clicks: usize,
    pub overlay_hides: usize,
}

#[derive(Clone, Default)]
pub struct FakeLauncher {
    pages: Arc<HashMap<String, FakePage>>,
    click_mode: ClickMode,
    pub log: Arc<Mutex<SessionLog>>,
}

impl FakeLauncher {
    pub fn new(pages: Vec<(&str, FakePage)>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().map(|(url, page)| (url.to_string(), page)).collect()),
            click_mode: ClickMode::Works,
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    pub fn with_click_mode(mut self, mode: ClickMode) -> Self {
        self.click_mode = mode;
        self
    }

    pub fn session(&self) -> FakeSession {
        FakeSession {
            pages: Arc::clone(&self.pages),
            log: Arc::clone(&self.log),
            current: None,
            loaded: 0,
            arena: SnapshotArena::default(),
            click_mode: self.click_mode,
            consent_dismissed: false,
            overlay_shown: false,
        }
    }

    pub fn opened(&self) -> usize {
        self.log.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }

    pub fn navigations(&self) -> Vec<String> {
        self.log.lock().unwrap().navigations.clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn open(&self, _options: &BrowserOptions) -> Result<Box<dyn BrowserSession>> {
        self.log.lock().unwrap().opened += 1;
        Ok(Box::new(self.session()))
    }
}

pub struct FakeSession {
    pages: Arc<HashMap<String, FakePage>>,
    log: Arc<Mutex<SessionLog>>,
    current: Option<(String, FakePage)>,
    loaded: usize,
    arena: SnapshotArena,
    click_mode: ClickMode,
    consent_dismissed: bool,
    overlay_shown: bool,
}

impl FakeSession {
    fn html(&self) -> Result<String> {
        self.current
            .as_ref()
            .map(|(_, page)| page.render(self.loaded, self.consent_dismissed))
            .ok_or_else(|| ScraperError::Browser("no page loaded".to_string()))
    }

    fn trigger_load(&mut self) {
        if let Some((_, page)) = &self.current {
            if self.loaded < page.batches.len() {
                self.loaded += 1;
            }
        }
        self.overlay_shown = self.click_mode == ClickMode::OverlayAfterLoad;
        self.log.lock().unwrap().load_triggers += 1;
    }

    fn intercepted(element: ElementRef) -> ScraperError {
        ScraperError::Browser(format!("click on element {:?} intercepted", element))
    }

    /// A click that reached its element.
    fn press(&mut self, element: ElementRef) -> Result<()> {
        let is_consent = self.arena.get(element)?.attributes.get("id").map(String::as_str) == Some(CONSENT_BUTTON_ID);
        if is_consent {
            self.consent_dismissed = true;
            self.log.lock().unwrap().consent_clicks += 1;
        } else {
            self.trigger_load();
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        self.arena.clear();
        self.loaded = 0;
        self.overlay_shown = false;
        match self.pages.get(url) {
            Some(page) => {
                self.current = Some((url.to_string(), page.clone()));
                Ok(())
            }
            None => {
                self.current = None;
                Err(ScraperError::Browser(format!("GET {} returned 404 Not Found", url)))
            }
        }
    }

    async fn wait_for_body(&mut self) -> Result<()> {
        self.html().map(|_| ())
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementRef>> {
        match locator {
            Locator::Css(css) => {
                let snapshots = select_snapshots(&self.html()?, css, false)?;
                Ok(self.arena.register(snapshots))
            }
            Locator::XPath(_) => Ok(Vec::new()),
        }
    }

    async fn find_within(&mut self, parent: ElementRef, locator: &Locator) -> Result<Vec<ElementRef>> {
        match locator {
            Locator::Css(css) => {
                let outer = self.arena.get(parent)?.outer_html.clone();
                let snapshots = select_snapshots(&outer, css, true)?;
                Ok(self.arena.register(snapshots))
            }
            Locator::XPath(_) => Ok(Vec::new()),
        }
    }

    async fn click(&mut self, element: ElementRef) -> Result<()> {
        self.arena.get(element)?;
        match self.click_mode {
            ClickMode::Works => self.press(element),
            _ => Err(Self::intercepted(element)),
        }
    }

    async fn click_via_script(&mut self, element: ElementRef) -> Result<()> {
        self.arena.get(element)?;
        match self.click_mode {
            ClickMode::AllFail => Err(Self::intercepted(element)),
            ClickMode::OverlayAfterLoad if self.overlay_shown => Err(Self::intercepted(element)),
            _ => self.press(element),
        }
    }

    async fn scroll_into_view(&mut self, element: ElementRef) -> Result<()> {
        self.arena.get(element).map(|_| ())
    }

    async fn execute_script(&mut self, script: &str) -> Result<()> {
        if script == SCROLL_TO_BOTTOM_SCRIPT {
            self.trigger_load();
        } else {
            self.overlay_shown = false;
            self.log.lock().unwrap().overlay_hides += 1;
        }
        Ok(())
    }

    async fn attribute(&mut self, element: ElementRef, name: &str) -> Result<Option<String>> {
        Ok(self.arena.get(element)?.attributes.get(name).cloned())
    }

    async fn text(&mut self, element: ElementRef) -> Result<String> {
        Ok(self.arena.get(element)?.text.clone())
    }

    async fn outer_html(&mut self, element: ElementRef) -> Result<String> {
        Ok(self.arena.get(element)?.outer_html.clone())
    }

    async fn is_displayed(&mut self, element: ElementRef) -> Result<bool> {
        self.arena.get(element).map(|_| true)
    }

    async fn title(&mut self) -> Result<String> {
        Ok(page_title(&self.html()?))
    }

    async fn current_url(&mut self) -> Result<String> {
        self.current
            .as_ref()
            .map(|(url, _)| url.clone())
            .ok_or_else(|| ScraperError::Browser("no page loaded".to_string()))
    }

    async fn page_source(&mut self) -> Result<String> {
        self.html()
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        self.current = None;
        self.arena.clear();
        Ok(())
    }
}

/// Reports every base URL as up except the listed ones.
#[derive(Default)]
pub struct FakeProbe {
    down: HashSet<String>,
}

impl FakeProbe {
    pub fn down(urls: &[&str]) -> Self {
        Self { down: urls.iter().map(|u| u.to_string()).collect() }
    }
}

#[async_trait]
impl AvailabilityProbe for FakeProbe {
    async fn is_available(&self, url: &str, _title_marker: Option<&str>) -> bool {
        !self.down.contains(url)
    }
}

pub struct FakeImageFetcher;

#[async_trait]
impl ImageFetcher for FakeImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        if url.ends_with(".png") {
            Ok(FetchedImage { data_base64: "iVBORw0KGgo=".to_string(), mime_type: "image/png".to_string() })
        } else {
            Err(ScraperError::Browser(format!("GET {} returned 404 Not Found", url)))
        }
    }
}

/// A listing-only source at `base_url` with fast load-more timings.
pub fn source_json(source_id: &str, base_url: &str, priority: u32) -> Value {
    json!({
        "source_id": source_id,
        "display_name": source_id,
        "source": "biletino",
        "priority": priority,
        "base_url": base_url,
        "search_url_template": "{base_url}/search?category={category}",
        "categories": [
            { "name": "MUSIC", "param": "music", "default_type": "concert", "implies_type": true }
        ],
        "loading": { "mode": "none", "max_attempts": 5, "wait_ms": 1, "settle_ms": 1 },
        "card": {
            "card": "div.card",
            "title": ["h3"],
            "date": ["span.date"],
            "venue": ["span.venue"],
            "location": ["span.city"],
            "link": ["a.ticket"],
            "image": "img"
        }
    })
}

pub fn source_config(value: Value) -> SourceConfig {
    serde_json::from_value(value).expect("valid source config")
}

pub fn card(title: &str, date: &str, venue: &str, href: &str) -> String {
    format!(
        "<div class=\"card\"><h3>{}</h3><span class=\"date\">{}</span><span class=\"venue\">{}</span>\
         <span class=\"city\">İstanbul</span><a class=\"ticket\" href=\"{}\">Bilet</a></div>",
        title, date, venue, href
    )
}
