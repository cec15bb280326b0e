//! Browser driver for server-rendered pages.
//!
//! Pages are fetched with reqwest and queried with `scraper`. Scripts, clicks
//! and XPath lookups are not available, so incremental loading ends after the
//! first page and consent handling is skipped.

use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use scraper::{ElementRef as HtmlElement, Html, Selector};
use std::collections::HashMap;
use tracing::debug;

use crate::app::ports::{BrowserLauncher, BrowserOptions, BrowserSession, ElementRef, Locator};
use crate::error::{Result, ScraperError};

/// Detached copy of one element, safe to keep across awaits.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSnapshot {
    pub outer_html: String,
    pub text: String,
    pub attributes: HashMap<String, String>,
}

pub fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScraperError::Browser(format!("invalid selector {:?}: {:?}", css, e)))
}

/// Text content with whitespace collapsed.
pub fn element_text(element: &HtmlElement<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn snapshot(element: &HtmlElement<'_>) -> ElementSnapshot {
    ElementSnapshot {
        outer_html: element.html(),
        text: element_text(element),
        attributes: element
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// Snapshots every match of `css` in a full document or a fragment.
pub fn select_snapshots(html: &str, css: &str, fragment: bool) -> Result<Vec<ElementSnapshot>> {
    let selector = parse_selector(css)?;
    let document = if fragment { Html::parse_fragment(html) } else { Html::parse_document(html) };
    Ok(document.select(&selector).map(|el| snapshot(&el)).collect())
}

pub fn page_title(html: &str) -> String {
    let document = Html::parse_document(html);
    match Selector::parse("title") {
        Ok(selector) => document
            .select(&selector)
            .next()
            .map(|t| element_text(&t))
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// Element handles backed by [`ElementSnapshot`]s, reset on every navigation.
#[derive(Debug, Default)]
pub struct SnapshotArena {
    elements: Vec<ElementSnapshot>,
}

impl SnapshotArena {
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn register(&mut self, snapshots: Vec<ElementSnapshot>) -> Vec<ElementRef> {
        snapshots
            .into_iter()
            .map(|s| {
                self.elements.push(s);
                ElementRef(self.elements.len() - 1)
            })
            .collect()
    }

    pub fn get(&self, element: ElementRef) -> Result<&ElementSnapshot> {
        self.elements
            .get(element.0)
            .ok_or_else(|| ScraperError::ElementNotFound(format!("stale element handle {}", element.0)))
    }
}

pub struct StaticHtmlLauncher;

#[async_trait]
impl BrowserLauncher for StaticHtmlLauncher {
    async fn open(&self, options: &BrowserOptions) -> Result<Box<dyn BrowserSession>> {
        if let Some(path) = &options.binary_path {
            debug!("Static driver ignores browser binary {}", path);
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("tr-TR,tr;q=0.9,en;q=0.8"));
        let client = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .default_headers(headers)
            .timeout(options.timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Box::new(StaticHtmlSession { client, page: None, arena: SnapshotArena::default() }))
    }
}

struct LoadedPage {
    url: String,
    html: String,
}

pub struct StaticHtmlSession {
    client: reqwest::Client,
    page: Option<LoadedPage>,
    arena: SnapshotArena,
}

impl StaticHtmlSession {
    fn page(&self) -> Result<&LoadedPage> {
        self.page.as_ref().ok_or_else(|| ScraperError::Browser("no page loaded".to_string()))
    }
}

#[async_trait]
impl BrowserSession for StaticHtmlSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.arena.clear();
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::Browser(format!("GET {} returned {}", url, status)));
        }
        let final_url = response.url().to_string();
        let html = response.text().await?;
        debug!("Loaded {} ({} bytes)", final_url, html.len());
        self.page = Some(LoadedPage { url: final_url, html });
        Ok(())
    }

    async fn wait_for_body(&mut self) -> Result<()> {
        let page = self.page()?;
        if select_snapshots(&page.html, "body", false)?.is_empty() {
            return Err(ScraperError::ElementNotFound("body".to_string()));
        }
        Ok(())
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementRef>> {
        match locator {
            Locator::Css(css) => {
                let snapshots = select_snapshots(&self.page()?.html, css, false)?;
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

    async fn click(&mut self, _element: ElementRef) -> Result<()> {
        Err(ScraperError::Interaction("static pages cannot be clicked".to_string()))
    }

    async fn click_via_script(&mut self, _element: ElementRef) -> Result<()> {
        Err(ScraperError::Interaction("static pages cannot run scripts".to_string()))
    }

    async fn scroll_into_view(&mut self, element: ElementRef) -> Result<()> {
        self.arena.get(element).map(|_| ())
    }

    async fn execute_script(&mut self, _script: &str) -> Result<()> {
        debug!("Static driver skipped a script");
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
        Ok(page_title(&self.page()?.html))
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.page()?.url.clone())
    }

    async fn page_source(&mut self) -> Result<String> {
        Ok(self.page()?.html.clone())
    }

    async fn close(&mut self) -> Result<()> {
        self.page = None;
        self.arena.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Biletinial - Tiyatro</title></head>
        <body><ul id="list">
          <li class="card"><h3><a href="/etkinlik/1">Hamlet</a></h3><span>Aralık - 25</span></li>
          <li class="card"><h3><a href="/etkinlik/2">Cimri</a></h3><span>Aralık - 26</span></li>
        </ul></body></html>"#;

    #[test]
    fn snapshots_carry_text_and_attributes() {
        let cards = select_snapshots(PAGE, "li.card", false).unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].text, "Hamlet Aralık - 25");

        let links = select_snapshots(&cards[1].outer_html, "h3 a", true).unwrap();
        assert_eq!(links[0].attributes.get("href").map(String::as_str), Some("/etkinlik/2"));
    }

    #[test]
    fn reads_page_title() {
        assert_eq!(page_title(PAGE), "Biletinial - Tiyatro");
        assert_eq!(page_title("<p>no title</p>"), "");
    }

    #[test]
    fn invalid_selector_is_an_error() {
        assert!(matches!(select_snapshots(PAGE, "li[", false), Err(ScraperError::Browser(_))));
    }

    #[test]
    fn arena_rejects_stale_handles() {
        let mut arena = SnapshotArena::default();
        let handles = arena.register(select_snapshots(PAGE, "li.card", false).unwrap());
        assert!(arena.get(handles[1]).is_ok());
        arena.clear();
        assert!(arena.get(handles[1]).is_err());
    }
}
