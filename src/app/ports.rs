use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::{Result, ScraperError};

/// How to find elements on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    pub fn xpath(expression: &str) -> Self {
        Locator::XPath(expression.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css={}", s),
            Locator::XPath(s) => write!(f, "xpath={}", s),
        }
    }
}

/// Opaque handle to an element found in the current session.
/// Handles are invalidated by navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(pub usize);

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub binary_path: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
    pub window_size: (u32, u32),
}

/// One live browser session. Dropped sessions must be closed first.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn wait_for_body(&mut self) -> Result<()>;
    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementRef>>;
    async fn find_within(&mut self, parent: ElementRef, locator: &Locator) -> Result<Vec<ElementRef>>;
    async fn click(&mut self, element: ElementRef) -> Result<()>;
    async fn click_via_script(&mut self, element: ElementRef) -> Result<()>;
    async fn scroll_into_view(&mut self, element: ElementRef) -> Result<()>;
    async fn execute_script(&mut self, script: &str) -> Result<()>;
    async fn attribute(&mut self, element: ElementRef, name: &str) -> Result<Option<String>>;
    async fn text(&mut self, element: ElementRef) -> Result<String>;
    async fn outer_html(&mut self, element: ElementRef) -> Result<String>;
    async fn is_displayed(&mut self, element: ElementRef) -> Result<bool>;
    async fn title(&mut self) -> Result<String>;
    async fn current_url(&mut self) -> Result<String>;
    async fn page_source(&mut self) -> Result<String>;
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self, options: &BrowserOptions) -> Result<Box<dyn BrowserSession>>;
}

/// Cheap reachability check run before a source is scraped.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn is_available(&self, url: &str, title_marker: Option<&str>) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub data_base64: String,
    pub mime_type: String,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

/// Runs `fut`, failing with [`ScraperError::Timeout`] once `limit` elapses.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ScraperError::Timeout(limit)),
    }
}
