//! Page interaction helpers shared by the listing and detail stages.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::app::ports::{bounded, BrowserSession, ElementRef, Locator};
use crate::cancel::{sleep_unless_cancelled, CancellationToken};
use crate::error::{Result, ScraperError};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SCROLL_SETTLE: Duration = Duration::from_millis(500);
const CONSENT_SETTLE: Duration = Duration::from_millis(1000);

const COOKIE_BUTTON_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    ".ot-sdk-container button.accept-cookies",
    ".ot-sdk-container .ot-sdk-button",
    ".cookie-consent-button",
    ".accept-cookies",
    ".cookie-accept",
    "button[aria-label='Accept cookies']",
];

const COOKIE_BUTTON_XPATHS: &[&str] = &[
    "//button[contains(text(), 'Accept')]",
    "//button[contains(text(), 'Kabul')]",
    "//a[contains(text(), 'Accept')]",
    "//a[contains(text(), 'Kabul')]",
];

const CONSENT_ROW_BUTTON: &str = ".ot-sdk-row button";

pub const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

const HIDE_OVERLAYS_SCRIPT: &str = r#"
var selectors = ['.ot-sdk-row', '#onetrust-banner-sdk', '#onetrust-consent-sdk',
  '.onetrust-pc-dark-filter', '.cookie-banner', '.modal', '.popup', '.overlay',
  '[class*="cookie"]', '[id*="cookie"]', '[class*="consent"]', '[id*="consent"]'];
selectors.forEach(function (s) {
  document.querySelectorAll(s).forEach(function (el) {
    el.style.display = 'none';
    el.style.zIndex = '-1000';
    el.style.pointerEvents = 'none';
  });
});
"#;

/// Navigates and waits for `body`, each step bounded by `timeout`.
pub async fn open_page(session: &mut dyn BrowserSession, url: &str, timeout: Duration) -> Result<()> {
    bounded(timeout, session.navigate(url)).await?;
    bounded(timeout, session.wait_for_body()).await
}

/// Polls until at least one element matches, returning how many did.
/// Stops with [`ScraperError::Cancelled`] as soon as `cancel` fires.
pub async fn wait_for_elements(
    session: &mut dyn BrowserSession,
    locator: &Locator,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<usize> {
    let deadline = Instant::now() + timeout;
    loop {
        let count = session.find_all(locator).await?.len();
        if count > 0 {
            return Ok(count);
        }
        if Instant::now() >= deadline {
            return Err(ScraperError::Timeout(timeout));
        }
        if !sleep_unless_cancelled(cancel, POLL_INTERVAL).await {
            return Err(ScraperError::Cancelled);
        }
    }
}

/// Clicks the first cookie-consent control that can be found. Best-effort.
pub async fn dismiss_cookie_consent(session: &mut dyn BrowserSession) -> bool {
    let candidates = COOKIE_BUTTON_SELECTORS
        .iter()
        .map(|s| Locator::css(s))
        .chain(COOKIE_BUTTON_XPATHS.iter().map(|x| Locator::xpath(x)))
        .chain(std::iter::once(Locator::css(CONSENT_ROW_BUTTON)));

    for locator in candidates {
        let Ok(found) = session.find_all(&locator).await else {
            continue;
        };
        let Some(button) = found.into_iter().next() else {
            continue;
        };
        if session.click_via_script(button).await.is_ok() {
            debug!("Dismissed cookie consent via {}", locator);
            sleep(CONSENT_SETTLE).await;
            return true;
        }
    }
    false
}

/// Hides banners and overlays that intercept clicks. Best-effort.
pub async fn suppress_overlays(session: &mut dyn BrowserSession) {
    if let Err(e) = session.execute_script(HIDE_OVERLAYS_SCRIPT).await {
        debug!("Overlay suppression failed: {}", e);
    }
}

/// Clicks the first match of `locator`, escalating from a native click to a
/// script click, then to a script click on a freshly located element after
/// overlays are hidden. Returns false once every tier failed.
pub async fn tiered_click(session: &mut dyn BrowserSession, locator: &Locator) -> bool {
    let Some(element) = first_match(session, locator).await else {
        return false;
    };

    let native = async {
        session.scroll_into_view(element).await?;
        sleep(SCROLL_SETTLE).await;
        session.click(element).await
    }
    .await;
    match native {
        Ok(()) => return true,
        Err(e) => debug!("Direct click on {} failed: {}", locator, e),
    }

    match session.click_via_script(element).await {
        Ok(()) => return true,
        Err(e) => debug!("Script click on {} failed: {}", locator, e),
    }

    suppress_overlays(session).await;
    let Some(fresh) = first_match(session, locator).await else {
        return false;
    };
    match session.click_via_script(fresh).await {
        Ok(()) => true,
        Err(e) => {
            warn!("All click strategies failed for {}: {}", locator, e);
            false
        }
    }
}

async fn first_match(session: &mut dyn BrowserSession, locator: &Locator) -> Option<ElementRef> {
    match session.find_all(locator).await {
        Ok(found) => found.into_iter().next(),
        Err(e) => {
            debug!("Lookup of {} failed: {}", locator, e);
            None
        }
    }
}
