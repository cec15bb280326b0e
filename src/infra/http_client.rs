use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, warn};

use crate::app::ports::{AvailabilityProbe, FetchedImage, ImageFetcher};
use crate::error::{Result, ScraperError};
use crate::infra::static_browser::page_title;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()?)
}

/// GETs the landing page and checks its `<title>` for a marker.
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AvailabilityProbe for ReqwestProbe {
    async fn is_available(&self, url: &str, title_marker: Option<&str>) -> bool {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Availability check for {} failed: {}", url, e);
                return false;
            }
        };
        if !response.status().is_success() {
            warn!("Availability check for {} returned {}", url, response.status());
            return false;
        }
        let Some(marker) = title_marker else {
            return true;
        };
        match response.text().await {
            Ok(body) => {
                let title = page_title(&body);
                debug!("Landing page title for {}: {:?}", url, title);
                title.contains(marker)
            }
            Err(e) => {
                warn!("Could not read landing page {}: {}", url, e);
                false
            }
        }
    }
}

/// Downloads poster images and encodes them as base64.
pub struct ReqwestImageFetcher {
    client: reqwest::Client,
}

impl ReqwestImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for ReqwestImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ScraperError::Browser(format!("image {} returned {}", url, response.status())));
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
        let bytes = response.bytes().await?;
        Ok(FetchedImage { data_base64: STANDARD.encode(&bytes), mime_type })
    }
}
