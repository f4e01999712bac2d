//! Wikimedia Commons client: the two-stage fetch and the naming scheme
//! shared by cache hits and the source link.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::{ResolveError, Result};

pub const COMMONS_API_URL: &str = "https://commons.wikimedia.org/w/api.php";
pub const COMMONS_FILE_PAGE_BASE: &str = "https://commons.wikimedia.org/wiki/File:";

/// Requested thumbnail width in pixels.
pub const DEFAULT_THUMB_WIDTH: u32 = 700;
/// Per-stage request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

// Wikimedia asks API clients to identify themselves.
pub const USER_AGENT: &str = concat!("flagfinder/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub thumb_width: u32,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: COMMONS_API_URL.to_string(),
            thumb_width: DEFAULT_THUMB_WIDTH,
            timeout: DEFAULT_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_thumb_width(mut self, width: u32) -> Self {
        self.thumb_width = width;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Where a flag's thumbnail lives and what Commons calls the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagDescriptor {
    pub thumbnail_url: String,
    pub filename: String,
}

pub struct CommonsClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl CommonsClient {
    pub fn new(config: ClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .expect("failed to build http client");
        Self { http, config }
    }

    /// Stage 1: ask the Commons API where the country's flag thumbnail is.
    pub async fn fetch_flag_descriptor(&self, country: &str) -> Result<FlagDescriptor> {
        let title = format!("File:Flag of {country}.svg");
        let width = self.config.thumb_width.to_string();
        tracing::debug!("querying {} for {:?}", self.config.api_url, title);

        let response = self
            .http
            .get(&self.config.api_url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("prop", "pageimages"),
                ("titles", title.as_str()),
                ("pithumbsize", width.as_str()),
            ])
            .send()
            .await
            .map_err(metadata_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::MetadataHttp {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let body: QueryResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ResolveError::MetadataTimeout
            } else {
                ResolveError::MetadataMalformed {
                    country: country.to_string(),
                }
            }
        })?;

        body.into_descriptor()
            .ok_or_else(|| ResolveError::MetadataMalformed {
                country: country.to_string(),
            })
    }

    /// Stage 2: download the thumbnail bytes.
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("downloading flag thumbnail from {url}");

        let response = self.http.get(url).send().await.map_err(image_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::ImageHttp {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(image_error)?;
        Ok(bytes.to_vec())
    }
}

fn metadata_error(e: reqwest::Error) -> ResolveError {
    if e.is_timeout() {
        ResolveError::MetadataTimeout
    } else {
        ResolveError::MetadataTransport(e)
    }
}

fn image_error(e: reqwest::Error) -> ResolveError {
    if e.is_timeout() {
        ResolveError::ImageTimeout
    } else {
        ResolveError::ImageTransport(e)
    }
}

/// The Commons filename for a country's flag, also used as the attribution
/// on cache hits: `Flag_of_France.svg`, `Flag_of_Bosnia_and_Herzegovina.svg`.
pub fn commons_filename(country: &str) -> String {
    let words: Vec<&str> = country.split_whitespace().collect();
    format!("Flag_of_{}.svg", words.join("_"))
}

/// The Commons file page for an attribution, shown as the source link.
pub fn commons_file_page(attribution: &str) -> String {
    format!("{COMMONS_FILE_PAGE_BASE}{attribution}")
}

/// Shape of the stage-1 response, `query.pages.{pageid}`. The response keys
/// pages by pageid; a query for one title yields one page.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    pages: Option<BTreeMap<String, Page>>,
}

#[derive(Debug, Deserialize)]
struct Page {
    thumbnail: Option<Thumbnail>,
    pageimage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    source: Option<String>,
}

impl QueryResponse {
    fn into_descriptor(self) -> Option<FlagDescriptor> {
        let page = self.query?.pages?.into_values().next()?;
        Some(FlagDescriptor {
            thumbnail_url: page.thumbnail?.source?,
            filename: page.pageimage?,
        })
    }
}
