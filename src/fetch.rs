use std::time::Duration;

use reqwest::header::ACCEPT;
use serde_json::Value;

use crate::{error::FetchError, metrics::Metrics};

mod data;
pub use data::{ItemsPage, PagedResponse};

/// What a paginated fetch does when one of its pages fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageMode {
    #[default]
    /// Stop and keep the pages loaded so far
    Lenient,
    /// Abort the whole listing with the page's error
    Strict,
}

#[derive(Debug, Clone)]
pub struct Client {
    req_client: reqwest::Client,
    metrics: Metrics,
}

impl Client {
    pub fn new(timeout: Duration, metrics: Metrics) -> Result<Self, reqwest::Error> {
        let req_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self::with_client(req_client, metrics))
    }

    pub fn with_client(req_client: reqwest::Client, metrics: Metrics) -> Self {
        Self {
            req_client,
            metrics,
        }
    }

    /// Loads a single JSON document
    #[tracing::instrument(skip(self))]
    pub async fn fetch_json(&self, resource: &str, url: &str) -> Result<Value, FetchError> {
        let result = self.load(url).await;
        self.metrics.upstream(resource, result.is_ok());
        result
    }

    async fn load(&self, url: &str) -> Result<Value, FetchError> {
        let resp = self
            .req_client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(FetchError::Request)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body: Value = resp.json().await.map_err(FetchError::Decode)?;

        if let Some(errors) = data::embedded_errors(&body) {
            return Err(FetchError::Upstream(errors.clone()));
        }

        Ok(body)
    }

    /// Like [`Client::fetch_json`] but every failure is logged and turned into `None`
    pub async fn safe_fetch(&self, resource: &str, url: &str) -> Option<Value> {
        match self.fetch_json(resource, url).await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!(resource, url, "HTTP GET failed: {}", e);
                None
            }
        }
    }

    /// Follows `nextPageCursor` until it runs out, a page has no `data` array
    /// or `max_pages` pages have been loaded, concatenating the items of every
    /// page in order.
    ///
    /// A failed first page is always an error. In lenient mode a later failed
    /// page ends the listing early and marks it incomplete.
    #[tracing::instrument(skip(self, build_url))]
    pub async fn fetch_listing<F>(
        &self,
        resource: &str,
        build_url: F,
        mode: PageMode,
        max_pages: usize,
    ) -> Result<Listing, FetchError>
    where
        F: Fn(&str) -> Result<String, FetchError>,
    {
        let mut items = Vec::new();
        let mut cursor = String::new();

        for page_num in 0..max_pages {
            let loaded = match build_url(&cursor) {
                Ok(url) => self.fetch_json(resource, &url).await,
                Err(e) => Err(e),
            };

            let body = match loaded {
                Ok(b) => b,
                Err(e) if mode == PageMode::Strict || page_num == 0 => {
                    tracing::error!(page_num, "Loading page {}", e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(page_num, "Loading page {}, keeping {} items", e, items.len());
                    return Ok(Listing {
                        items,
                        complete: false,
                    });
                }
            };

            let page: ItemsPage = match serde_json::from_value(body) {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(page_num, "Not a page ({:?}), stopping", e);
                    return Ok(Listing {
                        items,
                        complete: true,
                    });
                }
            };
            self.metrics.page(resource);

            let next = page.next_cursor().map(str::to_owned);
            items.extend(page.data);

            match next {
                Some(c) => cursor = c,
                None => {
                    return Ok(Listing {
                        items,
                        complete: true,
                    })
                }
            }
        }

        tracing::warn!(max_pages, "Reached page limit with cursor {:?}", cursor);
        Ok(Listing {
            items,
            complete: false,
        })
    }

    /// The items of [`Client::fetch_listing`], for callers that do not care
    /// whether the listing ended early
    pub async fn fetch_paged<F>(
        &self,
        resource: &str,
        build_url: F,
        mode: PageMode,
        max_pages: usize,
    ) -> Result<Vec<Value>, FetchError>
    where
        F: Fn(&str) -> Result<String, FetchError>,
    {
        let listing = self
            .fetch_listing(resource, build_url, mode, max_pages)
            .await?;
        Ok(listing.items)
    }
}

/// Items of a paginated resource. `complete` is false when the listing was
/// cut short by a failed page or the page limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub items: Vec<Value>,
    pub complete: bool,
}

/// Appends the cursor as a `cursor` query parameter, leaving the url alone
/// for the first page
pub fn with_cursor(url: &str, cursor: &str) -> Result<String, FetchError> {
    if cursor.is_empty() {
        return Ok(url.to_string());
    }

    let mut parsed =
        reqwest::Url::parse(url).map_err(|e| FetchError::Url(format!("{url:?}: {e}")))?;
    parsed.query_pairs_mut().append_pair("cursor", cursor);
    Ok(parsed.into())
}
