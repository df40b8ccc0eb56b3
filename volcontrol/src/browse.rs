//! Page retrieval for the crawler.
//!
//! Two sources share the [`PageSource`] seam: the REST endpoint
//! `GET /api/v1/browse?uri=<locator>` ([`BrowseClient`]) and the
//! `browseLibrary` push call (implemented by the controller).

use std::time::Duration;

use tracing::{debug, warn};
use ureq::Agent;

use crate::errors::{ControlError, Result};
use crate::model::{BrowseResponse, ListItem};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches one page of items for a browse locator.
///
/// `Ok(None)` means the page could not be obtained (network failure, HTTP
/// error status, no reply in time). A page that arrived but does not decode
/// is an `Err`.
pub trait PageSource {
    fn fetch_page(&self, locator: &str) -> Result<Option<Vec<ListItem>>>;
}

impl<S: PageSource + ?Sized> PageSource for &S {
    fn fetch_page(&self, locator: &str) -> Result<Option<Vec<ListItem>>> {
        (**self).fetch_page(locator)
    }
}

/// Client of the Volumio REST browse API.
pub struct BrowseClient {
    base_url: String,
    agent: Agent,
}

impl BrowseClient {
    /// `base_url` is the device root, e.g. `http://volumio.local`.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/api/v1/browse", self.base_url)
    }

    /// Raw browse reply for `locator`.
    pub fn browse(&self, locator: &str) -> Result<BrowseResponse> {
        let url = self.endpoint();
        let mut response = self
            .agent
            .get(&url)
            .query("uri", locator)
            .call()
            .map_err(|err| ControlError::Http(format!("GET {} failed: {}", url, err)))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| ControlError::Http(format!("reading browse reply: {}", err)))?;

        if !(200..300).contains(&status) {
            return Err(ControlError::HttpStatus(
                format!("browse {}", locator),
                status,
                body,
            ));
        }

        serde_json::from_str(&body).map_err(|err| ControlError::decode("browse reply", err))
    }
}

impl PageSource for BrowseClient {
    fn fetch_page(&self, locator: &str) -> Result<Option<Vec<ListItem>>> {
        match self.browse(locator) {
            Ok(response) => {
                let items = response.into_items();
                debug!(locator, count = items.len(), "Fetched browse page");
                Ok(Some(items))
            }
            Err(err) if err.is_upstream() => {
                warn!(locator, "Browse page unavailable: {}", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
