//! HTTP adapter for an external SDG classification service.
//!
//! Each text is POSTed as `{"text": ..., "config": {...}}`. The service
//! replies either with the SDG numbers directly, `{"sdgs": [4, 12]}`, or
//! with the free-text answer of a language model, `{"content": "..."}`,
//! from which the numbers are extracted with [`parse_sdgs`]. An optional
//! API key is sent as a bearer token.
//!
//! With a [`CallCache`] attached, every request is memoized by its text and
//! config, so re-running a benchmark only pays for texts it has not seen.
//!
//! # Examples
//!
//! ```no_run
//! use sdg_benchmark::{ApiClassifier, Classifier, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let classifier = ApiClassifier::new(
//!     "http://localhost:8080/classify",
//!     None,
//!     Config::new([("model", "small")]),
//! )?;
//! let sdgs = classifier.classify("Access to clean water")?;
//! assert!(sdgs.iter().all(|sdg| (1..=17).contains(sdg)));
//! # Ok(())
//! # }
//! ```

use crate::benchmark::{Classifier, parse_sdgs};
use crate::cache::{CacheError, CachedCallError, CallCache};
use crate::config::Config;
use crate::stats::SDG_COUNT;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Error returned by [`ApiClassifier`].
#[derive(Debug, Error)]
pub enum ApiClassifierError {
    /// Input text was blank.
    #[error("empty input")]
    Empty,
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response was neither an SDG list nor a text answer, or named an SDG
    /// out of range.
    #[error("invalid response")]
    InvalidResponse,
    /// The call cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl PartialEq for ApiClassifierError {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Empty, Self::Empty)
                | (Self::InvalidResponse, Self::InvalidResponse)
                | (Self::Request(_), Self::Request(_))
                | (Self::Cache(_), Self::Cache(_))
        )
    }
}

impl Eq for ApiClassifierError {}

#[derive(Serialize)]
struct ApiRequest {
    text: String,
    config: Config,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApiResponse {
    Sdgs { sdgs: Vec<u8> },
    Content { content: String },
}

/// Classifier backed by an HTTP service.
#[derive(Debug, Clone)]
pub struct ApiClassifier {
    client: Client,
    url: String,
    api_key: Option<String>,
    config: Config,
    cache: Option<CallCache>,
}

impl ApiClassifier {
    /// Create a classifier for `url` that sends `config` with every text.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClassifierError::Request`] if the HTTP client cannot be
    /// built.
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        config: Config,
    ) -> Result<Self, ApiClassifierError> {
        let client = Client::builder().timeout(TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
            config,
            cache: None,
        })
    }

    /// Memoize requests in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: CallCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn request(&self, body: &ApiRequest) -> Result<Vec<u8>, ApiClassifierError> {
        let mut req = self.client.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send()?.error_for_status()?;
        let api: ApiResponse = resp
            .json()
            .map_err(|_| ApiClassifierError::InvalidResponse)?;
        match api {
            ApiResponse::Sdgs { sdgs } => {
                if sdgs.iter().all(|sdg| (1..=SDG_COUNT).contains(sdg)) {
                    Ok(sdgs)
                } else {
                    Err(ApiClassifierError::InvalidResponse)
                }
            }
            ApiResponse::Content { content } => Ok(parse_sdgs(&content)),
        }
    }
}

impl Classifier for ApiClassifier {
    type Error = ApiClassifierError;

    fn classify(&self, text: &str) -> Result<Vec<u8>, Self::Error> {
        if text.trim().is_empty() {
            return Err(ApiClassifierError::Empty);
        }
        let body = ApiRequest {
            text: text.to_owned(),
            config: self.config.clone(),
        };
        let Some(cache) = &self.cache else {
            return self.request(&body);
        };
        cache
            .memoize("classify", |body: &ApiRequest| self.request(body))
            .call(&body)
            .map_err(|err| match err {
                CachedCallError::Call(err) => err,
                CachedCallError::Cache(err) => ApiClassifierError::Cache(err),
            })
    }
}
