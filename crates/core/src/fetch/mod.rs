//! Outbound fetches.
//!
//! A [`FetchRequest`] describes one call to the upstream record system and is immutable once
//! built. A [`Fetcher`] performs it and always answers with a [`FetchOutcome`], never an error:
//! failures are data that the owning batch collects (see [`orchestrator`]).
//!
//! ## Submodules
//!
//! - [`http`]: the `reqwest` implementation used in production
//! - [`group`]: structured task groups over `tokio::task::JoinSet`
//! - [`orchestrator`]: drain-then-fail batches that merge into the aggregate store
//! - [`requests`]: request shapes for each resource category

pub mod group;
pub mod http;
pub mod orchestrator;
pub mod requests;

use crate::error::FetchFailure;
use crate::planner::DateWindow;
use async_trait::async_trait;
use url::Url;

/// HTTP method of an outbound call. Everything is a read except write-back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
}

/// One outbound call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    required_status: Option<u16>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            required_status: None,
        }
    }

    pub fn put(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Put,
            body: Some(body),
            ..Self::get(url)
        }
    }

    /// Append a query parameter. Repeated keys are kept in order.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append the `ge`/`le` date parameters of `window`.
    pub fn with_window(mut self, window: &DateWindow) -> Self {
        self.query.extend(window.query_params());
        self
    }

    pub fn with_headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend_from_slice(headers);
        self
    }

    /// Accept only this exact status as success. By default any status below 400 succeeds.
    pub fn require_status(mut self, status: u16) -> Self {
        self.required_status = Some(status);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// All values of query parameter `key`, in order.
    pub fn param_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True if `status` counts as success for this request.
    pub fn accepts_status(&self, status: u16) -> bool {
        match self.required_status {
            Some(required) => status == required,
            None => status < 400,
        }
    }

    /// Full URL including the encoded query string.
    ///
    /// # Errors
    ///
    /// Returns a [`url::ParseError`] if the base URL is not absolute.
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        if self.query.is_empty() {
            Url::parse(&self.url)
        } else {
            Url::parse_with_params(&self.url, &self.query)
        }
    }
}

/// Result of one outbound call: a response body or a failure reason, never both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Body(Vec<u8>),
    Failed(FetchFailure),
}

/// Performs outbound calls.
///
/// Implementations must not panic on network errors; every problem is reported as
/// [`FetchOutcome::Failed`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome;
}

/// Standard headers for calls to the upstream FHIR server.
pub fn fhir_headers(access_token: &str) -> Vec<(String, String)> {
    vec![
        ("Authorization".into(), format!("Bearer {access_token}")),
        ("Accept".into(), "application/json".into()),
        ("Accept-Encoding".into(), "gzip".into()),
        ("Content-Type".into(), "application/json".into()),
    ]
}
