//! `reqwest`-backed [`Fetcher`].

use super::{FetchOutcome, FetchRequest, Fetcher, Method};
use crate::error::FetchFailure;
use crate::{CdsError, CdsResult};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::CONTENT_ENCODING;
use std::io::Read;
use std::time::Duration;

/// Production fetcher. Every call carries the configured timeout independently.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a new `HttpFetcher`.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::HttpClient`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> CdsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CdsError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let url = match request.to_url() {
            Ok(url) => url,
            Err(e) => {
                return FetchOutcome::Failed(FetchFailure::Transport {
                    url: request.url().to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let display_url = url.to_string();

        let method = match request.method() {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
        };
        let mut builder = self.client.request(method, url);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return FetchOutcome::Failed(FetchFailure::Transport {
                    url: display_url,
                    reason: e.to_string(),
                })
            }
        };

        let status = response.status().as_u16();
        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("gzip"));

        let raw = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return FetchOutcome::Failed(FetchFailure::BodyRead {
                    url: display_url,
                    reason: e.to_string(),
                })
            }
        };

        let body = if gzipped {
            match gunzip(&raw) {
                Ok(body) => body,
                Err(e) => {
                    return FetchOutcome::Failed(FetchFailure::Decompress {
                        url: display_url,
                        reason: e.to_string(),
                    })
                }
            }
        } else {
            raw.to_vec()
        };

        if !request.accepts_status(status) {
            return FetchOutcome::Failed(FetchFailure::Status {
                url: display_url,
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        FetchOutcome::Body(body)
    }
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
