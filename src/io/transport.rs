//! The HTTP seam every remote backend goes through.
//!
//! Backends never talk to `reqwest` directly: they build an [`HttpRequest`]
//! and hand it to an [`HttpTransport`]. [`ReqwestTransport`] is the
//! production implementation; tests substitute a recording fake.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use std::time::Duration;

use crate::error::Result;

/// Client-level timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Head,
    Get,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Inclusive byte range, sent as `Range: bytes=start-end`
    pub range: Option<(u64, u64)>,
}

impl HttpRequest {
    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            url: url.into(),
            range: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            range: None,
        }
    }

    pub fn get_range(url: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            range: Some((start, end)),
        }
    }
}

/// The parts of a response the backends look at
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed `Content-Length` header, not the body length
    pub content_length: Option<u64>,
    /// Every `Accept-Ranges` header value, unsplit
    pub accept_ranges: Vec<String>,
    /// Empty for HEAD requests and unsuccessful responses
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the server advertised byte-range support.
    ///
    /// Some servers repeat the header or send a comma-separated list,
    /// so every token of every value is checked.
    pub fn accepts_byte_ranges(&self) -> bool {
        self.accept_ranges
            .iter()
            .flat_map(|value| value.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("bytes"))
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Head => self.client.head(&request.url),
            Method::Get => self.client.get(&request.url),
        };
        if let Some((start, end)) = request.range {
            builder = builder.header(RANGE, format!("bytes={}-{}", start, end));
        }

        let resp = builder.send().await?;

        let status = resp.status().as_u16();
        let content_length = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());
        let accept_ranges = resp
            .headers()
            .get_all(ACCEPT_RANGES)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect();

        let body = if request.method == Method::Get && resp.status().is_success() {
            resp.bytes().await?.to_vec()
        } else {
            Vec::new()
        };

        Ok(HttpResponse {
            status,
            content_length,
            accept_ranges,
            body,
        })
    }
}
