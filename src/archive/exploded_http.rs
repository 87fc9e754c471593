use async_trait::async_trait;
use log::debug;
use reqwest::Url;
use std::sync::Arc;

use super::{Archive, Held, OpenOptions, StreamAndLength, is_safe_entry_path, reopen};
use crate::error::{ArchiveError, Result};
use crate::io::{HttpRequest, HttpTransport};

/// An exploded package served over HTTP.
///
/// Entry `p` lives at the base URL with `p` appended to its path, so the
/// base should end with `/`. HTTP has no directory listing, so neither
/// does this backend.
#[derive(Clone)]
pub struct ExplodedHttp {
    inner: Arc<Inner>,
}

struct Inner {
    identifier: String,
    base: Url,
    transport: Held<dyn HttpTransport>,
}

impl ExplodedHttp {
    /// Bind to `base_url`. No request is made; only the URL is checked.
    pub fn open(base_url: &str) -> Result<Self> {
        Self::open_with(base_url, OpenOptions::default().http_transport()?)
    }

    pub fn open_with(base_url: &str, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ArchiveError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ArchiveError::InvalidUrl(base_url.to_string()));
        }
        debug!("{}: opened exploded package over HTTP", base_url);

        Ok(Self {
            inner: Arc::new(Inner {
                identifier: base_url.to_string(),
                base,
                transport: Held::new(transport),
            }),
        })
    }

    fn entry_url(&self, path: &str) -> Option<String> {
        if !is_safe_entry_path(path) {
            return None;
        }
        let mut url = self.inner.base.clone();
        let joined = format!("{}{}", url.path(), path);
        url.set_path(&joined);
        Some(url.into())
    }
}

#[async_trait]
impl Archive for ExplodedHttp {
    fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    /// Always 0, see [`Archive`]
    fn entry_count(&self) -> usize {
        0
    }

    /// Always true, see [`Archive`]
    fn has_entries(&self) -> bool {
        true
    }

    /// HEAD the entry's URL. Any failure, including an unreachable
    /// server, reads as "absent".
    async fn has_entry(&self, path: &str) -> bool {
        let Some(url) = self.entry_url(path) else {
            return false;
        };
        let Ok(transport) = self.inner.transport.get() else {
            return false;
        };

        match transport.send(HttpRequest::head(&url)).await {
            Ok(resp) if resp.is_success() => true,
            Ok(resp) => {
                debug!("HEAD {}: status {}", url, resp.status);
                false
            }
            Err(e) => {
                debug!("HEAD {}: {}", url, e);
                false
            }
        }
    }

    async fn list_entries(&self) -> Result<Vec<String>> {
        Err(ArchiveError::ListingUnsupported)
    }

    async fn open_entry_stream(&self, path: &str) -> Result<StreamAndLength> {
        let url = self
            .entry_url(path)
            .ok_or_else(|| ArchiveError::NotFound(path.to_string()))?;
        let transport = self.inner.transport.get()?;

        let resp = transport.send(HttpRequest::get(&url)).await?;
        if !resp.is_success() {
            return Err(ArchiveError::HttpStatus {
                url,
                status: resp.status,
            });
        }

        Ok(StreamAndLength::new(
            Box::new(std::io::Cursor::new(resp.body)),
            resp.content_length.unwrap_or(0),
            reopen(self, path),
        ))
    }

    fn release(&self) {
        if self.inner.transport.release() {
            debug!("{}: released", self.inner.identifier);
        }
    }
}
