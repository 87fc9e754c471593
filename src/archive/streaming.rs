//! ZIP archives read lazily from a local file or over HTTP.
//!
//! For a URL the backend first sends a HEAD request and picks a strategy
//! from the answer:
//!
//! 1. no `Content-Length`: give up, the archive size is unknown
//! 2. no `Accept-Ranges: bytes`: download the whole archive if it is at
//!    most [`OpenOptions::max_full_download`] bytes, otherwise give up
//! 3. otherwise read through an [`HttpRangeReader`]: the Central
//!    Directory and each entry are fetched with range requests on demand

use async_trait::async_trait;
use log::debug;
use std::path::Path;
use std::sync::Arc;

use super::table::ZipEntries;
use super::{Archive, OpenOptions, StreamAndLength, is_http_url, reopen};
use crate::error::{ArchiveError, Result};
use crate::io::{HttpRangeReader, HttpRequest, LocalFileReader, MemoryReader, ReadAt};

/// Where a [`StreamingZip`] gets its bytes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A local file kept open for the handle's lifetime
    LocalFile,
    /// A remote archive downloaded whole because Range isn't supported
    Downloaded,
    /// A remote archive read with HTTP Range requests
    RangeRequests,
}

#[derive(Clone)]
pub struct StreamingZip {
    zip: Arc<ZipEntries>,
    source: Source,
}

impl StreamingZip {
    pub async fn open(identifier: &str) -> Result<Self> {
        Self::open_with(identifier, &OpenOptions::default()).await
    }

    pub async fn open_with(identifier: &str, options: &OpenOptions) -> Result<Self> {
        if is_http_url(identifier) {
            Self::open_http(identifier, options).await
        } else {
            Self::open_local(Path::new(identifier)).await
        }
    }

    async fn open_local(path: &Path) -> Result<Self> {
        let reader: Arc<dyn ReadAt> = Arc::new(LocalFileReader::new(path)?);
        debug!("{}: opened local file ({} bytes)", path.display(), reader.size());

        let zip = ZipEntries::load(&path.to_string_lossy(), reader).await?;
        Ok(Self {
            zip: Arc::new(zip),
            source: Source::LocalFile,
        })
    }

    async fn open_http(url: &str, options: &OpenOptions) -> Result<Self> {
        let transport = options.http_transport()?;

        let head = transport.send(HttpRequest::head(url)).await?;
        if !head.is_success() {
            return Err(ArchiveError::HttpStatus {
                url: url.to_string(),
                status: head.status,
            });
        }

        let length = head
            .content_length
            .ok_or_else(|| ArchiveError::MissingContentLength {
                url: url.to_string(),
            })?;

        let (reader, source): (Arc<dyn ReadAt>, Source) = if head.accepts_byte_ranges() {
            debug!("{}: {} bytes, using Range requests", url, length);
            let reader = HttpRangeReader::new(transport, url.to_string(), length);
            (Arc::new(reader), Source::RangeRequests)
        } else {
            if length > options.max_full_download {
                return Err(ArchiveError::RangesUnsupported {
                    url: url.to_string(),
                    length,
                });
            }
            debug!("{}: {} bytes, no Range support, downloading", url, length);

            let resp = transport.send(HttpRequest::get(url)).await?;
            if !resp.is_success() {
                return Err(ArchiveError::HttpStatus {
                    url: url.to_string(),
                    status: resp.status,
                });
            }
            (Arc::new(MemoryReader::new(resp.body)), Source::Downloaded)
        };

        let zip = ZipEntries::load(url, reader).await?;
        Ok(Self {
            zip: Arc::new(zip),
            source,
        })
    }

    pub fn source(&self) -> Source {
        self.source
    }
}

#[async_trait]
impl Archive for StreamingZip {
    fn identifier(&self) -> &str {
        self.zip.identifier()
    }

    fn entry_count(&self) -> usize {
        self.zip.len()
    }

    fn has_entries(&self) -> bool {
        self.entry_count() > 0
    }

    async fn has_entry(&self, path: &str) -> bool {
        self.zip.contains(path)
    }

    async fn list_entries(&self) -> Result<Vec<String>> {
        Ok(self.zip.paths())
    }

    async fn open_entry_stream(&self, path: &str) -> Result<StreamAndLength> {
        let (data, length) = self.zip.read(path).await?;
        Ok(StreamAndLength::new(
            Box::new(std::io::Cursor::new(data)),
            length,
            reopen(self, path),
        ))
    }

    fn release(&self) {
        self.zip.release();
    }
}
