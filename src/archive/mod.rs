//! One read interface over every way a package can be stored.
//!
//! | Backend | Identifier | Listing |
//! |---|---|---|
//! | [`ExplodedDir`] | local directory | walked on every call |
//! | [`ExplodedHttp`] | base URL ending in `/` | unsupported |
//! | [`BufferedZip`] | local ZIP, read whole into memory | fixed at open |
//! | [`StreamingZip`] | local ZIP or ZIP URL | fixed at open |
//!
//! [`open_archive`] picks a backend from the identifier alone.

mod buffered;
mod exploded;
mod exploded_http;
mod streaming;
mod table;

pub use buffered::BufferedZip;
pub use exploded::ExplodedDir;
pub use exploded_http::ExplodedHttp;
pub use streaming::{Source, StreamingZip};

use async_trait::async_trait;
use log::debug;
use std::fmt;
use std::future::Future;
use std::path::{Component, Path};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ArchiveError, Result};
use crate::io::{DEFAULT_TIMEOUT, HttpTransport, ReqwestTransport};

/// Largest remote archive downloaded whole when the server has no Range support
pub const MAX_FULL_DOWNLOAD: u64 = 2 * 1024 * 1024;

/// Byte stream over one entry's content
pub type EntryStream = Box<dyn AsyncRead + Send + Unpin>;

pub type ResetFuture = Pin<Box<dyn Future<Output = Result<StreamAndLength>> + Send>>;

/// Produces a fresh, independent stream over the same entry
pub type ResetFn = Arc<dyn Fn() -> ResetFuture + Send + Sync>;

/// An opened entry: its stream, its length, and a way to start over.
///
/// The stream itself is single-use. Call [`reset`](Self::reset) to get a
/// new one; it does not depend on how much of this one was consumed.
pub struct StreamAndLength {
    pub stream: EntryStream,
    /// Uncompressed length in bytes, 0 when the backend can't tell
    pub length: u64,
    reset: ResetFn,
}

impl StreamAndLength {
    pub fn new(stream: EntryStream, length: u64, reset: ResetFn) -> Self {
        Self {
            stream,
            length,
            reset,
        }
    }

    /// Wrap fully materialized content
    pub fn from_bytes(data: Vec<u8>, reset: ResetFn) -> Self {
        let length = data.len() as u64;
        Self::new(Box::new(std::io::Cursor::new(data)), length, reset)
    }

    pub async fn reset(&self) -> Result<StreamAndLength> {
        (self.reset)().await
    }

    /// Drain the stream into memory
    pub async fn read_to_vec(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.length as usize);
        self.stream.read_to_end(&mut data).await?;
        Ok(data)
    }
}

impl fmt::Debug for StreamAndLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamAndLength")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Read access to the entries of a package.
///
/// Entry paths are relative, `/`-separated and case-sensitive. Directories
/// are never entries.
///
/// The directory-based backends ([`ExplodedDir`], [`ExplodedHttp`]) don't
/// enumerate up front: their `entry_count()` is always 0 and
/// `has_entries()` is always true. Don't use either as a live count for
/// those backends.
#[async_trait]
pub trait Archive: Send + Sync {
    /// The path or URL this handle was opened on
    fn identifier(&self) -> &str;

    fn entry_count(&self) -> usize;

    fn has_entries(&self) -> bool;

    async fn has_entry(&self, path: &str) -> bool;

    async fn list_entries(&self) -> Result<Vec<String>>;

    /// Open an entry for reading; [`ArchiveError::NotFound`] if absent
    async fn open_entry_stream(&self, path: &str) -> Result<StreamAndLength>;

    /// Close file descriptors and network readers. Idempotent.
    ///
    /// Streams already handed out stay readable.
    fn release(&self);
}

/// Reset capability that reopens `path` on a clone of `archive`
pub(crate) fn reopen<A>(archive: &A, path: &str) -> ResetFn
where
    A: Archive + Clone + 'static,
{
    let archive = archive.clone();
    let path = path.to_string();
    Arc::new(move || -> ResetFuture {
        let archive = archive.clone();
        let path = path.clone();
        Box::pin(async move { archive.open_entry_stream(&path).await })
    })
}

/// A resource owned by a handle until `release()`
pub(crate) struct Held<T: ?Sized>(Mutex<Option<Arc<T>>>);

impl<T: ?Sized> Held<T> {
    pub(crate) fn new(value: Arc<T>) -> Self {
        Self(Mutex::new(Some(value)))
    }

    pub(crate) fn get(&self) -> Result<Arc<T>> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ArchiveError::Released)
    }

    /// Drop the resource; false if it was already gone
    pub(crate) fn release(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }
}

/// Entry paths must stay inside the package: no roots, no `..`
pub(crate) fn is_safe_entry_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// URL schemes are case-insensitive
pub fn is_http_url(identifier: &str) -> bool {
    let has_scheme = |scheme: &str| {
        identifier
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    };
    has_scheme("http://") || has_scheme("https://")
}

/// Knobs for opening archives
#[derive(Clone)]
pub struct OpenOptions {
    /// See [`MAX_FULL_DOWNLOAD`]
    pub max_full_download: u64,
    /// HTTP client timeout, ignored when a transport is supplied
    pub timeout: Duration,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            max_full_download: MAX_FULL_DOWNLOAD,
            timeout: DEFAULT_TIMEOUT,
            transport: None,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_full_download(mut self, bytes: u64) -> Self {
        self.max_full_download = bytes;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send HTTP requests through `transport` instead of a new `reqwest` client
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub(crate) fn http_transport(&self) -> Result<Arc<dyn HttpTransport>> {
        match &self.transport {
            Some(transport) => Ok(Arc::clone(transport)),
            None => Ok(Arc::new(ReqwestTransport::with_timeout(self.timeout)?)),
        }
    }
}

/// Any of the backends, behind the same [`Archive`] interface
#[derive(Clone)]
pub enum AnyArchive {
    Exploded(ExplodedDir),
    ExplodedHttp(ExplodedHttp),
    Buffered(BufferedZip),
    Streaming(StreamingZip),
}

impl AnyArchive {
    fn inner(&self) -> &dyn Archive {
        match self {
            AnyArchive::Exploded(a) => a,
            AnyArchive::ExplodedHttp(a) => a,
            AnyArchive::Buffered(a) => a,
            AnyArchive::Streaming(a) => a,
        }
    }
}

#[async_trait]
impl Archive for AnyArchive {
    fn identifier(&self) -> &str {
        self.inner().identifier()
    }

    fn entry_count(&self) -> usize {
        self.inner().entry_count()
    }

    fn has_entries(&self) -> bool {
        self.inner().has_entries()
    }

    async fn has_entry(&self, path: &str) -> bool {
        self.inner().has_entry(path).await
    }

    async fn list_entries(&self) -> Result<Vec<String>> {
        self.inner().list_entries().await
    }

    async fn open_entry_stream(&self, path: &str) -> Result<StreamAndLength> {
        self.inner().open_entry_stream(path).await
    }

    fn release(&self) {
        self.inner().release()
    }
}

/// Open whatever `identifier` points at.
///
/// - URL ending in `/`: exploded tree over HTTP
/// - other URL: streaming ZIP over HTTP
/// - local directory: exploded tree
/// - anything else: streaming ZIP over a local file
///
/// [`BufferedZip`] is never chosen here; open it directly.
pub async fn open_archive(identifier: &str, options: &OpenOptions) -> Result<AnyArchive> {
    if is_http_url(identifier) {
        if identifier.ends_with('/') {
            debug!("{}: exploded over HTTP", identifier);
            let archive = ExplodedHttp::open_with(identifier, options.http_transport()?)?;
            return Ok(AnyArchive::ExplodedHttp(archive));
        }
        let archive = StreamingZip::open_with(identifier, options).await?;
        return Ok(AnyArchive::Streaming(archive));
    }

    let is_dir = tokio::fs::metadata(identifier)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir {
        Ok(AnyArchive::Exploded(ExplodedDir::open(identifier).await?))
    } else {
        Ok(AnyArchive::Streaming(
            StreamingZip::open_with(identifier, options).await?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_path_safety() {
        assert!(is_safe_entry_path("mimetype"));
        assert!(is_safe_entry_path("OEBPS/content.opf"));
        assert!(is_safe_entry_path("./META-INF/container.xml"));
        assert!(!is_safe_entry_path(""));
        assert!(!is_safe_entry_path("/etc/passwd"));
        assert!(!is_safe_entry_path("../outside"));
        assert!(!is_safe_entry_path("OEBPS/../../outside"));
    }

    #[test]
    fn http_sniffing() {
        assert!(is_http_url("http://example.com/book.epub"));
        assert!(is_http_url("https://example.com/book/"));
        assert!(!is_http_url("/tmp/book.epub"));
        assert!(!is_http_url("ftp://example.com/book.epub"));
        assert!(is_http_url("HTTP://example.com/book.epub"));
        assert!(is_http_url("Https://example.com/book/"));
        assert!(!is_http_url("http:/"));
        assert!(!is_http_url("\u{e9}\u{e9}\u{e9}\u{e9}://"));
    }

    #[test]
    fn held_release_is_idempotent() {
        let held = Held::new(Arc::new(5));
        assert_eq!(*held.get().unwrap(), 5);
        assert!(held.release());
        assert!(!held.release());
        assert!(matches!(held.get(), Err(ArchiveError::Released)));
    }

    #[tokio::test]
    async fn reset_produces_a_fresh_stream() {
        let exhausted: ResetFn = Arc::new(|| -> ResetFuture {
            Box::pin(async { Err(ArchiveError::Released) })
        });
        let reset: ResetFn = Arc::new(move || -> ResetFuture {
            let exhausted = Arc::clone(&exhausted);
            Box::pin(async move { Ok(StreamAndLength::from_bytes(b"again".to_vec(), exhausted)) })
        });
        let opened = StreamAndLength::from_bytes(b"again".to_vec(), reset);
        let again = opened.reset().await.unwrap();
        assert_eq!(opened.read_to_vec().await.unwrap(), b"again");
        assert_eq!(again.read_to_vec().await.unwrap(), b"again");
    }
}
