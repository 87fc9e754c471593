//! Error types and the related `Result<T>`

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The requested path is not an entry of the archive
    #[error("No such entry in archive: {0}")]
    NotFound(String),

    /// A request completed with a status other than the expected 2xx
    #[error("HTTP request to {url} failed with status: {status}")]
    HttpStatus { url: String, status: u16 },

    /// The HTTP client failed before a response was received
    #[error("Network error")]
    Network(#[from] reqwest::Error),

    /// A remote archive cannot be opened without knowing its total size
    #[error("Remote server did not return Content-Length for {url}")]
    MissingContentLength { url: String },

    /// No Range support and the archive is too large to download whole
    #[error("Remote server does not support Range requests, {url} is too large to download ({length} bytes)")]
    RangesUnsupported { url: String, length: u64 },

    /// Exploded archives served over HTTP cannot be enumerated
    #[error("Listing entries is not supported by this archive")]
    ListingUnsupported,

    /// The ZIP archive contained invalid data
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// The ZIP archive uses an unsupported feature
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// Decoded entry content did not match its recorded CRC-32
    #[error("Checksum mismatch for entry {name}")]
    ChecksumMismatch { name: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The archive handle was released
    #[error("Archive has been released")]
    Released,

    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// Reading or writing a package during injection failed
    #[error("Zip archive error")]
    Zip(#[from] zip::result::ZipError),

    #[error("Directory walk failed")]
    Walk(#[from] walkdir::Error),

    #[error("Background task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl ArchiveError {
    /// True for errors that mean "the entry isn't there", as opposed to
    /// a failure while looking.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArchiveError::NotFound(_))
    }
}
