//! # packzip
//!
//! Read ZIP-structured packages (EPUB and the like) the same way no matter
//! where they live, and rewrite one entry of a packaged ZIP.
//!
//! ## Backends
//!
//! - [`StreamingZip`]: a ZIP on local disk, or over HTTP. When the server
//!   supports Range requests only the Central Directory and the entries
//!   actually read are downloaded. Without Range support, archives up to
//!   2 MiB are downloaded whole.
//! - [`BufferedZip`]: a small local ZIP read entirely into memory.
//! - [`ExplodedDir`]: a directory tree mirroring a ZIP's entry paths.
//! - [`ExplodedHttp`]: such a tree served over HTTP.
//!
//! All implement [`Archive`]; [`open_archive`] picks one from a path or URL.
//!
//! ## Example
//!
//! ```no_run
//! use packzip::{Archive, OpenOptions, open_archive};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let book = open_archive("https://example.com/book.epub", &OpenOptions::default()).await?;
//!
//!     for path in book.list_entries().await? {
//!         println!("{}", path);
//!     }
//!
//!     let container = book.open_entry_stream("META-INF/container.xml").await?;
//!     let xml = container.read_to_vec().await?;
//!     println!("{}", String::from_utf8_lossy(&xml));
//!
//!     book.release();
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod error;
pub mod inject;
pub mod io;
pub mod zip;

pub use archive::{
    AnyArchive, Archive, BufferedZip, ExplodedDir, ExplodedHttp, MAX_FULL_DOWNLOAD, OpenOptions,
    Source, StreamAndLength, StreamingZip, open_archive,
};
pub use cli::Cli;
pub use error::{ArchiveError, Result};
pub use inject::{
    InjectContent, inject_buffer_in_zip, inject_entry, inject_file_in_zip, inject_stream_in_zip,
};
pub use io::{HttpRangeReader, HttpTransport, LocalFileReader, ReadAt, ReqwestTransport};
pub use self::zip::{ZipFileEntry, ZipParser};
