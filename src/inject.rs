//! Replace (or add) one entry of a ZIP package.
//!
//! The whole archive is re-serialized: every entry of the source except
//! the target is copied under the same name, then the new content is
//! appended. The result only reaches `final_path` once it is complete,
//! through a rename, and the source is only ever read.

use chrono::Local;
use log::{debug, trace};
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::{ArchiveError, Result};
use crate::zip::dos_timestamp;

/// The one entry that must stay uncompressed (EPUB, ODF and friends
/// require it to be readable without inflating)
pub const MIMETYPE: &str = "mimetype";

/// New content for the injected entry
pub enum InjectContent {
    File(PathBuf),
    Buffer(Vec<u8>),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl InjectContent {
    async fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            InjectContent::File(path) => Ok(tokio::fs::read(path).await?),
            InjectContent::Buffer(data) => Ok(data),
            InjectContent::Stream(mut stream) => {
                let mut data = Vec::new();
                stream.read_to_end(&mut data).await?;
                Ok(data)
            }
        }
    }
}

impl fmt::Debug for InjectContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectContent::File(path) => f.debug_tuple("File").field(path).finish(),
            InjectContent::Buffer(data) => write!(f, "Buffer({} bytes)", data.len()),
            InjectContent::Stream(_) => f.write_str("Stream"),
        }
    }
}

type ArchiveBuffer = ZipWriter<Cursor<Vec<u8>>>;

fn method_for(name: &str) -> CompressionMethod {
    if name == MIMETYPE {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    }
}

/// Copy `tmp_path` to `final_path` with `entry_path` replaced by `content`.
///
/// On error `final_path` is left as it was.
pub async fn inject_entry(
    tmp_path: &Path,
    final_path: &Path,
    entry_path: &str,
    content: InjectContent,
) -> Result<()> {
    if entry_path.is_empty() || entry_path.ends_with('/') {
        return Err(ArchiveError::UnsupportedArchive(format!(
            "can't inject a file at {:?}",
            entry_path
        )));
    }
    debug!(
        "injecting {} into {} -> {}",
        entry_path,
        tmp_path.display(),
        final_path.display()
    );

    let source = tmp_path.to_path_buf();
    let target = entry_path.to_string();
    // The source is closed when this returns
    let writer = tokio::task::spawn_blocking(move || copy_entries(&source, &target)).await??;

    let data = content.into_bytes().await?;

    let final_path = final_path.to_path_buf();
    let target = entry_path.to_string();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let archive = append_and_finish(writer, &target, &data)?;
        persist(&final_path, &archive)?;
        debug!("wrote {} ({} bytes)", final_path.display(), archive.len());
        Ok(())
    })
    .await?
}

/// Every entry of `source` except directories and `target`, in order.
///
/// Each entry is fully read first, so a damaged entry fails the copy.
/// Entries already compressed the way [`method_for`] wants are copied
/// raw, as are entries whose stored name bytes the writer couldn't
/// reproduce (legacy CP437 names); the rest are recompressed.
fn copy_entries(source: &Path, target: &str) -> Result<ArchiveBuffer> {
    let mut archive = ZipArchive::new(File::open(source)?)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() || file.name() == target {
            trace!("dropping {}", file.name());
            continue;
        }

        let name = file.name().to_string();
        let size = file.size();
        let mut data = Vec::new();
        file.by_ref()
            .take(size.saturating_add(1))
            .read_to_end(&mut data)?;
        if data.len() as u64 != size {
            return Err(ArchiveError::InvalidArchive(
                "Entry size does not match Central Directory",
            ));
        }

        let method = method_for(&name);
        let same_method = file.compression() == method;
        let same_name = file.name_raw() == name.as_bytes();
        let modified = file.last_modified();
        drop(file);

        if same_method || !same_name {
            trace!("copying {} as is", name);
            writer.raw_copy_file(archive.by_index_raw(index)?)?;
        } else {
            trace!("recompressing {} as {:?}", name, method);
            let mut options = SimpleFileOptions::default().compression_method(method);
            if let Some(modified) = modified {
                options = options.last_modified_time(modified);
            }
            writer.start_file(name.as_str(), options)?;
            writer.write_all(&data)?;
        }
    }

    Ok(writer)
}

fn append_and_finish(mut writer: ArchiveBuffer, entry_path: &str, data: &[u8]) -> Result<Vec<u8>> {
    let (time, date) = dos_timestamp(Local::now().naive_local());
    let mut options = SimpleFileOptions::default().compression_method(method_for(entry_path));
    if let Ok(now) = DateTime::try_from_msdos(date, time) {
        options = options.last_modified_time(now);
    }

    writer.start_file(entry_path, options)?;
    writer.write_all(data)?;
    Ok(writer.finish()?.into_inner())
}

/// Write `archive` next to `final_path`, then rename it into place
fn persist(final_path: &Path, archive: &[u8]) -> Result<()> {
    let dir = match final_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(archive)?;
    file.as_file().sync_all()?;
    file.persist(final_path).map_err(|e| e.error)?;
    Ok(())
}

pub async fn inject_file_in_zip(
    tmp_path: &Path,
    final_path: &Path,
    file_path: &Path,
    entry_path: &str,
) -> Result<()> {
    let content = InjectContent::File(file_path.to_path_buf());
    inject_entry(tmp_path, final_path, entry_path, content).await
}

pub async fn inject_buffer_in_zip(
    tmp_path: &Path,
    final_path: &Path,
    buffer: Vec<u8>,
    entry_path: &str,
) -> Result<()> {
    inject_entry(tmp_path, final_path, entry_path, InjectContent::Buffer(buffer)).await
}

pub async fn inject_stream_in_zip(
    tmp_path: &Path,
    final_path: &Path,
    stream: Box<dyn AsyncRead + Send + Unpin>,
    entry_path: &str,
) -> Result<()> {
    inject_entry(tmp_path, final_path, entry_path, InjectContent::Stream(stream)).await
}
