//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory in one request
//! 4. Hand out its entries one at a time through an [`EntryCursor`]
//! 5. For extraction, read each file's Local File Header and data
//!
//! Listing a remote archive therefore costs a handful of range requests
//! against the tail of the file, and reading an entry costs two more.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use log::trace;
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Upper bound on buffer pre-allocation from sizes claimed by the archive.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Low-level ZIP file parser.
///
/// Generic over the reader type so the same code serves local files,
/// in-memory downloads and HTTP range readers.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let mut cursor = parser.entries().await?;
/// while let Some(entry) = cursor.next_entry()? {
///     let data = parser.read_entry(&entry).await?;
/// }
/// ```
pub struct ZipParser<R: ReadAt + ?Sized> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt + ?Sized> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its offset in the file. Handles archives
    /// with a trailing comment by searching backwards for the signature.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        // First try the common case where there's no comment
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf).await?;

            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        // Search backwards for PK\x05\x06 whose comment length reaches exactly to EOF
        for i in (0..buf.len().saturating_sub(EndOfCentralDirectory::SIZE)).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(ArchiveError::InvalidArchive("Not a valid ZIP file"))
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD has fields saturated to 0xFFFF/0xFFFFFFFF.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The locator sits immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or(ArchiveError::InvalidArchive("Missing ZIP64 locator"))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Start a fresh pass over the archive's entries.
    ///
    /// Fetches the whole Central Directory in one read (a single range
    /// request over HTTP). Each call returns an independent cursor
    /// positioned at the first entry.
    pub async fn entries(&self) -> Result<EntryCursor> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.checked_add(cd_size).is_none_or(|end| end > self.size) {
            return Err(ArchiveError::InvalidArchive(
                "Central Directory extends past end of file",
            ));
        }
        trace!(
            "central directory: {} entries, {} bytes at {}",
            total_entries, cd_size, cd_offset
        );

        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        Ok(EntryCursor {
            cursor: Cursor::new(cd_data),
            remaining: total_entries,
        })
    }

    /// List every entry, directories included
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let mut cursor = self.entries().await?;
        let mut entries = Vec::new();
        while let Some(entry) = cursor.next_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header's name and extra field may differ in length
    /// from the Central Directory's, so the LFH itself has to be read.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(entry.lfh_offset, &mut lfh_buf)
            .await?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(ArchiveError::InvalidArchive("Invalid Local File Header"));
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        Ok(entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    /// Read and decompress an entry's content, verifying its CRC-32
    pub async fn read_entry(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        if entry.is_encrypted() {
            return Err(ArchiveError::UnsupportedArchive(format!(
                "{} is encrypted",
                entry.file_name
            )));
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            return Err(ArchiveError::UnsupportedArchive(format!(
                "compression method {} used by {}",
                method, entry.file_name
            )));
        }

        let data_offset = self.get_data_offset(entry).await?;
        if data_offset
            .checked_add(entry.compressed_size)
            .is_none_or(|end| end > self.size)
        {
            return Err(ArchiveError::InvalidArchive(
                "Entry data extends past end of file",
            ));
        }

        let compressed_len = usize::try_from(entry.compressed_size).map_err(|_| {
            ArchiveError::UnsupportedArchive(format!("{} is too large", entry.file_name))
        })?;
        let mut compressed = vec![0u8; compressed_len];
        self.reader
            .read_exact_at(data_offset, &mut compressed)
            .await?;

        decode_entry(entry, compressed)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Decompress raw entry data and check it against the Central Directory
fn decode_entry(entry: &ZipFileEntry, compressed: Vec<u8>) -> Result<Vec<u8>> {
    let data = match entry.compression_method {
        CompressionMethod::Stored => compressed,
        CompressionMethod::Deflate => {
            let mut out = Vec::with_capacity(entry.uncompressed_size.min(MAX_PREALLOC) as usize);
            // One byte past the declared size is enough to prove it wrong
            DeflateDecoder::new(&compressed[..])
                .take(entry.uncompressed_size.saturating_add(1))
                .read_to_end(&mut out)?;
            out
        }
        CompressionMethod::Unknown(method) => {
            return Err(ArchiveError::UnsupportedArchive(format!(
                "compression method {}",
                method
            )));
        }
    };

    if data.len() as u64 != entry.uncompressed_size {
        return Err(ArchiveError::InvalidArchive(
            "Entry size does not match Central Directory",
        ));
    }
    if crc32fast::hash(&data) != entry.crc32 {
        return Err(ArchiveError::ChecksumMismatch {
            name: entry.file_name.clone(),
        });
    }
    Ok(data)
}

/// Forward-only walk over a Central Directory.
///
/// Entries surface one per [`next_entry`](Self::next_entry) call, which
/// borrows the cursor mutably: the next pull cannot start until the caller
/// is done with the previous one. Restart by asking the parser for a new
/// cursor.
pub struct EntryCursor {
    cursor: Cursor<Vec<u8>>,
    remaining: u64,
}

impl EntryCursor {
    /// Entries not yet pulled
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Pull the next entry, or `None` once the directory is exhausted
    pub fn next_entry(&mut self) -> Result<Option<ZipFileEntry>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match parse_cdfh(&mut self.cursor) {
            Ok(entry) => {
                self.remaining -= 1;
                Ok(Some(entry))
            }
            Err(ArchiveError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.remaining = 0;
                Err(ArchiveError::InvalidArchive("Truncated Central Directory"))
            }
            Err(e) => {
                self.remaining = 0;
                Err(e)
            }
        }
    }
}

/// Parse a Central Directory File Header from a cursor.
fn parse_cdfh(cursor: &mut Cursor<Vec<u8>>) -> Result<ZipFileEntry> {
    // Read and verify the signature (PK\x01\x02)
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        return Err(ArchiveError::InvalidArchive(
            "Invalid Central Directory File Header",
        ));
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut file_name_raw = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_raw)?;
    let file_name = decode_file_name(&file_name_raw, flags)?;

    // Directory entries end with '/'
    let is_directory = file_name.ends_with('/');

    let mut extra_bytes = vec![0u8; extra_field_length as usize];
    cursor.read_exact(&mut extra_bytes)?;
    let mut extra = Cursor::new(&extra_bytes[..]);

    while extra.position() + 4 <= extra_field_length as u64 {
        let header_id = extra.read_u16::<LittleEndian>()?;
        let field_size = extra.read_u16::<LittleEndian>()? as u64;
        let field_end = extra.position() + field_size;

        // ZIP64 extended information: a value is present only when the
        // corresponding header field is saturated
        if header_id == 0x0001 {
            if uncompressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                uncompressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                compressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                lfh_offset = extra.read_u64::<LittleEndian>()?;
            }
        }
        extra.set_position(field_end);
    }

    // Skip over the file comment (we don't use it)
    let mut comment = vec![0u8; file_comment_length as usize];
    cursor.read_exact(&mut comment)?;

    Ok(ZipFileEntry {
        file_name,
        file_name_raw,
        flags,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        last_mod_time,
        last_mod_date,
        is_directory,
    })
}
