use log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;

use super::Held;
use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;
use crate::zip::{ZipFileEntry, ZipParser};

/// Entry paths in discovery order, each mapped to backend metadata.
///
/// Inserting an existing path replaces its value and keeps its position.
pub(crate) struct EntryTable<T> {
    order: Vec<String>,
    map: HashMap<String, T>,
}

impl<T> Default for EntryTable<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            map: HashMap::new(),
        }
    }
}

impl<T> EntryTable<T> {
    pub(crate) fn insert(&mut self, path: String, value: T) {
        if !self.map.contains_key(&path) {
            self.order.push(path.clone());
        }
        self.map.insert(path, value);
    }

    pub(crate) fn get(&self, path: &str) -> Option<&T> {
        self.map.get(path)
    }

    pub(crate) fn contains(&self, path: &str) -> bool {
        self.map.contains_key(path)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.order.clone()
    }
}

/// A parsed ZIP: its file entries and the parser to read them with.
///
/// Shared by the buffered and streaming backends, which differ only in
/// where the parser's bytes come from.
pub(crate) struct ZipEntries {
    identifier: String,
    parser: Held<ZipParser<dyn ReadAt>>,
    table: EntryTable<ZipFileEntry>,
}

impl ZipEntries {
    /// Parse the Central Directory behind `reader`, keeping file entries.
    ///
    /// Entries are pulled one at a time; each is recorded or dropped
    /// before the next is requested.
    pub(crate) async fn load(identifier: &str, reader: Arc<dyn ReadAt>) -> Result<Self> {
        let parser = ZipParser::new(reader);
        let mut cursor = parser.entries().await?;
        let mut table = EntryTable::default();

        while let Some(entry) = cursor.next_entry()? {
            if entry.is_directory {
                trace!("{}: skipping directory {}", identifier, entry.file_name);
                continue;
            }
            trace!(
                "{}: found {} ({} bytes)",
                identifier, entry.file_name, entry.uncompressed_size
            );
            table.insert(entry.file_name.clone(), entry);
        }
        debug!("{}: {} entries", identifier, table.len());

        Ok(Self {
            identifier: identifier.to_string(),
            parser: Held::new(Arc::new(parser)),
            table,
        })
    }

    pub(crate) fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn contains(&self, path: &str) -> bool {
        self.table.contains(path)
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.table.paths()
    }

    /// Decode one entry; `NotFound` is reported before any read happens
    pub(crate) async fn read(&self, path: &str) -> Result<(Vec<u8>, u64)> {
        let entry = self
            .table
            .get(path)
            .ok_or_else(|| ArchiveError::NotFound(path.to_string()))?;
        let parser = self.parser.get()?;
        let data = parser.read_entry(entry).await?;
        Ok((data, entry.uncompressed_size))
    }

    pub(crate) fn release(&self) {
        if self.parser.release() {
            debug!("{}: released", self.identifier);
        }
    }
}
