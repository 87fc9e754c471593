use async_trait::async_trait;
use log::debug;
use std::path::Path;
use std::sync::Arc;

use super::table::ZipEntries;
use super::{Archive, StreamAndLength, reopen};
use crate::error::Result;
use crate::io::{MemoryReader, ReadAt};

/// A local ZIP read entirely into memory at open.
///
/// Only for archives known to be small; every entry read decodes from
/// the in-memory copy.
#[derive(Clone)]
pub struct BufferedZip {
    zip: Arc<ZipEntries>,
}

impl BufferedZip {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        debug!("{}: buffered {} bytes", path.display(), data.len());

        let reader: Arc<dyn ReadAt> = Arc::new(MemoryReader::new(data));
        let zip = ZipEntries::load(&path.to_string_lossy(), reader).await?;
        Ok(Self { zip: Arc::new(zip) })
    }
}

#[async_trait]
impl Archive for BufferedZip {
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
        let (data, _) = self.zip.read(path).await?;
        Ok(StreamAndLength::from_bytes(data, reopen(self, path)))
    }

    fn release(&self) {
        self.zip.release();
    }
}
