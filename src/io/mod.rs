mod http;
mod local;
mod memory;
mod transport;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use memory::MemoryReader;
pub use transport::{
    DEFAULT_TIMEOUT, HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport,
};

use async_trait::async_trait;

use crate::error::Result;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// May return fewer bytes than requested; zero means end of data.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`, failing with `UnexpectedEof`
    /// if the source ends first.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..]).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("read past end of data at offset {}", offset + filled as u64),
                )
                .into());
            }
            filled += n;
        }
        Ok(())
    }
}
