use async_trait::async_trait;
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{HttpRequest, HttpTransport, ReadAt};
use crate::error::{ArchiveError, Result};

const PARTIAL_CONTENT: u16 = 206;

/// HTTP Range reader for remote ZIP files.
///
/// Every read is served by a range request for exactly the requested span
/// (clamped to the resource size). Nothing is cached between reads.
pub struct HttpRangeReader {
    transport: Arc<dyn HttpTransport>,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
}

impl HttpRangeReader {
    /// Create a reader for a resource whose size is already known
    pub fn new(transport: Arc<dyn HttpTransport>, url: String, size: u64) -> Self {
        Self {
            transport,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
        }
    }

    /// Body bytes received so far, across all range requests
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = offset + buf.len() as u64 - 1;
        let end = end.min(self.size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;

        // A server may answer with fewer bytes than asked for; ask again for the rest
        while received < expected_size {
            let current_start = offset + received as u64;
            trace!("GET {} bytes={}-{}", self.url, current_start, end);

            let resp = self
                .transport
                .send(HttpRequest::get_range(&self.url, current_start, end))
                .await?;

            if resp.status != PARTIAL_CONTENT {
                return Err(ArchiveError::HttpStatus {
                    url: self.url.clone(),
                    status: resp.status,
                });
            }
            if resp.body.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("empty range response from {}", self.url),
                )
                .into());
            }

            self.transferred_bytes
                .fetch_add(resp.body.len() as u64, Ordering::Relaxed);

            let chunk_len = resp.body.len().min(expected_size - received);
            buf[received..received + chunk_len].copy_from_slice(&resp.body[..chunk_len]);
            received += chunk_len;
        }
        trace!("{}: {} bytes transferred", self.url, self.transferred_bytes());

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{HttpResponse, Method};
    use std::sync::Mutex;

    /// Answers every range request with at most `chunk` bytes
    struct Stingy {
        data: Vec<u8>,
        chunk: usize,
        ranges: Mutex<Vec<(u64, u64)>>,
    }

    #[async_trait]
    impl HttpTransport for Stingy {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            assert_eq!(request.method, Method::Get);
            let (start, end) = request.range.unwrap();
            self.ranges.lock().unwrap().push((start, end));
            let end = (end as usize + 1).min(start as usize + self.chunk);
            Ok(HttpResponse {
                status: PARTIAL_CONTENT,
                body: self.data[start as usize..end].to_vec(),
                ..Default::default()
            })
        }
    }

    fn stingy(chunk: usize) -> Arc<Stingy> {
        Arc::new(Stingy {
            data: (0..100u8).collect(),
            chunk,
            ranges: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn short_bodies_are_completed() {
        let transport = stingy(4);
        let reader = HttpRangeReader::new(transport.clone(), "http://x/a.zip".into(), 100);

        let mut buf = [0u8; 10];
        reader.read_exact_at(20, &mut buf).await.unwrap();
        assert_eq!(buf.to_vec(), (20..30u8).collect::<Vec<_>>());
        assert_eq!(
            *transport.ranges.lock().unwrap(),
            vec![(20, 29), (24, 29), (28, 29)]
        );
        assert_eq!(reader.transferred_bytes(), 10);
    }

    #[tokio::test]
    async fn reads_are_clamped_to_the_resource() {
        let transport = stingy(100);
        let reader = HttpRangeReader::new(transport.clone(), "http://x/a.zip".into(), 100);

        let mut buf = [0u8; 10];
        assert_eq!(reader.read_at(95, &mut buf).await.unwrap(), 5);
        assert_eq!(reader.read_at(100, &mut buf).await.unwrap(), 0);
        assert_eq!(*transport.ranges.lock().unwrap(), vec![(95, 99)]);
    }

    #[tokio::test]
    async fn other_statuses_fail() {
        struct Ignores;

        #[async_trait]
        impl HttpTransport for Ignores {
            async fn send(&self, _: HttpRequest) -> Result<HttpResponse> {
                Ok(HttpResponse {
                    status: 200,
                    body: vec![0; 100],
                    ..Default::default()
                })
            }
        }

        let reader = HttpRangeReader::new(Arc::new(Ignores), "http://x/a.zip".into(), 100);
        let mut buf = [0u8; 10];
        assert!(matches!(
            reader.read_at(0, &mut buf).await,
            Err(ArchiveError::HttpStatus { status: 200, .. })
        ));
    }
}
