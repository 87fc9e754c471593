#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Mutex;
use zip::write::SimpleFileOptions;

use packzip::io::{HttpRequest, HttpResponse, HttpTransport, Method};
use packzip::{ArchiveError, Result};

pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn chapter() -> String {
    "<p>It was a dark and stormy night.</p>\n".repeat(400)
}

/// A small EPUB-shaped archive, including a directory entry
pub fn epub_bytes() -> Vec<u8> {
    let stored = || SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated =
        || SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("mimetype", stored()).unwrap();
    writer.write_all(b"application/epub+zip").unwrap();
    writer.add_directory("META-INF/", stored()).unwrap();
    writer.start_file("META-INF/container.xml", deflated()).unwrap();
    writer.write_all(CONTAINER_XML.as_bytes()).unwrap();
    writer.add_directory("OEBPS/", stored()).unwrap();
    writer.start_file("OEBPS/content.opf", stored()).unwrap();
    writer.write_all(b"<package/>").unwrap();
    writer.start_file("OEBPS/chapter1.xhtml", deflated()).unwrap();
    writer.write_all(chapter().as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// File entries of [`epub_bytes`] in archive order
pub fn epub_entries() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("mimetype", b"application/epub+zip".to_vec()),
        ("META-INF/container.xml", CONTAINER_XML.as_bytes().to_vec()),
        ("OEBPS/content.opf", b"<package/>".to_vec()),
        ("OEBPS/chapter1.xhtml", chapter().into_bytes()),
    ]
}

/// Serves in-memory resources and records every request it gets
pub struct MockTransport {
    resources: HashMap<String, Vec<u8>>,
    accept_ranges: Vec<String>,
    declared_length: Option<Option<u64>>,
    get_length: bool,
    unreachable: bool,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            accept_ranges: Vec::new(),
            declared_length: None,
            get_length: true,
            unreachable: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
        self.resources.insert(url.to_string(), body);
        self
    }

    pub fn accept_ranges(mut self, value: &str) -> Self {
        self.accept_ranges.push(value.to_string());
        self
    }

    /// Announce this Content-Length on HEAD (None: omit the header)
    pub fn declare_length(mut self, length: Option<u64>) -> Self {
        self.declared_length = Some(length);
        self
    }

    /// Leave Content-Length out of full GET responses
    pub fn omit_get_length(mut self) -> Self {
        self.get_length = false;
        self
    }

    /// Fail every request as if the server were down
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn full_gets(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Get && r.range.is_none())
            .count()
    }

    fn ranges_supported(&self) -> bool {
        self.accept_ranges.iter().any(|v| v.contains("bytes"))
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if self.unreachable {
            return Err(ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let Some(body) = self.resources.get(&request.url) else {
            return Ok(HttpResponse {
                status: 404,
                ..Default::default()
            });
        };

        let response = match (request.method, request.range) {
            (Method::Head, _) => HttpResponse {
                status: 200,
                content_length: self
                    .declared_length
                    .unwrap_or(Some(body.len() as u64)),
                accept_ranges: self.accept_ranges.clone(),
                body: Vec::new(),
            },
            (Method::Get, Some((start, end))) if self.ranges_supported() => {
                let start = start as usize;
                let end = (end as usize).min(body.len() - 1);
                let part = body[start..=end].to_vec();
                HttpResponse {
                    status: 206,
                    content_length: Some(part.len() as u64),
                    accept_ranges: self.accept_ranges.clone(),
                    body: part,
                }
            }
            // Servers without Range support answer with the whole resource
            (Method::Get, _) => HttpResponse {
                status: 200,
                content_length: self.get_length.then_some(body.len() as u64),
                accept_ranges: self.accept_ranges.clone(),
                body: body.clone(),
            },
        };
        Ok(response)
    }
}
