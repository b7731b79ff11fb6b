//! Shared stubs for the integration tests: in-process fetcher and
//! converter, a `.docx` builder and a fully in-memory service set.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use docflow::external::{ConversionError, FetchError};
use docflow::{
    DocumentConverter, DocumentFetcher, InMemoryActivityStore, InMemoryBlobStore, Services,
    SteppingClock,
};

pub const DOC_URL: &str = "https://files.example.com/manuscript.docx";

/// `.docx` bytes with one body paragraph per entry
pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );

    let mut out = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut out);
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    out.into_inner()
}

/// Two paragraphs, sixty words in total
pub fn passing_docx() -> Vec<u8> {
    let first = vec!["alpha"; 30].join(" ");
    let second = vec!["beta"; 30].join(" ");
    docx(&[&first, &second])
}

/// Serves fixed bodies by URL and counts requests
#[derive(Default)]
pub struct StubFetcher {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn with(url: &str, bytes: Vec<u8>) -> Self {
        let fetcher = Self::default();
        fetcher.serve(url, bytes);
        fetcher
    }

    pub fn serve(&self, url: &str, bytes: Vec<u8>) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Prefixes the input with a PDF magic header
#[derive(Default)]
pub struct StubConverter {
    calls: AtomicUsize,
}

impl StubConverter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentConverter for StubConverter {
    async fn convert(&self, source: &[u8]) -> Result<Vec<u8>, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut pdf = b"%PDF-1.7\n".to_vec();
        pdf.extend_from_slice(source);
        Ok(pdf)
    }

    fn target_extension(&self) -> String {
        "pdf".to_string()
    }
}

/// Everything in memory, with a clock that advances one second per reading
pub struct Harness {
    pub store: Arc<InMemoryActivityStore>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub fetcher: Arc<StubFetcher>,
    pub converter: Arc<StubConverter>,
}

impl Harness {
    pub fn new(fetcher: StubFetcher) -> Self {
        Self {
            store: Arc::new(InMemoryActivityStore::new()),
            blobs: Arc::new(InMemoryBlobStore::new("https://cdn.example.com/public")),
            fetcher: Arc::new(fetcher),
            converter: Arc::new(StubConverter::default()),
        }
    }

    pub fn services(&self) -> Services {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        Services {
            store: self.store.clone(),
            blobs: self.blobs.clone(),
            fetcher: self.fetcher.clone(),
            converter: self.converter.clone(),
            clock: Arc::new(SteppingClock::new(start, Duration::seconds(1))),
        }
    }
}
