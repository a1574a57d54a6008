//! Helpers shared by the router-level tests.

#![allow(dead_code)]

use std::{
    io::{Cursor, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, header::CONTENT_TYPE},
};
use bytes::Bytes;
use pressroom::{
    application::{
        intake::{IntakeService, archive::ExtractionPolicy},
        render::{DocumentRenderer, Mapping, MarkupSource, RenderError, RenderRequest},
    },
    infra::http::{HttpState, build_router},
};
use tempfile::TempDir;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

pub const STUB_PDF: &[u8] = b"%PDF-1.7 stub document";
const BOUNDARY: &str = "pressroom-test-boundary";

/// What the stub renderer saw on one call.
#[derive(Debug, Clone)]
pub struct RenderCall {
    pub markup: String,
    pub entry: Option<PathBuf>,
    pub params: Mapping,
    pub config: Mapping,
}

/// Renderer double that records requests and returns a fixed document.
#[derive(Default)]
pub struct StubRenderer {
    calls: Mutex<Vec<RenderCall>>,
    failure: Option<String>,
}

impl StubRenderer {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl DocumentRenderer for StubRenderer {
    async fn render(&self, request: RenderRequest) -> Result<Bytes, RenderError> {
        let (markup, entry) = match &request.markup {
            MarkupSource::Inline(bytes) => (String::from_utf8_lossy(bytes).into_owned(), None),
            MarkupSource::Bundled(path) => (
                std::fs::read_to_string(path).map_err(RenderError::Io)?,
                Some(path.clone()),
            ),
        };
        self.calls.lock().expect("calls lock").push(RenderCall {
            markup,
            entry,
            params: request.params,
            config: request.config,
        });
        match &self.failure {
            Some(message) => Err(RenderError::Engine(message.clone())),
            None => Ok(Bytes::from_static(STUB_PDF)),
        }
    }
}

/// A router wired to a stub renderer, unpacking bundles under a private scratch dir.
pub struct TestApp {
    pub router: Router,
    pub renderer: Arc<StubRenderer>,
    pub scratch: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_renderer(StubRenderer::default(), 1024 * 1024)
    }

    pub fn with_renderer(renderer: StubRenderer, body_limit: usize) -> Self {
        let scratch = TempDir::new().expect("scratch dir");
        let renderer = Arc::new(renderer);
        let policy = ExtractionPolicy {
            scratch_dir: Some(scratch.path().to_path_buf()),
            ..ExtractionPolicy::default()
        };
        let intake = IntakeService::new(renderer.clone(), policy);
        let router = build_router(HttpState::new(intake), body_limit);
        Self {
            router,
            renderer,
            scratch,
        }
    }

    /// Extraction roots still present in the scratch dir.
    pub fn leftovers(&self) -> Vec<PathBuf> {
        scratch_entries(self.scratch.path())
    }
}

fn scratch_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .expect("read scratch dir")
        .map(|entry| entry.expect("scratch entry").path())
        .collect()
}

/// Hand-assembled `multipart/form-data` body.
#[derive(Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, filename: &str, content: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    pub fn into_request(mut self) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .expect("request")
    }
}

/// Build an in-memory zip. Names ending in `/` become directory entries.
pub fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add directory");
        } else {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(content.as_bytes()).expect("write entry");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}
