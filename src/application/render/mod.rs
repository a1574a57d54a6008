//! Seam between the intake pipeline and the engine that lays out PDF documents.

mod command;

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

pub use command::CommandRenderer;

/// Key/value mapping passed to the renderer for template variables or engine options.
pub type Mapping = Map<String, Value>;

/// Where the markup for a render comes from.
#[derive(Debug, Clone)]
pub enum MarkupSource {
    /// A standalone upload held in memory.
    Inline(Bytes),
    /// The entry document of an extracted bundle. Sibling assets resolve relative to it.
    Bundled(PathBuf),
}

/// Everything the renderer needs for one document.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub markup: MarkupSource,
    pub params: Mapping,
    pub config: Mapping,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer unavailable: {0}")]
    NotFound(std::io::Error),
    #[error("renderer i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode render payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("renderer exited with {exit_code:?}: {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("renderer did not finish within {seconds}s")]
    Timeout { seconds: u64 },
    #[error("renderer produced an empty document")]
    EmptyOutput,
    #[error("{0}")]
    Engine(String),
}

/// External engine converting markup plus parameters and configuration into PDF bytes.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, request: RenderRequest) -> Result<Bytes, RenderError>;
}
