use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use tokio::{fs, process::Command};
use tracing::{info, warn};

use super::{DocumentRenderer, MarkupSource, RenderError, RenderRequest};

const SOURCE: &str = "application::render::command";

/// Renders through an external HTML-to-PDF executable.
///
/// The executable is invoked as
/// `<cli> --input IN --output OUT --params PARAMS.json --config CONFIG.json`
/// and must write the finished PDF to `OUT`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    cli_path: PathBuf,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(cli_path: PathBuf, timeout: Duration) -> Self {
        Self { cli_path, timeout }
    }
}

#[async_trait]
impl DocumentRenderer for CommandRenderer {
    async fn render(&self, request: RenderRequest) -> Result<Bytes, RenderError> {
        let scratch = tokio::task::spawn_blocking(|| {
            tempfile::Builder::new()
                .prefix("pressroom-render-")
                .tempdir()
        })
        .await
        .map_err(|err| RenderError::Io(io::Error::other(err)))??;

        let result = self.render_in(scratch.path(), request).await;
        discard(scratch).await;
        result
    }
}

impl CommandRenderer {
    async fn render_in(
        &self,
        scratch: &Path,
        request: RenderRequest,
    ) -> Result<Bytes, RenderError> {
        let started_at = Instant::now();
        let input_path = match &request.markup {
            MarkupSource::Inline(markup) => {
                let path = scratch.join("index.html");
                fs::write(&path, markup).await?;
                path
            }
            MarkupSource::Bundled(path) => path.clone(),
        };

        let params_path = scratch.join("params.json");
        fs::write(&params_path, serde_json::to_vec(&request.params)?).await?;
        let config_path = scratch.join("config.json");
        fs::write(&config_path, serde_json::to_vec(&request.config)?).await?;
        let output_path = scratch.join("output.pdf");

        let mut command = Command::new(&self.cli_path);
        command
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--params")
            .arg(&params_path)
            .arg("--config")
            .arg(&config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|err| {
                warn!(
                    target = SOURCE,
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error_code = "spawn_cli",
                    cli_path = %self.cli_path.display(),
                    error = %err,
                    "Failed to spawn renderer"
                );
                if err.kind() == ErrorKind::NotFound {
                    RenderError::NotFound(err)
                } else {
                    RenderError::Io(err)
                }
            })?,
            Err(_) => {
                warn!(
                    target = SOURCE,
                    result = "timeout",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    timeout_secs = self.timeout.as_secs(),
                    "Renderer timed out; process killed"
                );
                return Err(RenderError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                target = SOURCE,
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                error_code = "renderer_cli",
                stderr = %stderr,
                "Renderer invocation failed"
            );
            return Err(RenderError::Cli { exit_code, stderr });
        }

        let document = match fs::read(&output_path).await {
            Ok(document) => document,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RenderError::EmptyOutput);
            }
            Err(err) => return Err(RenderError::Io(err)),
        };
        if document.is_empty() {
            return Err(RenderError::EmptyOutput);
        }

        info!(
            target = SOURCE,
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            pdf_bytes = document.len(),
            "Document rendered via CLI"
        );

        Ok(Bytes::from(document))
    }
}

async fn discard(scratch: TempDir) {
    let path = scratch.path().to_path_buf();
    match tokio::task::spawn_blocking(move || scratch.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(
            target = SOURCE,
            dir = %path.display(),
            error = %err,
            "failed to remove render scratch directory"
        ),
        Err(err) => warn!(
            target = SOURCE,
            dir = %path.display(),
            error = %err,
            "render scratch cleanup task failed"
        ),
    }
}
