//! Template intake: validates uploaded parts, unpacks bundles, resolves the
//! entry document and hands it to the renderer.
//!
//! Nothing here knows about HTTP; callers translate [`IntakeError`] into
//! whatever their transport needs.

pub mod archive;
pub mod entry;
pub mod parts;

use std::{path::PathBuf, sync::Arc, time::Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::result::ZipError;

use crate::application::render::{
    DocumentRenderer, Mapping, MarkupSource, RenderError, RenderRequest,
};
use crate::domain::file_types::{is_allowed, is_hidden_artifact};

use self::archive::{ExtractError, ExtractedBundle, ExtractionPolicy};
use self::parts::{CONFIG_PART, PARAMS_PART, TEMPLATE_PART, parse_mapping};

pub use self::parts::{IntakeRequest, UploadedPart};

const SOURCE: &str = "application::intake";

pub const OUTPUT_FILENAME: &str = "report.pdf";
pub const OUTPUT_MEDIA_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{0} not in request body.")]
    MissingRequiredPart(&'static str),
    #[error("Provided value for {part} was an invalid file type.")]
    InvalidFileType { part: String },
    #[error("zip file contains invalid file types: {path}")]
    InvalidArchiveMember { path: String },
    #[error("zip file contains an entry outside the bundle: {name}")]
    UnsafeArchiveEntry { name: String },
    #[error("zip file contains conflicting entries: {name}")]
    ConflictingArchiveEntry { name: String },
    #[error("zip file exceeds intake limits: {reason}")]
    ArchiveLimitExceeded { reason: String },
    #[error("zip file could not be read")]
    CorruptArchive(#[source] ZipError),
    #[error("unable to find index file")]
    EntryNotFound,
    #[error("Provided value for {part} was not a JSON object: {reason}")]
    MalformedPayload { part: &'static str, reason: String },
    #[error("rendering failed")]
    RenderingFailed(#[from] RenderError),
    #[error("i/o failure during intake")]
    Io(#[from] std::io::Error),
}

impl IntakeError {
    /// Errors caused by what the caller sent, as opposed to server-side faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, IntakeError::RenderingFailed(_) | IntakeError::Io(_))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            IntakeError::MissingRequiredPart(_) => "missing_part",
            IntakeError::InvalidFileType { .. } | IntakeError::InvalidArchiveMember { .. } => {
                "invalid_file_type"
            }
            IntakeError::UnsafeArchiveEntry { .. } => "unsafe_entry",
            IntakeError::ConflictingArchiveEntry { .. } => "conflicting_entry",
            IntakeError::ArchiveLimitExceeded { .. } => "archive_limit",
            IntakeError::CorruptArchive(_) => "corrupt_archive",
            IntakeError::EntryNotFound => "entry_not_found",
            IntakeError::MalformedPayload { .. } => "malformed_payload",
            IntakeError::RenderingFailed(_) => "rendering_failed",
            IntakeError::Io(_) => "io",
        }
    }
}

impl From<ExtractError> for IntakeError {
    fn from(error: ExtractError) -> Self {
        match error {
            ExtractError::Corrupt(err) => IntakeError::CorruptArchive(err),
            ExtractError::UnsafeEntry { name } => IntakeError::UnsafeArchiveEntry { name },
            ExtractError::ConflictingEntry { name } => {
                IntakeError::ConflictingArchiveEntry { name }
            }
            err @ (ExtractError::TooManyEntries { .. } | ExtractError::TooLarge { .. }) => {
                IntakeError::ArchiveLimitExceeded {
                    reason: err.to_string(),
                }
            }
            ExtractError::Io(err) => IntakeError::Io(err),
        }
    }
}

/// A rendered document ready to be sent as a download.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub filename: &'static str,
    pub media_type: &'static str,
    pub bytes: Bytes,
}

impl RenderedDocument {
    fn pdf(bytes: Bytes) -> Self {
        Self {
            filename: OUTPUT_FILENAME,
            media_type: OUTPUT_MEDIA_TYPE,
            bytes,
        }
    }
}

#[derive(Clone)]
pub struct IntakeService {
    renderer: Arc<dyn DocumentRenderer>,
    policy: ExtractionPolicy,
}

impl IntakeService {
    pub fn new(renderer: Arc<dyn DocumentRenderer>, policy: ExtractionPolicy) -> Self {
        Self { renderer, policy }
    }

    /// Validate the request, render it and return the finished document.
    ///
    /// When the template is a bundle, its extraction root is gone by the time
    /// this returns, whatever the outcome.
    pub async fn generate(&self, request: IntakeRequest) -> Result<RenderedDocument, IntakeError> {
        let result = self.process(request).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        counter!("pressroom_intake_requests_total", "outcome" => outcome).increment(1);
        result
    }

    async fn process(&self, request: IntakeRequest) -> Result<RenderedDocument, IntakeError> {
        let IntakeRequest {
            template,
            params,
            config,
        } = request;

        let template = template.ok_or(IntakeError::MissingRequiredPart(TEMPLATE_PART))?;
        for part in [Some(&template), params.as_ref(), config.as_ref()]
            .into_iter()
            .flatten()
        {
            ensure_allowed(part)?;
        }

        let params = parse_mapping(PARAMS_PART, params.as_ref())?;
        let config = parse_mapping(CONFIG_PART, config.as_ref())?;

        if !archive::is_archive(&template.content) {
            debug!(
                target = SOURCE,
                filename = %template.filename,
                bytes = template.content.len(),
                "rendering standalone template"
            );
            return self
                .render(MarkupSource::Inline(template.content), params, config)
                .await;
        }

        let bundle = self.unpack(template.content).await?;
        let outcome = match resolve_entry(&bundle) {
            Ok(entry) => {
                self.render(MarkupSource::Bundled(entry), params, config)
                    .await
            }
            Err(err) => Err(err),
        };
        release(bundle).await;
        outcome
    }

    async fn unpack(&self, archive_bytes: Bytes) -> Result<ExtractedBundle, IntakeError> {
        let policy = self.policy.clone();
        let bundle = tokio::task::spawn_blocking(move || archive::extract(&archive_bytes, &policy))
            .await
            .map_err(|err| IntakeError::Io(std::io::Error::other(err)))??;

        counter!("pressroom_archive_members_total").increment(bundle.members().len() as u64);
        debug!(
            target = SOURCE,
            root = %bundle.root().display(),
            members = bundle.members().len(),
            "bundle extracted"
        );
        Ok(bundle)
    }

    async fn render(
        &self,
        markup: MarkupSource,
        params: Mapping,
        config: Mapping,
    ) -> Result<RenderedDocument, IntakeError> {
        let started_at = Instant::now();
        let bytes = self
            .renderer
            .render(RenderRequest {
                markup,
                params,
                config,
            })
            .await?;
        let elapsed = started_at.elapsed();
        histogram!("pressroom_render_ms").record(elapsed.as_secs_f64() * 1000.0);
        info!(
            target = SOURCE,
            elapsed_ms = elapsed.as_millis() as u64,
            pdf_bytes = bytes.len(),
            "document rendered"
        );
        Ok(RenderedDocument::pdf(bytes))
    }
}

fn ensure_allowed(part: &UploadedPart) -> Result<(), IntakeError> {
    if is_allowed(&part.filename) {
        Ok(())
    } else {
        Err(IntakeError::InvalidFileType {
            part: part.name.clone(),
        })
    }
}

/// Type-check every visible file member, then pick the entry document.
///
/// Hidden files and archiver bookkeeping are skipped by name for both steps.
fn resolve_entry(bundle: &ExtractedBundle) -> Result<PathBuf, IntakeError> {
    let visible = || {
        bundle
            .members()
            .iter()
            .filter(|member| !is_hidden_artifact(&member.relative))
    };

    for member in visible().filter(|member| !member.is_directory) {
        let name = member
            .relative
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        if !is_allowed(&name) {
            return Err(IntakeError::InvalidArchiveMember {
                path: member.relative.display().to_string(),
            });
        }
    }

    entry::find_index(visible())
        .map(|path| path.to_path_buf())
        .ok_or(IntakeError::EntryNotFound)
}

async fn release(bundle: ExtractedBundle) {
    let root = bundle.root().to_path_buf();
    match tokio::task::spawn_blocking(move || bundle.close()).await {
        Ok(Ok(())) => debug!(
            target = SOURCE,
            root = %root.display(),
            "extraction root removed"
        ),
        Ok(Err(err)) => warn!(
            target = SOURCE,
            root = %root.display(),
            error = %err,
            "failed to remove extraction root"
        ),
        Err(err) => warn!(
            target = SOURCE,
            root = %root.display(),
            error = %err,
            "extraction root cleanup task failed"
        ),
    }
}
