//! Multipart form parsing for generate requests.

use axum::http::StatusCode;
use axum_extra::extract::Multipart;
use tracing::{debug, error};

use crate::application::{
    error::HttpError,
    intake::{IntakeRequest, UploadedPart},
};

const SOURCE: &str = "infra::http::multipart";

#[derive(Debug)]
pub(super) enum FormReadError {
    PayloadTooLarge { detail: String },
    InvalidFormData { detail: String },
}

impl From<FormReadError> for HttpError {
    fn from(err: FormReadError) -> Self {
        match err {
            FormReadError::PayloadTooLarge { detail } => HttpError::new(
                SOURCE,
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body is too large",
                detail,
            ),
            FormReadError::InvalidFormData { detail } => HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Request form data was invalid",
                detail,
            ),
        }
    }
}

/// Collect the file parts of a generate request.
///
/// Fields without a filename and fields the intake does not know are skipped,
/// as are repeats of a field already collected.
pub(super) async fn read_intake_request(
    multipart: &mut Multipart,
) -> Result<IntakeRequest, FormReadError> {
    let mut request = IntakeRequest::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(read_failure(err.status(), err.to_string())),
        };

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if !IntakeRequest::accepts(&name) {
            debug!(target = SOURCE, field = %name, "ignoring unknown form field");
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            debug!(target = SOURCE, field = %name, "ignoring non-file form field");
            continue;
        };

        let content = field
            .bytes()
            .await
            .map_err(|err| read_failure(err.status(), err.to_string()))?;

        if !request.insert(UploadedPart::new(name.as_str(), filename, content)) {
            debug!(target = SOURCE, field = %name, "ignoring repeated form field");
        }
    }

    Ok(request)
}

fn read_failure(status: StatusCode, detail: String) -> FormReadError {
    error!(
        target = SOURCE,
        status = status.as_u16(),
        error = %detail,
        "failed to read multipart payload"
    );
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => FormReadError::PayloadTooLarge { detail },
        _ => FormReadError::InvalidFormData { detail },
    }
}
