//! HTTP surface: liveness on `GET /`, document generation on `POST /`.

mod middleware;
mod multipart;

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::{Multipart, multipart::MultipartRejection};
use tracing::debug;

use crate::application::{
    error::HttpError,
    intake::{IntakeRequest, IntakeService, RenderedDocument},
};

use self::middleware::{log_responses, set_request_context};
use self::multipart::read_intake_request;

pub use self::middleware::RequestContext;

pub const LIVENESS_MESSAGE: &str = "Online... waiting for requests.";

#[derive(Clone)]
pub struct HttpState {
    pub intake: Arc<IntakeService>,
}

impl HttpState {
    pub fn new(intake: IntakeService) -> Self {
        Self {
            intake: Arc::new(intake),
        }
    }
}

/// Build the service router. `body_limit` caps the size of a whole request body.
pub fn build_router(state: HttpState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(liveness).post(generate_pdf))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
        .with_state(state)
}

async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

async fn generate_pdf(
    State(state): State<HttpState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, HttpError> {
    let request = match multipart {
        Ok(mut multipart) => read_intake_request(&mut multipart).await?,
        Err(rejection) => {
            debug!(
                target = "infra::http::generate_pdf",
                rejection = %rejection,
                "request body is not multipart; treating it as an empty form"
            );
            IntakeRequest::default()
        }
    };

    let document = state.intake.generate(request).await?;
    document_response(document)
}

fn document_response(document: RenderedDocument) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::document_response";

    let disposition = format!("attachment; filename=\"{}\"", document.filename);
    let disposition = HeaderValue::from_str(&disposition).map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build response",
            &err,
        )
    })?;

    let length = HeaderValue::from(document.bytes.len());
    let mut response = document.bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(document.media_type));
    headers.insert(CONTENT_LENGTH, length);
    headers.insert(CONTENT_DISPOSITION, disposition);
    Ok(response)
}
