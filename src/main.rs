use std::{future::IntoFuture, path::Path, process, sync::Arc};

use bytes::Bytes;
use pressroom::{
    application::{
        error::AppError,
        intake::{
            IntakeRequest, IntakeService, UploadedPart, archive::ExtractionPolicy,
            parts::{CONFIG_PART, PARAMS_PART, TEMPLATE_PART},
        },
        render::CommandRenderer,
    },
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;
    let intake = build_intake_service(&settings);

    match command {
        config::Command::Serve(_) => run_serve(settings, intake).await,
        config::Command::Render(args) => run_render(intake, args).await,
    }
}

fn build_intake_service(settings: &config::Settings) -> IntakeService {
    let renderer = CommandRenderer::new(
        settings.render.cli_path.clone(),
        settings.render.timeout,
    );
    let policy = ExtractionPolicy {
        max_entries: settings.archive.max_entries.get() as usize,
        max_extracted_bytes: settings.archive.max_extracted_bytes.get(),
        scratch_dir: settings.archive.scratch_dir.clone(),
    };
    IntakeService::new(Arc::new(renderer), policy)
}

async fn run_serve(settings: config::Settings, intake: IntakeService) -> Result<(), AppError> {
    let router = http::build_router(HttpState::new(intake), settings.uploads.body_limit());

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "pressroom::serve",
        addr = %settings.server.addr,
        render_cli = %settings.render.cli_path.display(),
        "listening"
    );

    let draining = Arc::new(Notify::new());
    let drain_signal = draining.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move { drain_signal.notified().await })
        .into_future();
    let mut server = std::pin::pin!(server);

    let result = tokio::select! {
        result = &mut server => result,
        _ = shutdown_signal() => {
            info!(
                target = "pressroom::serve",
                grace_secs = settings.server.graceful_shutdown.as_secs(),
                "shutdown requested; draining in-flight requests"
            );
            draining.notify_one();
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        target = "pressroom::serve",
                        "graceful shutdown window elapsed; dropping remaining connections"
                    );
                    Ok(())
                }
            }
        }
    };

    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = "pressroom::serve",
            error = %err,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}

async fn run_render(intake: IntakeService, args: config::RenderArgs) -> Result<(), AppError> {
    let mut request = IntakeRequest::with_template(read_part(TEMPLATE_PART, &args.template).await?);
    if let Some(path) = args.params.as_deref() {
        request.params = Some(read_part(PARAMS_PART, path).await?);
    }
    if let Some(path) = args.config.as_deref() {
        request.config = Some(read_part(CONFIG_PART, path).await?);
    }

    let document = intake.generate(request).await?;
    tokio::fs::write(&args.output, &document.bytes)
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "pressroom::render",
        output = %args.output.display(),
        pdf_bytes = document.bytes.len(),
        "document written"
    );
    Ok(())
}

async fn read_part(name: &'static str, path: &Path) -> Result<UploadedPart, AppError> {
    let content = tokio::fs::read(path).await.map_err(InfraError::from)?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::validation(format!("--{name} must name a file")))?;
    Ok(UploadedPart::new(name, filename, Bytes::from(content)))
}
