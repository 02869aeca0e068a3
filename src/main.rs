use std::{process, sync::Arc};

use tokio::{net::TcpListener, signal, time::timeout};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vitrine::{
    application::error::AppError,
    cache::{BackgroundTasks, CacheConfig, InMemoryCacheStore, QueryCache},
    config,
    content::ContentClient,
    infra::{
        content::HttpContentClient,
        error::InfraError,
        http::{self, AppState, PreviewRuntime},
        telemetry,
    },
    preview::{PreviewMachine, PreviewService, SecretDocumentValidator, SessionCookie},
};

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
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let content: Arc<dyn ContentClient> = Arc::new(HttpContentClient::new(
        settings.content.client_config(),
        settings.content.request_timeout,
    )?);

    let cache_config = CacheConfig::from(&settings.cache);
    let tasks = BackgroundTasks::new();
    let cache = QueryCache::new(
        Arc::new(InMemoryCacheStore::new(&cache_config)),
        Arc::new(tasks.clone()),
    );

    let preview = build_preview(&settings, &content)?;
    if preview.is_none() {
        info!("preview disabled: no preview token configured");
    }

    let state = AppState {
        content,
        cache,
        cache_config,
        preview,
        preview_route: Arc::from(settings.preview.route.as_str()),
    };
    let router = http::build_router(state);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(settings.server.addr, err)))?;
    info!(addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::from(InfraError::Serve(err)))?;

    let pending = tasks.pending();
    if timeout(settings.server.graceful_shutdown, tasks.drain())
        .await
        .is_err()
    {
        warn!(pending, "background cache writes abandoned at shutdown");
    }
    info!("shutdown complete");
    Ok(())
}

fn build_preview(
    settings: &config::Settings,
    content: &Arc<dyn ContentClient>,
) -> Result<Option<PreviewRuntime>, AppError> {
    let Some(token) = settings.preview.token.clone() else {
        return Ok(None);
    };

    let cookie =
        SessionCookie::new(settings.session.cookie.clone()).map_err(InfraError::from)?;
    let service = PreviewService::new(
        PreviewMachine::new(
            settings.content.project_id.clone(),
            settings.content.api_version,
        ),
        Arc::clone(content),
        token,
        Arc::new(SecretDocumentValidator::with_ttl(settings.preview.secret_ttl)),
    );
    Ok(Some(PreviewRuntime { service, cookie }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => error!(error = %err, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
