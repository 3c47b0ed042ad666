use std::{process, sync::Arc};

use folio::{
    application::error::AppError,
    config::{self, StoreKind},
    infra::{
        bootstrap::EngineBuilder, db::PostgresRepositories, error::InfraError, http,
        memory::InMemoryRepositories, telemetry,
    },
};
use tokio::sync::watch;
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
    let (cli_args, settings) =
        config::load_with_cli().map_err(|err| AppError::from(InfraError::from(err)))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn connect(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let url = settings
        .database
        .require_url()
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = "folio::migrate", "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = match settings.engine.store {
        StoreKind::Postgres => {
            let pool = connect(&settings).await?;
            PostgresRepositories::run_migrations(&pool)
                .await
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            let repositories = Arc::new(PostgresRepositories::new(pool));
            EngineBuilder::new(repositories.clone())
                .with_append_attempts(settings.engine.append_max_attempts)
                .with_health_probe(repositories)
                .build()
        }
        StoreKind::Memory => {
            warn!(
                target = "folio::serve",
                "using the in-memory store; data is lost on shutdown"
            );
            EngineBuilder::new(Arc::new(InMemoryRepositories::new()))
                .with_append_attempts(settings.engine.append_max_attempts)
                .build()
        }
    };

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "folio::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let router = http::build_router(state);
    let mut server = tokio::spawn(http::serve(listener, router, async move {
        let _ = stop_rx.changed().await;
    }));

    tokio::select! {
        joined = &mut server => return flatten_server_result(joined),
        _ = shutdown_signal() => {
            info!(target = "folio::serve", "shutdown requested, draining connections");
            let _ = stop_tx.send(true);
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(joined) => flatten_server_result(joined),
        Err(_) => {
            warn!(
                target = "folio::serve",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out"
            );
            Ok(())
        }
    }
}

fn flatten_server_result(
    joined: Result<Result<(), InfraError>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(AppError::from),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
