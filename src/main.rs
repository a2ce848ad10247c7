use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use handlers::account_handlers::AppState;
use services::{
    account_service::AccountService,
    notifier::{LogNotifier, MailgunNotifier, Notifier},
    storage::{StorageGateway, admin::AdminClient, s3::S3Client},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting account-provisioner with config: {:?}", cfg);

    // --- Storage service clients ---
    let endpoint = cfg.endpoint_config();
    let data = S3Client::new(&endpoint).context("building storage data-plane client")?;
    let control = AdminClient::new(&endpoint).context("building storage admin client")?;
    let gateway = StorageGateway::new(Arc::new(data), Arc::new(control));

    // --- Credentials delivery ---
    let notifier: Arc<dyn Notifier> = match cfg.mailgun_config() {
        Some(mailgun) => {
            tracing::info!("Sending credentials through Mailgun domain {}", mailgun.domain);
            Arc::new(MailgunNotifier::new(mailgun).context("building Mailgun client")?)
        }
        None => {
            tracing::warn!("Mailgun not configured, credentials emails will not be sent");
            Arc::new(LogNotifier)
        }
    };

    let shutdown = CancellationToken::new();
    let state = AppState {
        accounts: AccountService::new(gateway, notifier, cfg.account_settings()),
        admin_token: Arc::from(cfg.admin_token.as_str()),
        shutdown: shutdown.clone(),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tokio::spawn(cancel_on_signal(shutdown.clone()));

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM. In-flight orchestrations observe the
/// cancellation at their next step boundary.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}
