mod config;
mod error;
mod schemas;
mod services;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use config::AppConfig;
use services::api::ApiClient;
use services::session::Session;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Startup aborted");
            return ExitCode::FAILURE;
        }
    };

    let session = match Session::from_config(&config) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Startup aborted");
            return ExitCode::FAILURE;
        }
    };

    // Global ceiling for every request the process makes; the resource
    // fetches additionally apply it per request. Without it a hung
    // Telegram or auth endpoint would pin the cycle (and its in-flight
    // guard) forever.
    let http = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let api = Arc::new(ApiClient::new(http.clone(), &config, session));

    tokio::select! {
        () = services::scheduler::run_report_scheduler(config, http, api) => {}
        () = shutdown_signal() => {}
    }
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("Shutdown signal received, stopping the scheduler");
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
