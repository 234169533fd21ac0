use clap::Parser;
use simple_git_hook::access::{AccessGuard, GitHubMeta};
use simple_git_hook::api::build_router;
use simple_git_hook::cli::Settings;
use simple_git_hook::config::ConfigCache;
use simple_git_hook::dispatch::SystemLauncher;
use simple_git_hook::error::Result;
use simple_git_hook::logging::{FileLogger, setup_logging};
use simple_git_hook::{AppState, SharedState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let settings = Settings::parse();

    let file_logger = settings.log_dir.clone().map(FileLogger::new);
    let _log_guard = match setup_logging(settings.is_dev(), file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging setup error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(settings).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> Result<()> {
    let meta = GitHubMeta::new(settings.meta_url.clone(), settings.meta_timeout())?;

    let state: SharedState = Arc::new(AppState {
        config: ConfigCache::new(&settings.repos),
        access: AccessGuard::new(Arc::new(meta), settings.use_proxyfix),
        launcher: Arc::new(SystemLauncher),
    });

    // Surface a broken mapping file at startup instead of on the first push.
    state.config.snapshot()?;

    spawn_reload_on_hangup(state.clone());

    let app = build_router(state);
    let bind_address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(bind_address.as_str()).await?;

    info!("Listening on {}", bind_address);
    info!("Using repository config at {:?}", settings.repos);
    if settings.is_dev() {
        warn!("Running in dev mode");
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

/// Reload the repository config whenever the process receives SIGHUP.
#[cfg(unix)]
fn spawn_reload_on_hangup(state: SharedState) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Could not install SIGHUP handler, config reload disabled: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading {:?}", state.config.path());
            // errors are logged by reload; the previous snapshot stays active
            let _ = state.config.reload();
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_state: SharedState) {
    warn!("Config reload via SIGHUP is only available on unix");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
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
}
