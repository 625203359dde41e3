use std::net::SocketAddr;

use flex_proxy::{error::StartupError, AppState, Settings};

fn main() -> Result<(), StartupError> {
    let subscriber = tracing_subscriber::fmt().with_ansi(false).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Installing tracing subscriber: {e}");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    tracing::info!("Starting");

    runtime.block_on(run())
}

async fn run() -> Result<(), StartupError> {
    let settings = Settings::from_env().await?;
    let port = settings.port;

    let registry = prometheus::Registry::new();
    let state = AppState::new(settings, registry)?;

    #[cfg(unix)]
    tokio::spawn(flex_proxy::config::reload_on_hangup(state.settings.clone()));

    let app = flex_proxy::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on port {}", port);

    axum::Server::try_bind(&addr)
        .map_err(|e| StartupError::Server(e.to_string()))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Server(e.to_string()))?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!("Installing Ctrl+C handler {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Installing terminate handler {:?}", e);
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
