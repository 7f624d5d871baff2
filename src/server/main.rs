use std::net::SocketAddr;
use std::sync::Arc;

use sufuss::config::get_config;
use sufuss::errors::{LicenseError, LicenseResult};
use sufuss::server::{build_admin_router, build_router, seed_demo_license, AppState, Database};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
}

async fn bind(host: &str, port: u16) -> LicenseResult<(TcpListener, SocketAddr)> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LicenseError::ServerError(format!("failed to bind {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| LicenseError::ServerError(format!("failed to read address of {addr}: {e}")))?;
    Ok((listener, local))
}

#[tokio::main]
async fn main() -> LicenseResult<()> {
    let config = get_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = Database::connect(&config.database.url).await?;
    if let Some(license) = seed_demo_license(&db, config).await? {
        info!("Seeded demo license {}", license.license_key);
    }

    let state = AppState::new(Arc::new(db), Arc::new(config.clone()));

    let (public, public_addr) = bind(&config.server.host, config.server.port).await?;
    info!("Sufuss listening on http://{public_addr}");
    let public_app = build_router(state.clone());
    let public_server = async {
        axum::serve(
            public,
            public_app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| LicenseError::ServerError(format!("public server failed: {e}")))
    };

    if config.admin.enabled {
        let (admin, admin_addr) = bind(&config.admin.host, config.admin.port).await?;
        info!("Sufuss admin API listening on http://{admin_addr}");
        let admin_app = build_admin_router(state);
        let admin_server = async {
            axum::serve(admin, admin_app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|e| LicenseError::ServerError(format!("admin server failed: {e}")))
        };
        tokio::try_join!(public_server, admin_server)?;
    } else {
        public_server.await?;
    }

    info!("Sufuss stopped");
    Ok(())
}
