pub mod access;
pub mod auth;
pub mod backend;
pub mod config;
pub mod db;
pub mod errors;
pub mod facades;
pub mod logging;
pub mod models;
pub mod pages;
pub mod server;
pub mod session;
pub mod storage;

use crate::backend::Backend;
use crate::config::PortalConfig;
use crate::server::AppState;

const SESSION_PURGE_INTERVAL_SECS: u64 = 3_600;

/// Opens the backing store and serves the portal until shutdown.
pub async fn run(config: PortalConfig) -> anyhow::Result<()> {
    let backend = Backend::open(&config)?;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(backend, config);

    tokio::spawn({
        let auth = state.auth().clone();
        async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(SESSION_PURGE_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match auth.purge_expired() {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "expired sessions purged"),
                    Err(error) => tracing::warn!(error = %error, "session purge failed"),
                }
            }
        }
    });

    server::serve(state, &bind_addr).await
}
