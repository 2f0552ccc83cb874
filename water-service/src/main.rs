use anyhow::Result;
use std::{net::SocketAddr, sync::Arc};
use water_service::{
    api::{self, AppState},
    config::AppConfig,
    loader::Loader,
    metrics_server, observability,
    session::SessionHandle,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = Arc::new(AppConfig::load()?);

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;

    let loader = Arc::new(Loader::connect(cfg.clone(), SessionHandle::new()).await?);

    // Serve even when the first load fails; POST /refresh can retry.
    if let Err(e) = loader.load().await {
        tracing::error!(error = %e, "initial snapshot load failed");
    }

    let app = api::router(AppState::new(loader));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "water loss API listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
