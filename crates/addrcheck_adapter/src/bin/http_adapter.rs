#![forbid(unsafe_code)]

use std::{env, net::SocketAddr, sync::Arc};

use addrcheck_adapter::{http::router, AdapterRuntime, DEFAULT_HTTP_BIND, ENV_HTTP_BIND};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind = env::var(ENV_HTTP_BIND).unwrap_or_else(|_| DEFAULT_HTTP_BIND.to_string());
    let addr: SocketAddr = bind.parse()?;

    let runtime = Arc::new(AdapterRuntime::default_from_env()?);
    let app = router(runtime);

    info!(%addr, "addrcheck_adapter_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("addrcheck_adapter_http stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
