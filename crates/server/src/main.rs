use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use fleet_core::TrackingServices;
use fleet_core::storage::SqliteTrackingStore;
use fleet_server::config::Args;
use fleet_server::create_router;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    init_tracing();
    let args = Args::parse();

    let store = SqliteTrackingStore::open(&args.database)
        .wrap_err_with(|| format!("opening database {}", args.database.display()))?;
    let config = args
        .tracking_config()
        .wrap_err("invalid tracking configuration")?;
    let services = TrackingServices::new(&config, Arc::new(store))
        .wrap_err("invalid tracking configuration")?;

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .wrap_err_with(|| format!("binding {}", args.bind))?;
    info!(addr = %listener.local_addr()?, database = %args.database.display(), "fleet server listening");

    let app = create_router(services, args.rate_limits());
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
