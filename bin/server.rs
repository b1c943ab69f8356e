// Methane Hotspots - Web Server
// Dashboard page + JSON API over the emitter store

use anyhow::{Context, Result};
use clap::Parser;
use methane_hotspots::api::{router, AppState};
use methane_hotspots::{init_tracing, open_database, Settings};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "methane-server")]
#[command(version, about = "Methane Hotspot API and dashboard")]
struct Args {
    #[command(flatten)]
    settings: Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let settings = Args::parse().settings;

    let conn = open_database(&settings.database_path)?;
    info!(path = %settings.database_path.display(), "database opened");

    let app = router(AppState::new(conn, settings.app_version.clone()));

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind_addr))?;

    info!(addr = %settings.bind_addr, version = %settings.app_version, "server listening");
    info!("   UI:  http://{}/", settings.bind_addr);
    info!("   API: http://{}/emitters", settings.bind_addr);

    axum::serve(listener, app).await.context("Server terminated")?;
    Ok(())
}
