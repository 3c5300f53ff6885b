// Fin Insight - Web Server
// REST API over the metrics, benchmark and ingestion layer

use anyhow::{Context, Result};
use fin_insight::api::{build_router, AppState};
use fin_insight::{init_tracing, setup_database, AppConfig};
use rusqlite::Connection;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();
    init_tracing(&config);

    println!("🌐 Fin Insight - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    setup_database(&conn)?;
    println!("✓ Database opened: {}", config.db_path.display());

    let app = build_router(AppState::new(conn));

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;

    info!(addr = %config.addr, "server listening");
    println!("\n🚀 Server running on http://{}", config.addr);
    println!("   API: http://{}/api/metrics", config.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
