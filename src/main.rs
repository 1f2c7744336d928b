//! # kinship
//!
//! Chat server binary: loads settings, opens the store and serves the
//! WebSocket and REST surface until interrupted.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kinship_server::{load_settings, ChatServer, JwtVerifier, Settings};
use kinship_store::{Database, SqliteChatStore};
use kinship_telemetry::{init_telemetry, TelemetryConfig};

/// Real-time presence and chat server.
#[derive(Parser, Debug)]
#[command(name = "kinship", about = "Real-time presence and chat server")]
struct Cli {
    /// Path to a JSON settings file.
    #[arg(long, env = "KINSHIP_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<String>,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.store.path.clone_from(path);
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref()).context("Failed to load settings")?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let telemetry = TelemetryConfig::from_levels(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    )?;
    let _telemetry = init_telemetry(telemetry)?;

    let secret = settings
        .auth
        .jwt_secret
        .as_ref()
        .context("No JWT secret configured (set KINSHIP_JWT_SECRET)")?;
    let verifier = Arc::new(JwtVerifier::new(secret, settings.auth.leeway_secs));

    ensure_parent_dir(Path::new(&settings.store.path))?;
    let db = Database::open(&settings.store.path, &settings.store.connection_config())
        .with_context(|| format!("Failed to open database: {}", settings.store.path))?;
    tracing::info!(path = %settings.store.path, "database opened");
    let store = Arc::new(SqliteChatStore::new(db));

    let handle = ChatServer::new(settings.server.clone(), store, verifier)
        .listen()
        .await
        .context("Failed to start server")?;
    tracing::info!(addr = %handle.addr, "kinship server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
