//! Keygate license-key activation server.
//!
//! Usage:
//!   keygate --port 5000 --db keygate.db --admin-token <token>
//!
//! Keys are provisioned through the /admin endpoints; devices claim them via
//! GET /keys or POST /ids. The credential secret is generated on first run
//! and kept on disk next to the database.

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use keygate_engine::{AdminFacade, BindingEngine, HmacCredentialVerifier};
use keygate_server::{build_router, AppState};
use keygate_store::{KeyStore, SqliteKeyStore};

#[derive(Parser, Debug)]
#[command(name = "keygate")]
#[command(about = "License-key activation service")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Path to the SQLite key database
    #[arg(short, long, default_value = "keygate.db")]
    db: PathBuf,

    /// Bearer token required on /admin endpoints
    #[arg(long, env = "KEYGATE_ADMIN_TOKEN")]
    admin_token: String,

    /// Path to the credential secret file (generated on first run)
    #[arg(long, default_value = "keygate-secret.key")]
    secret: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Keygate starting...");
    let secret = load_or_generate_secret(&args.secret)?;
    let store: Arc<dyn KeyStore> = Arc::new(
        SqliteKeyStore::open(&args.db)
            .with_context(|| format!("Failed to open key store at {:?}", args.db))?,
    );
    let verifier = Arc::new(HmacCredentialVerifier::new(secret));

    let state = AppState {
        engine: Arc::new(BindingEngine::new(Arc::clone(&store), verifier)),
        admin: Arc::new(AdminFacade::new(store)),
        admin_token: args.admin_token.into(),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("Failed to bind port {}", args.port))?;
    info!("Keygate listening on port {}", args.port);
    info!("Key database: {:?}", args.db);
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}

fn load_or_generate_secret(path: &PathBuf) -> Result<Vec<u8>> {
    if path.exists() {
        info!("Loading credential secret from {:?}", path);
        fs::read(path).context("Failed to read credential secret")
    } else {
        info!("Generating new credential secret at {:?}", path);
        let mut secret = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        fs::write(path, &secret).context("Failed to write credential secret")?;
        Ok(secret)
    }
}
