//! Replication engine binary (§4.2): loads the two config files, wires a
//! [`SessionManager`] and [`ReplicationEngine`] together, and runs the
//! poll loop until interrupted.
//!
//! The real terminal client library is an external collaborator (§1) and
//! out of scope; this binary runs against [`copier_core::sim_broker::SimBroker`]
//! so the engine is runnable end-to-end for local testing and demos. A
//! production deployment swaps in a `BrokerClient` implementation wrapping
//! the broker's native client API.

use anyhow::{Context, Result};
use clap::Parser;
use copier_core::audit_log::AuditLog;
use copier_core::config::{load_credentials, load_symbol_mapping};
use copier_core::engine::{EngineConfig, ReplicationEngine};
use copier_core::session::SessionManager;
use copier_core::sim_broker::SimBroker;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "copier-engine", about = "Mirrors master positions onto a slave account")]
struct Args {
    /// Directory containing credentials.csv and symbol_mapping.csv
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Audit log output path
    #[arg(long, default_value = "orderlog.txt")]
    audit_log: PathBuf,
}

fn init_logging() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    tracing::info!("Starting trade copier replication engine...");

    let credentials = load_credentials(args.config_dir.join("credentials.csv"))
        .context("failed to load credentials.csv")?;
    let symbol_mapping = load_symbol_mapping(args.config_dir.join("symbol_mapping.csv"))
        .context("failed to load symbol_mapping.csv")?;
    tracing::info!(symbols = symbol_mapping.len(), "loaded symbol mapping");

    let broker = Arc::new(SimBroker::new());
    let session = Arc::new(SessionManager::new(broker));
    let audit = AuditLog::open(&args.audit_log).context("failed to open audit log")?;

    let mut engine = ReplicationEngine::new(
        session,
        credentials.master,
        credentials.slave,
        symbol_mapping,
        audit,
        EngineConfig::default(),
    );

    engine.start().await.context("engine start-up failed")?;

    tokio::select! {
        result = engine.run_forever() => {
            result.context("replication engine exited")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested, stopping");
        }
    }

    Ok(())
}
