//! Master state publisher binary (§4.3): logs into the master account
//! only, polls positions, and serves a compact JSON snapshot via file and
//! optional HTTP — so an in-terminal agent on the slave side can act with
//! sub-tick latency without the replication engine's account-switch cost.
//!
//! Grounded on `examples/original_source/master_feed.py`'s `main` loop,
//! restructured around `copier_core::publisher` and an injected
//! `BrokerClient`. As with the engine binary, the real terminal client is
//! out of scope, so this runs against `SimBroker` by default.

mod http;

use anyhow::{Context, Result};
use clap::Parser;
use copier_core::config::{load_credentials, load_symbol_mapping};
use copier_core::model::SymbolMapping;
use copier_core::publisher::{ChangeMemo, MasterState};
use copier_core::sim_broker::SimBroker;
use copier_core::BrokerClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "copier-publisher", about = "Publishes master account positions as a JSON snapshot")]
struct Args {
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    #[arg(long, default_value_t = 200)]
    poll_interval_ms: u64,
}

fn init_logging() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// `MT5_COPIER_OUTPUT_DIR` — directory the file output is written to.
/// Defaults to the current directory, matching `master_feed.py`.
fn output_dir() -> PathBuf {
    std::env::var("MT5_COPIER_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// `MT5_COPIER_HTTP_PORT` — `0` (the default) disables the HTTP endpoint.
fn http_port() -> u16 {
    std::env::var("MT5_COPIER_HTTP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Best-effort atomic write: write to a sibling temp file, then rename
/// over the destination so readers never observe a partial write.
fn write_atomic(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let credentials = load_credentials(args.config_dir.join("credentials.csv"))
        .context("failed to load credentials.csv")?;
    let symbol_mapping: Vec<SymbolMapping> =
        load_symbol_mapping(args.config_dir.join("symbol_mapping.csv"))
            .context("failed to load symbol_mapping.csv")?
            .into_values()
            .collect();

    let broker: Arc<dyn BrokerClient> = Arc::new(SimBroker::new());
    broker.initialise().await.context("terminal initialisation failed")?;
    broker
        .login(&credentials.master)
        .await
        .context("master account login failed")?;

    let out_dir = output_dir();
    std::fs::create_dir_all(&out_dir).ok();
    let state_path = out_dir.join("master_state.json");

    let (tx, rx) = watch::channel(String::from("{}"));

    let port = http_port();
    if port != 0 {
        tokio::spawn(async move {
            if let Err(e) = http::serve(port, rx).await {
                tracing::error!(error = %e, "HTTP publisher task exited");
            }
        });
        tracing::info!(port, "HTTP output enabled at http://127.0.0.1:{port}/state");
    } else {
        tracing::info!("HTTP output disabled (MT5_COPIER_HTTP_PORT=0)");
    }

    tracing::info!(path = %state_path.display(), "writing master state to file");

    let mut memo = ChangeMemo::new();
    let poll_interval = Duration::from_millis(args.poll_interval_ms);

    loop {
        match broker.positions_get(None).await {
            Ok(positions) => {
                if memo.content_changed(&positions, &symbol_mapping) {
                    let now = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs_f64();
                    let state = MasterState::build(&positions, &symbol_mapping, now);
                    match state.to_compact_json() {
                        Ok(json) => {
                            if let Err(e) = write_atomic(&state_path, &json) {
                                tracing::error!(error = %e, "failed to write master state file");
                            }
                            let _ = tx.send(json);
                        }
                        Err(e) => tracing::error!(error = %e, "failed to serialise master state"),
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "positions_get failed, will retry next poll"),
        }
        tokio::time::sleep(poll_interval).await;
    }
}
