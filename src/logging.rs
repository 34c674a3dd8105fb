//! Diagnostic logging.
//!
//! stdout carries the IPC protocol, so every event goes to stderr.
//! `RUST_LOG` wins over `--log-level` when both are set.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "tutord=info,warn";

pub fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match level {
            Some(l) => EnvFilter::try_new(format!("tutord={},warn", l.trim()))?,
            None => EnvFilter::new(DEFAULT_FILTER),
        },
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        "tutord starting"
    );
    Ok(())
}
