use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::Context;
use clap::Parser;
use serde_json::json;

use tutord::config::{Config, StorageMode};
use tutord::ipc;
use tutord::logging::init_logging;

#[derive(Debug, Parser)]
#[command(name = "tutord", version, about = "Tutoring school back office over stdio JSON lines")]
struct Args {
    /// Workspace directory to open at startup.
    #[arg(long, env = "TUTORD_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Config file; defaults to $TUTORD_CONFIG, then <workspace>/tutord.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage backend, overriding `[storage] mode`.
    #[arg(long, value_enum)]
    mode: Option<StorageMode>,

    /// Log level for tutord's own events when RUST_LOG is unset.
    #[arg(long)]
    log_level: Option<String>,
}

fn spawn_writer(rx: mpsc::Receiver<serde_json::Value>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for resp in rx {
            let line = serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
            if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
                break;
            }
        }
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;

    let mut config = Config::load(args.config.as_deref(), args.workspace.as_deref())
        .context("failed to load configuration")?;
    if let Some(mode) = args.mode {
        config.storage.mode = mode;
    }

    let (tx, rx) = mpsc::channel();
    let writer = spawn_writer(rx);
    let mut state = ipc::AppState::new(config, args.config.clone(), tx);

    if let Some(workspace) = &args.workspace {
        let mode = state.config.storage.mode;
        state
            .open_workspace(workspace, mode)
            .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // No id to answer to.
                Some(json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                }))
            }
        };
        if let Some(resp) = resp {
            if state.outbox.send(resp).is_err() {
                break;
            }
        }
    }

    // Pending debounced checks still hold outbox senders; the writer drains
    // their answers before it exits.
    drop(state);
    writer
        .join()
        .map_err(|_| anyhow::anyhow!("stdout writer panicked"))?;
    tracing::info!("tutord stopped");
    Ok(())
}
