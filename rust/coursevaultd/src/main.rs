mod backup;
mod cascade;
mod cloud;
mod config;
mod error;
mod guard;
mod hierarchy;
mod ipc;
mod logging;
mod migrate;
mod model;
mod propagate;
mod store;
mod validate;

use anyhow::Context;
use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    logging::init();
    let mut state = ipc::AppState::new();

    if let Some(path) = config::settings_path_from_env() {
        match state.select_workspace(&path) {
            Ok(()) => info!(settings = %path.display(), "workspace selected from environment"),
            Err(e) => warn!(settings = %path.display(), error = %e, "could not open workspace"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // No id to echo back.
                warn!(error = %e, "unparsable request line");
                json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                })
            }
        };
        writeln!(stdout, "{}", resp).context("failed to write response")?;
        stdout.flush().context("failed to flush response")?;
    }
    Ok(())
}
