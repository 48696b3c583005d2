// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Inspection workstation status service.
//!
//! Runs the heartbeat server, the operator idle timer and the auto-mode
//! timing session, with an optional stdin console for operators.

mod config;
mod console;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};

use clap::Parser;
use log::{debug, error, info, warn};
use station_core::{CancelSignal, ConnectionServer, StationSession};
use tokio::sync::broadcast::{self, error::RecvError};

use config::AppConfig;
use status::{SharedStatusBoard, StatusBoard};

#[derive(Parser, Debug)]
#[command(name = "station-status", version, about = "Inspection workstation status service")]
struct Args {
    /// Path to a TOML config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Heartbeat server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Operator idle window in seconds
    #[arg(long)]
    idle_timer: Option<u64>,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(seconds) = args.idle_timer {
        config.idle_timer_seconds = seconds;
    }

    let server_config = match config.server.to_server_config() {
        Ok(server_config) => server_config,
        Err(e) => {
            error!("Invalid bind address '{}': {}", config.server.bind_address, e);
            return ExitCode::FAILURE;
        }
    };

    let board: SharedStatusBoard = Arc::new(Mutex::new(StatusBoard::new()));

    let session = StationSession::shared(config.total_auto_seconds);
    spawn_forwarder(session.subscribe(), Arc::clone(&board), |board, event| {
        board.apply_status_event(event);
    });
    session.set_total_parts(config.total_parts);
    session.set_idle_timer(config.idle_timer_seconds);
    session.enable_refresh(config.refresh_interval());

    let server = ConnectionServer::new(server_config);
    spawn_forwarder(server.subscribe(), Arc::clone(&board), |board, event| {
        board.apply_server_event(event);
    });
    if let Err(e) = server.start() {
        error!("Failed to start heartbeat server: {}", e);
        return ExitCode::FAILURE;
    }

    let shutdown = CancelSignal::new();
    if !args.no_console {
        let session = Arc::clone(&session);
        let board = Arc::clone(&board);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { console::run(&session, board, shutdown).await });
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Interrupted, shutting down");
        }
        () = shutdown.cancelled() => info!("Shutting down"),
    }

    shutdown.request_cancel();
    server.stop();
    session.disable_refresh();

    info!(
        "Final status: auto total {} ({}h), {} parts",
        session.total_auto_time(),
        session.total_hours(),
        session.total_parts()
    );
    ExitCode::SUCCESS
}

fn load_config(args: &Args) -> Result<AppConfig, confy::ConfyError> {
    match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            AppConfig::load_from(path)
        }
        None => {
            if let Ok(path) = AppConfig::get_config_path() {
                info!("Loading configuration from {}", path.display());
            }
            AppConfig::load()
        }
    }
}

/// Feed every event from `rx` into the status board.
fn spawn_forwarder<E, F>(mut rx: broadcast::Receiver<E>, board: SharedStatusBoard, apply: F)
where
    E: Clone + Send + 'static,
    F: Fn(&mut StatusBoard, &E) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let mut board = board.lock().unwrap_or_else(PoisonError::into_inner);
                    apply(&mut board, &event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Status board skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return,
            }
        }
    });
}
