//! `pickbot` – process entry point for the pick-and-place stack.
//!
//! 1. Parses arguments and loads `pickbot.toml` (plus `PICKBOT_*` overrides).
//! 2. Initialises tracing (console, optional JSON log file, optional OTLP).
//! 3. Starts the requested services: the controller (ingress API + control
//!    loop) and/or the actuation API with its hardware backend.
//! 4. Intercepts **Ctrl-C** / SIGTERM: servers stop accepting, the control
//!    loop is cancelled and awaited for the configured grace period.

mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio::sync::{Notify, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use pickbot_gateway::{ActuationRouter, HttpServer, IngressRouter};
use pickbot_hal::HalBackend;
use pickbot_runtime::{CancelFlag, ControlLoop, InputBuffer, telemetry};
use pickbot_types::RobotError;

use crate::cli::{Cli, Command};
use crate::config::Config;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cfg = match config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    // Tracing must be up before the runtime exists; see `telemetry`.
    let _telemetry = telemetry::init_tracing("pickbot", cfg.log_path.as_deref());
    print_banner(cli.command(), &cfg);

    // ── Ctrl-C / SIGTERM ──────────────────────────────────────────────────
    let stop = Arc::new(Notify::new());
    let stop_handler = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Shutdown requested – stopping services …".yellow().bold());
        stop_handler.notify_one();
    }) {
        warn!(error = %e, "Failed to install signal handler; graceful shutdown will not be available");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command(), cfg, stop)) {
        Ok(()) => {
            info!("pickbot stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "pickbot failed");
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service wiring
// ─────────────────────────────────────────────────────────────────────────────

async fn run(command: Command, cfg: Config, stop: Arc<Notify>) -> Result<(), RobotError> {
    let cancel = CancelFlag::new();
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut servers = JoinSet::new();
    let mut control_loop = None;

    if command.runs_actuation() {
        let backend = HalBackend::from_config(&cfg.hardware, cfg.actuation.initial_gains());
        if let Some(reason) = &backend.fallback_reason {
            warn!(event = "hardware_fallback", reason = %reason, "actuation running on in-memory stores");
        }
        let server = HttpServer::new("actuation", ActuationRouter::new(backend)).with_port(cfg.actuation.port);
        servers.spawn(server.run(stopped(stop_rx.clone())));
    }

    if command.runs_controller() {
        let inputs = Arc::new(InputBuffer::new(cfg.controller.thresholds()));
        let server =
            HttpServer::new("controller", IngressRouter::new(Arc::clone(&inputs))).with_port(cfg.controller.port);
        servers.spawn(server.run(stopped(stop_rx.clone())));
        control_loop = Some(ControlLoop::from_config(&cfg.controller, inputs).spawn(cancel.clone()));
    }

    let result = tokio::select! {
        _ = stop.notified() => Ok(()),
        Some(joined) = servers.join_next() => match joined {
            Ok(result) => result,
            Err(e) => Err(RobotError::Network(format!("server task failed: {e}"))),
        },
    };

    // ── Shutdown: stop accepting, cancel the loop, wait out the grace ─────
    let _ = stop_tx.send(true);
    if let Some(handle) = control_loop {
        pickbot_runtime::shutdown(&cancel, handle, cfg.controller.shutdown_grace()).await;
    }
    while let Some(joined) = servers.join_next().await {
        if let Ok(Err(e)) = joined {
            warn!(error = %e, "server exited with error during shutdown");
        }
    }
    result
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(command: Command, cfg: &Config) {
    println!();
    println!(
        "  {} {}",
        "pickbot".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    if command.runs_controller() {
        println!(
            "  {:<11} http://0.0.0.0:{}  {}",
            "controller".bold(),
            cfg.controller.port,
            format!("(tick {} ms)", cfg.controller.tick_interval_ms).dimmed()
        );
    }
    if command.runs_actuation() {
        println!(
            "  {:<11} http://0.0.0.0:{}  {}",
            "actuation".bold(),
            cfg.actuation.port,
            format!("(hardware: {})", cfg.hardware.requested_mode()).dimmed()
        );
    }
    println!();
}
