// ===============================
// src/main.rs
// ===============================
/*
 # jalankan terhadap test exchange
 TEAM_NAME=mankey cargo run --release -- --test prod-like

 # metrics + rekaman sesi
 METRICS_PORT=9898 RECORD_FILE=logs/session.jsonl cargo run --release -- --production
 curl -s localhost:9898/metrics | grep '^position'
*/
/*
=============================================================================
Project : etc_client — line-delimited JSON client for an ETC exchange simulator
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Connects to the exchange over TCP, tracks our own orders and
          positions through ack/fill/out/reject, reconciles resting order
          layouts, runs the bond / market-making / arbitrage strategies,
          exposes Prometheus metrics, and records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::process::ExitCode;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use etc_client::{config, domain::Event, metrics, recorder, session};

// Satu thread: receive loop, ledger, dan strategi berjalan berurutan
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Load config & limits ----
    let (args, limits) = match config::load() {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    // ---- Metrics ----
    metrics::init();
    if args.metrics_port != 0 {
        metrics::serve_metrics(args.metrics_port);
    }

    info!(
        team = %args.team,
        host = %args.exchange.host,
        port = args.exchange.port,
        connect_timeout = ?args.exchange.connect_timeout,
        record_file = ?args.record_file,
        order_cooldown = ?limits.order_cooldown,
        "startup config"
    );

    // ---- Recorder (optional) ----
    let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
    let recorder_task = args.record_file.clone().map(|path| tokio::spawn(recorder::run(rec_rx, path)));

    // ---- Session ----
    let result = session::connect_and_run(&args, limits, rec_tx).await;

    if let Some(task) = recorder_task {
        let _ = task.await;
    }

    match result {
        Ok(summary) => {
            info!(messages = summary.messages, positions = ?summary.positions, "round ended");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "session terminated");
            ExitCode::FAILURE
        }
    }
}
