#![allow(dead_code)]

use crate::{
    settings::{LogFormat, Settings},
    solver::{dynu::DynuSolver, Solver},
    webhook::Webhook,
};
use tokio::{io::BufReader, sync::watch};
use tracing::info;

mod dynu;
mod secrets;
mod settings;
mod solver;
mod webhook;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Settings::new()?;

    // stdout carries the payload responses
    match cfg.log_format {
        LogFormat::Text => {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    run(cfg).await
}

async fn run(cfg: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let mut solver = DynuSolver::new(cfg.handshake_timeout()?)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let cluster = kube::Config::infer().await?;
    solver.initialize(cluster, stop_rx).await?;

    info!(group = %cfg.group_name, solver = solver.name(), "webhook solver initialized");
    let webhook = Webhook::new(cfg.group_name, solver);

    tokio::select! {
        res = webhook.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => res?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    // The receiver may already be gone.
    let _ = stop_tx.send(true);
    Ok(())
}
