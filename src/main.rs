// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use castor::config::ImageConfig;
use castor::constants::{DEFAULT_WORKERS, ENV_WORKERS};
use castor::controller::Controller;
use castor::store::KubeStore;
use kube::Client;
use std::sync::Arc;
use tracing::{debug, info};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("castor-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Respects RUST_LOG environment variable if set, otherwise defaults to
    // INFO level. RUST_LOG_FORMAT=json switches to structured output for
    // log aggregation.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting Castor CSI driver deployment controller");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let images = ImageConfig::from_env();
    let workers = worker_count()?;

    let store = Arc::new(KubeStore::new(client.clone()));
    let controller = Controller::new(&client, store, images, workers);

    controller.run().await?;
    Ok(())
}

fn worker_count() -> Result<usize> {
    match std::env::var(ENV_WORKERS) {
        Ok(raw) => {
            let workers: usize = raw
                .parse()
                .map_err(|_| anyhow::anyhow!("{ENV_WORKERS} must be a positive integer, got {raw:?}"))?;
            if workers == 0 {
                anyhow::bail!("{ENV_WORKERS} must be at least 1");
            }
            Ok(workers)
        }
        Err(_) => Ok(DEFAULT_WORKERS),
    }
}
