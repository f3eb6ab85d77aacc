use std::sync::Arc;

use anyhow::Context;
use tracing::{info, Level};

use crate::config::AppConfig;
use crate::db::Store;
use crate::notify::{EmailConfig, Mailer};
use crate::state::AppState;

mod config;
mod db;
mod notify;
mod portal;
mod schedule;
mod scheduler;
mod server;
mod state;
mod waitlist;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::from_env();
    let store = Arc::new(
        Store::open(&config.db_path)
            .with_context(|| format!("opening database at {}", config.db_path))?,
    );

    let mailer = match EmailConfig::from_env() {
        Some(email) => Some(Arc::new(Mailer::new(email))),
        None => {
            info!("SMTP_HOST not set, email notifications disabled");
            None
        }
    };

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(store, config, mailer));
    let router = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {bind_addr}"))?;
    info!(addr = %bind_addr, "seatwatch listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;
    Ok(())
}
