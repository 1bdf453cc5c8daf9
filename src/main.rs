use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod fetcher;
mod job;
mod locator;
mod publish;
mod server;
mod storage;
#[cfg(test)]
mod test_util;
mod util;

pub use error::{Error, Result};

use crate::{config::Config, server::AppState, storage::StorageArea};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    )
    .init();

  let config = Config::parse();

  let storage = StorageArea::init(&config.storage_dir)
    .await
    .with_context(|| {
      format!("failed to prepare {}", config.storage_dir.display())
    })?;
  let state = AppState::new(&config, storage)?;
  let app = server::router(Arc::new(state));

  let listener = std::net::TcpListener::bind(config.listen_address)
    .with_context(|| format!("failed to bind {}", config.listen_address))?;
  listener.set_nonblocking(true)?;

  info!(
    "Listening on {}, serving links as {}",
    config.listen_address, config.public_base_url
  );

  Toplevel::new(|s| async move {
    s.start(SubsystemBuilder::new("http", move |subsys| {
      server::serve(subsys, listener, app)
    }));
  })
  .catch_signals()
  .handle_shutdown_requests(Duration::from_secs(10))
  .await
  .map_err(Into::into)
}
