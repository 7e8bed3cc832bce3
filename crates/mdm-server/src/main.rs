//! mdm-server binary.
//!
//! Reads `mdm.toml` (or the path specified with `--config`) and `MDM_*`
//! environment variables, opens the SQLite store, and serves the MDM JSON API
//! under `/api`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use mdm_api::{Services, api_router};
use mdm_core::privacy::SourceFilter;
use mdm_server::{ServerConfig, TracingSink, WeightedFieldClassifier};
use mdm_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "MDM entity resolution server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "mdm.toml")]
  config: PathBuf,

  /// Print the effective configuration and exit.
  #[arg(long)]
  check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("MDM").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if cli.check_config {
    println!("{server_cfg:#?}");
    return Ok(());
  }

  if server_cfg
    .matching
    .iter()
    .all(|m| m.id != server_cfg.engine.match_configuration)
  {
    tracing::warn!(
      configuration = %server_cfg.engine.match_configuration,
      "matching configuration not defined; candidate detection will be unavailable"
    );
  }

  let store_path = server_cfg.expanded_store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let services = Services::new(
    Arc::new(store),
    Arc::new(WeightedFieldClassifier::new(server_cfg.matching.clone())),
    Arc::new(SourceFilter),
    Arc::new(TracingSink),
    &server_cfg.engine,
  );

  let app = Router::new()
    .nest("/api", api_router(services))
    .layer(TraceLayer::new_for_http());
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
