use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tx_node::{
  api::{self, TxNodeState},
  backend,
  config::NodeConfig,
  monitor::EventMonitor,
  persist::ConfigFile,
  supervisor::Supervisor,
};

#[tokio::main]
async fn main() -> Result<()> {
  let _logging = telemetry::init_structured_logging(
    telemetry::LogConfig::new("tx-node").with_version(env!("CARGO_PKG_VERSION")),
  );

  let config = NodeConfig::parse();

  let config_file = match &config.config_path {
    Some(path) => ConfigFile::new(path),
    None => ConfigFile::resolve(),
  };
  let loaded = config_file.load_or_default();
  info!(
    path = %config_file.path().display(),
    rejected = loaded.rejections.len(),
    "desired configuration ready"
  );

  let backend = backend::create(config.backend)?;
  info!(backend = backend.name(), "pipeline backend selected");

  let supervisor = Supervisor::new(
    backend,
    loaded.config,
    config.supervisor_settings(),
    Some(config_file),
  );
  let monitor = EventMonitor::new(&supervisor, config.event_poll())
    .context("event attachments already taken")?;

  if let Err(e) = supervisor.start().await {
    error!(error = %e, "initial pipeline build failed");
    supervisor.stop().await;
    return Err(e).context("could not start the transmit pipeline");
  }
  let monitor_task = monitor.spawn();

  let app = api::router(TxNodeState::new(supervisor.clone()));
  let listener = TcpListener::bind(config.bind_addr)
    .await
    .with_context(|| format!("failed to bind {}", config.bind_addr))?;
  info!(addr = %config.bind_addr, "tx-node listening");

  axum::serve(listener, app.into_make_service())
    .with_graceful_shutdown(shutdown_signal(supervisor.shutdown_token()))
    .await?;

  supervisor.stop().await;
  if let Err(e) = monitor_task.await {
    warn!(error = %e, "event monitor ended abnormally");
  }

  if supervisor.fault_budget_exhausted().await {
    anyhow::bail!("pipeline kept failing; restart budget exhausted");
  }
  info!("tx-node stopped");
  Ok(())
}

/// Resolves on SIGINT/SIGTERM or when the supervisor gives up.
async fn shutdown_signal(supervisor_done: CancellationToken) {
  let ctrl_c = async {
    let _ = tokio::signal::ctrl_c().await;
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{signal, SignalKind};
    if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
      let _ = sigterm.recv().await;
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => info!("shutdown signal received"),
    _ = terminate => info!("shutdown signal received"),
    _ = supervisor_done.cancelled() => warn!("supervisor terminated, shutting down"),
  }
}
