//! `watchmux` - watch Kubernetes resources across namespaces and log every change
//!
//! ```bash
//! # In a pod, using its service account
//! watchmux --namespace default,kube-system
//!
//! # From a workstation, only pods and services labelled app=web, for 30 seconds
//! watchmux --kubeconfig ~/.kube/config --kinds Pods,Services --selector app=web --duration 30
//!
//! # More detail
//! RUST_LOG=watchmux=debug watchmux
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use watchmux::kubernetes::{KubeEvent, client_from_config, describe};
use watchmux::{Envelope, EventStream, KindTable, Multiplexer, WatchConfig};

/// Multiplex Kubernetes watches into one log
#[derive(Parser, Debug, Default)]
#[command(name = "watchmux", version, about)]
struct Args {
  /// Config file (defaults to ~/.config/watchmux/config.yaml)
  #[arg(long)]
  config: Option<PathBuf>,

  /// Name of this controller
  #[arg(long)]
  name: Option<String>,

  /// Namespaces to follow, comma separated
  #[arg(long)]
  namespace: Option<String>,

  /// Label selector, defaults to everything
  #[arg(long)]
  selector: Option<String>,

  /// Override apiserver, leave empty if running in cluster
  #[arg(long)]
  apiserver: Option<String>,

  /// Use custom kubeconfig, leave empty if running in cluster
  #[arg(long)]
  kubeconfig: Option<PathBuf>,

  /// Resource kinds to watch, comma separated (default: all)
  #[arg(long)]
  kinds: Option<String>,

  /// Close all watchers after this many seconds
  #[arg(long)]
  duration: Option<u64>,
}

fn split_list(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(ToString::to_string)
    .collect()
}

impl Args {
  /// Overlay command line flags onto the file config
  fn apply(self, config: &mut WatchConfig) {
    if let Some(name) = self.name {
      config.name = name;
    }
    if let Some(namespace) = self.namespace {
      config.namespaces = split_list(&namespace);
    }
    if let Some(selector) = self.selector {
      config.selector = Some(selector);
    }
    if let Some(apiserver) = self.apiserver {
      config.apiserver = Some(apiserver);
    }
    if let Some(kubeconfig) = self.kubeconfig {
      config.kubeconfig = Some(kubeconfig);
    }
    if let Some(kinds) = self.kinds {
      config.kinds = split_list(&kinds);
    }
    if let Some(duration) = self.duration {
      config.run_for_secs = Some(duration);
    }
  }
}

fn load_config(args: Args) -> Result<WatchConfig> {
  let path = args.config.clone().unwrap_or_else(WatchConfig::config_path);
  let mut config = WatchConfig::read_from(&path)?;
  args.apply(&mut config);
  Ok(config)
}

async fn log_events(mut events: EventStream<KubeEvent>) {
  while let Some(envelope) = events.recv().await {
    match envelope {
      Envelope::Data { payload, metadata } => {
        tracing::info!("[{metadata}] {}", describe(&payload));
      }
      Envelope::SourceExited { metadata, reason } => {
        tracing::error!("{metadata}: Watcher stopped ({reason})");
      }
      Envelope::ShutdownComplete => {
        tracing::info!("Finished closing all listeners");
      }
    }
  }
  tracing::debug!("Listener exited");
}

async fn wait_for_stop(run_for: Option<Duration>) {
  let deadline = async {
    match run_for {
      Some(duration) => tokio::time::sleep(duration).await,
      None => std::future::pending::<()>().await,
    }
  };

  tokio::select! {
    () = deadline => tracing::info!("Run time elapsed"),
    result = tokio::signal::ctrl_c() => {
      if let Err(e) = result {
        tracing::warn!("Unable to listen for Ctrl-C: {e}");
      }
      tracing::info!("Interrupted");
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("watchmux=info")))
    .init();

  let config = load_config(Args::parse())?;
  tracing::info!("Starting {}", config.name);

  let client = match client_from_config(&config).await {
    Ok(client) => client,
    Err(e) => {
      tracing::error!("Error when trying to create client: {e:#}");
      std::process::exit(1);
    }
  };

  let (mux, events) = Multiplexer::new(&config.mux)?;
  if let Err(e) = mux.register(&config.name, client, config.namespaces.clone()).await {
    tracing::error!("{e}");
    std::process::exit(1);
  }

  let listener = tokio::spawn(log_events(events));

  let table = KindTable::builtin();
  let started = mux.spawn_kinds(&table, &config.kinds, &config.filter())?;
  tracing::info!("Started {started} watchers");

  wait_for_stop(config.run_for_secs.map(Duration::from_secs)).await;
  mux.close().await;
  listener.await?;

  tracing::info!("Stopping");
  Ok(())
}
