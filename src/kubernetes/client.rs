//! Kubernetes client construction

use std::path::Path;

use anyhow::Result;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::config::WatchConfig;
use crate::mux::NamespaceLister;

impl NamespaceLister for Client {
  async fn list_namespaces(&self) -> Result<Vec<String>> {
    let api: Api<Namespace> = Api::all(self.clone());
    let namespaces = api.list(&ListParams::default()).await?;
    Ok(namespaces.items.into_iter().filter_map(|ns| ns.metadata.name).collect())
  }
}

/// Build a client from the pod's service account
pub async fn client_from_cluster() -> Result<Client> {
  let config = Config::incluster()?;
  client_from(config).await
}

/// Build a client from a kubeconfig file, optionally pointing it at another API server.
///
/// Without a path the usual `KUBECONFIG` / `~/.kube/config` lookup applies.
pub async fn client_from_file(apiserver: Option<&str>, kubeconfig: Option<&Path>) -> Result<Client> {
  let options = KubeConfigOptions::default();
  let mut config = match kubeconfig {
    Some(path) => {
      let kubeconfig = Kubeconfig::read_from(path)?;
      Config::from_custom_kubeconfig(kubeconfig, &options).await?
    }
    None => Config::from_kubeconfig(&options).await?,
  };

  if let Some(url) = apiserver.filter(|url| !url.is_empty()) {
    config.cluster_url = url.parse()?;
  }

  client_from(config).await
}

/// Pick in-cluster or kubeconfig construction based on `config`
pub async fn client_from_config(config: &WatchConfig) -> Result<Client> {
  if config.in_cluster() {
    client_from_cluster().await
  } else {
    client_from_file(config.apiserver.as_deref(), config.kubeconfig.as_deref()).await
  }
}

async fn client_from(config: Config) -> Result<Client> {
  tracing::info!("Creating API client for {}", config.cluster_url);
  let client = Client::try_from(config)?;

  let version = client.apiserver_version().await?;
  tracing::info!(
    "Kubernetes {}.{} ({}) - git ({}) commit {} - platform {}",
    version.major,
    version.minor,
    version.git_version,
    version.git_tree_state,
    version.git_commit,
    version.platform
  );

  Ok(client)
}
