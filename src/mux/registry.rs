//! Registered clients and their validated namespaces

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Capability to ask a cluster which namespaces exist
pub trait NamespaceLister: Clone + Send + Sync + 'static {
  fn list_namespaces(&self) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send;
}

/// A client registered with the multiplexer
#[derive(Debug)]
pub struct ClientRegistration<C> {
  identifier: String,
  client: C,
  namespaces: Vec<String>,
}

impl<C> ClientRegistration<C> {
  pub fn identifier(&self) -> &str {
    &self.identifier
  }

  pub fn client(&self) -> &C {
    &self.client
  }

  /// Namespaces confirmed to exist, in the order they were requested
  pub fn namespaces(&self) -> &[String] {
    &self.namespaces
  }
}

/// Outcome of a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
  pub identifier: String,
  pub accepted: Vec<String>,
  /// Requested namespaces that were not found upstream
  pub rejected: Vec<String>,
}

impl Registration {
  pub fn is_partial(&self) -> bool {
    !self.rejected.is_empty()
  }
}

/// Split requested namespaces into those present upstream and those missing.
///
/// Blank names are skipped and duplicates collapse onto their first occurrence.
pub fn resolve_namespaces<S: AsRef<str>>(requested: &[String], available: &[S]) -> (Vec<String>, Vec<String>) {
  let mut accepted: Vec<String> = Vec::new();
  let mut rejected: Vec<String> = Vec::new();

  for ns in requested.iter().map(|ns| ns.trim()).filter(|ns| !ns.is_empty()) {
    if accepted.iter().chain(rejected.iter()).any(|seen| seen == ns) {
      continue;
    }
    if available.iter().any(|item| item.as_ref() == ns) {
      accepted.push(ns.to_string());
    } else {
      rejected.push(ns.to_string());
    }
  }

  (accepted, rejected)
}

/// Append-only set of client registrations
pub(crate) struct Registry<C> {
  clients: RwLock<Vec<Arc<ClientRegistration<C>>>>,
}

impl<C: NamespaceLister> Registry<C> {
  pub(crate) fn new() -> Self {
    Self {
      clients: RwLock::new(Vec::new()),
    }
  }

  /// Validate the requested namespaces against the client's namespace list.
  ///
  /// Nothing is stored; call [`Registry::insert`] with the result.
  pub(crate) async fn validate(
    &self,
    identifier: &str,
    client: C,
    requested: Vec<String>,
  ) -> Result<(ClientRegistration<C>, Registration)> {
    if requested.iter().all(|ns| ns.trim().is_empty()) {
      return Err(Error::NoNamespaces(identifier.to_string()));
    }
    if self.contains(identifier) {
      return Err(Error::DuplicateClient(identifier.to_string()));
    }

    let available = client.list_namespaces().await.map_err(|e| Error::ListNamespaces {
      identifier: identifier.to_string(),
      source: e.into(),
    })?;

    let (accepted, rejected) = resolve_namespaces(&requested, &available);
    for ns in &rejected {
      tracing::warn!("Couldn't find namespace '{ns}' for client '{identifier}'");
    }
    if accepted.is_empty() {
      return Err(Error::NoMatchingNamespaces {
        identifier: identifier.to_string(),
        rejected,
      });
    }

    let registration = Registration {
      identifier: identifier.to_string(),
      accepted: accepted.clone(),
      rejected,
    };
    let entry = ClientRegistration {
      identifier: identifier.to_string(),
      client,
      namespaces: accepted,
    };
    Ok((entry, registration))
  }

  pub(crate) fn insert(&self, entry: ClientRegistration<C>) -> Result<()> {
    let mut clients = self.clients.write();
    if clients.iter().any(|c| c.identifier == entry.identifier) {
      return Err(Error::DuplicateClient(entry.identifier));
    }
    clients.push(Arc::new(entry));
    Ok(())
  }

  pub(crate) fn contains(&self, identifier: &str) -> bool {
    self.clients.read().iter().any(|c| c.identifier == identifier)
  }

  pub(crate) fn snapshot(&self) -> Vec<Arc<ClientRegistration<C>>> {
    self.clients.read().clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Clone, Debug)]
  struct FakeCluster {
    namespaces: Option<Vec<&'static str>>,
  }

  impl NamespaceLister for FakeCluster {
    async fn list_namespaces(&self) -> anyhow::Result<Vec<String>> {
      match &self.namespaces {
        Some(names) => Ok(names.iter().map(ToString::to_string).collect()),
        None => Err(anyhow::anyhow!("apiserver unreachable")),
      }
    }
  }

  fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
  }

  #[test]
  fn test_resolve_intersection() {
    let (accepted, rejected) = resolve_namespaces(&strings(&["default", "kube-system"]), &["default", "prod"]);
    assert_eq!(accepted, vec!["default"]);
    assert_eq!(rejected, vec!["kube-system"]);
  }

  #[test]
  fn test_resolve_skips_blank_and_duplicates() {
    let (accepted, rejected) = resolve_namespaces(&strings(&["", "prod", " default ", "prod", "nope", "nope"]), &[
      "default", "prod",
    ]);
    assert_eq!(accepted, vec!["prod", "default"]);
    assert_eq!(rejected, vec!["nope"]);
  }

  #[tokio::test]
  async fn test_validate_partial() {
    let registry = Registry::new();
    let cluster = FakeCluster {
      namespaces: Some(vec!["default", "prod"]),
    };

    let (entry, registration) = registry
      .validate("local", cluster, strings(&["default", "kube-system"]))
      .await
      .unwrap();

    assert_eq!(entry.namespaces(), ["default".to_string()]);
    assert_eq!(registration.accepted, vec!["default"]);
    assert_eq!(registration.rejected, vec!["kube-system"]);
    assert!(registration.is_partial());

    registry.insert(entry).unwrap();
    assert!(registry.contains("local"));
    assert_eq!(registry.snapshot().len(), 1);
  }

  #[tokio::test]
  async fn test_validate_no_namespaces() {
    let registry = Registry::new();
    let cluster = FakeCluster {
      namespaces: Some(vec!["default"]),
    };

    let err = registry.validate("local", cluster.clone(), Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::NoNamespaces(ref id) if id == "local"));

    let err = registry.validate("local", cluster, strings(&[""])).await.unwrap_err();
    assert!(matches!(err, Error::NoNamespaces(_)));
  }

  #[tokio::test]
  async fn test_validate_listing_failure() {
    let registry = Registry::new();
    let cluster = FakeCluster { namespaces: None };

    let err = registry.validate("local", cluster, strings(&["default"])).await.unwrap_err();
    assert!(matches!(err, Error::ListNamespaces { .. }));
    assert!(err.is_fatal_misconfiguration());
  }

  #[tokio::test]
  async fn test_validate_nothing_matches() {
    let registry = Registry::new();
    let cluster = FakeCluster {
      namespaces: Some(vec!["default"]),
    };

    let err = registry.validate("local", cluster, strings(&["staging"])).await.unwrap_err();
    match err {
      Error::NoMatchingNamespaces { identifier, rejected } => {
        assert_eq!(identifier, "local");
        assert_eq!(rejected, vec!["staging"]);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn test_duplicate_identifier() {
    let registry = Registry::new();
    let cluster = FakeCluster {
      namespaces: Some(vec!["default"]),
    };

    let (entry, _) = registry.validate("local", cluster.clone(), strings(&["default"])).await.unwrap();
    registry.insert(entry).unwrap();

    let err = registry.validate("local", cluster, strings(&["default"])).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateClient(_)));
  }
}
