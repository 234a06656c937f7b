//! Kubernetes watch sources and the built-in kind table
//!
//! Every kind is watched as a `DynamicObject`, so all of them share one payload
//! type and one generic `open` path. Which API group and version a kind lives
//! in comes from `k8s-openapi`; nothing here is per-kind code.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{
  ComponentStatus, ConfigMap, Endpoints, LimitRange, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod,
  Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{Api, ApiResource, DynamicObject, WatchEvent, WatchParams};
use kube::{Client, Resource, ResourceExt};

use crate::mux::{KindTable, WatchFilter, WatchSource, WatchSpec};

/// Payload carried for every Kubernetes kind
pub type KubeEvent = WatchEvent<DynamicObject>;

pub type KubeSpec = WatchSpec<Client, KubeEvent>;

/// A raw watch call against the API server
///
/// Transport errors end the stream; there is no relist or reconnect.
pub struct KubeSource {
  stream: Option<BoxStream<'static, kube::Result<KubeEvent>>>,
}

impl KubeSource {
  pub fn new(stream: BoxStream<'static, kube::Result<KubeEvent>>) -> Self {
    Self { stream: Some(stream) }
  }
}

impl Stream for KubeSource {
  type Item = KubeEvent;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<KubeEvent>> {
    let Some(stream) = self.stream.as_mut() else {
      return Poll::Ready(None);
    };

    match stream.poll_next_unpin(cx) {
      Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(event)),
      Poll::Ready(Some(Err(e))) => {
        tracing::warn!("Watch stream failed: {e}");
        self.stream = None;
        Poll::Ready(None)
      }
      Poll::Ready(None) => {
        self.stream = None;
        Poll::Ready(None)
      }
      Poll::Pending => Poll::Pending,
    }
  }
}

impl WatchSource for KubeSource {
  fn stop(&mut self) {
    // dropping the body closes the HTTP watch
    self.stream = None;
  }
}

fn watch_params(filter: &WatchFilter) -> WatchParams {
  let mut params = WatchParams::default();
  if let Some(labels) = &filter.label_selector {
    params = params.labels(labels);
  }
  if let Some(fields) = &filter.field_selector {
    params = params.fields(fields);
  }
  if let Some(timeout) = filter.timeout_secs {
    params = params.timeout(timeout);
  }
  params
}

async fn open_watch(api: Api<DynamicObject>, filter: WatchFilter) -> anyhow::Result<KubeSource> {
  let stream = api.watch(&watch_params(&filter), filter.resource_version()).await?;
  Ok(KubeSource::new(stream.boxed()))
}

impl WatchSpec<Client, KubeEvent> {
  /// Spec for a namespaced kind, watched in each registered namespace
  pub fn namespaced<K>(name: &str) -> Self
  where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
  {
    let resource = ApiResource::erase::<K>(&());
    WatchSpec::new(name, move |client: Client, namespace: String, filter: WatchFilter| {
      let api = Api::<DynamicObject>::namespaced_with(client, &namespace, &resource);
      open_watch(api, filter)
    })
  }

  /// Spec for a cluster-scoped kind
  ///
  /// The namespace is only used for attribution; every watcher of this kind
  /// sees the whole cluster.
  pub fn cluster<K>(name: &str) -> Self
  where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
  {
    let resource = ApiResource::erase::<K>(&());
    WatchSpec::new(name, move |client: Client, _namespace: String, filter: WatchFilter| {
      let api = Api::<DynamicObject>::all_with(client, &resource);
      open_watch(api, filter)
    })
  }
}

impl KindTable<Client, KubeEvent> {
  /// Every kind the `watchmux` binary knows about
  pub fn builtin() -> Self {
    let mut table = KindTable::new();
    table.insert(KubeSpec::namespaced::<DaemonSet>("DaemonSets"));
    table.insert(KubeSpec::namespaced::<Deployment>("Deployments"));
    table.insert(KubeSpec::namespaced::<Ingress>("Ingresses"));
    table.insert(KubeSpec::namespaced::<ReplicaSet>("ReplicaSets"));
    table.insert(KubeSpec::cluster::<ComponentStatus>("ComponentStatuses"));
    table.insert(KubeSpec::namespaced::<ConfigMap>("ConfigMaps"));
    table.insert(KubeSpec::namespaced::<Endpoints>("Endpoints"));
    table.insert(KubeSpec::namespaced::<LimitRange>("LimitRanges"));
    table.insert(KubeSpec::cluster::<Namespace>("Namespaces"));
    table.insert(KubeSpec::cluster::<Node>("Nodes"));
    table.insert(KubeSpec::namespaced::<PersistentVolumeClaim>("PersistentVolumeClaims"));
    table.insert(KubeSpec::cluster::<PersistentVolume>("PersistentVolumes"));
    table.insert(KubeSpec::namespaced::<Pod>("Pods"));
    table.insert(KubeSpec::namespaced::<ServiceAccount>("ServiceAccounts"));
    table.insert(KubeSpec::namespaced::<Service>("Services"));
    table
  }
}

/// Short human-readable form of an event, e.g. `ADDED default/web`
pub fn describe(event: &KubeEvent) -> String {
  let (action, object) = match event {
    WatchEvent::Added(obj) => ("ADDED", obj),
    WatchEvent::Modified(obj) => ("MODIFIED", obj),
    WatchEvent::Deleted(obj) => ("DELETED", obj),
    WatchEvent::Bookmark(_) => return "BOOKMARK".to_string(),
    WatchEvent::Error(e) => return format!("ERROR {e:?}"),
  };

  match object.namespace() {
    Some(ns) => format!("{action} {ns}/{}", object.name_any()),
    None => format!("{action} {}", object.name_any()),
  }
}
