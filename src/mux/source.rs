//! Watch sources and the specs that open them
//!
//! A watch source is anything that yields a stream of change events and can be
//! asked to stop. The multiplexer never looks inside the items; it only needs
//! a [`WatchSpec`] that knows how to open a source for a client and namespace.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A stream of change events that can be told to stop.
///
/// After [`stop`](WatchSource::stop) the stream may still yield items it had
/// already buffered, and must then end by returning `None`.
pub trait WatchSource: Stream + Send + Unpin {
  fn stop(&mut self);
}

impl<S: WatchSource + ?Sized> WatchSource for Box<S> {
  fn stop(&mut self) {
    (**self).stop();
  }
}

pub type BoxSource<P> = Box<dyn WatchSource<Item = P>>;

/// Filter options forwarded unmodified to every opened source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchFilter {
  pub label_selector: Option<String>,
  pub field_selector: Option<String>,
  /// Server-side timeout for the watch call
  pub timeout_secs: Option<u32>,
  /// Resource version to start from, `"0"` when unset
  pub resource_version: Option<String>,
}

impl WatchFilter {
  pub fn with_labels(mut self, selector: impl Into<String>) -> Self {
    self.label_selector = Some(selector.into());
    self
  }

  pub fn with_fields(mut self, selector: impl Into<String>) -> Self {
    self.field_selector = Some(selector.into());
    self
  }

  pub fn resource_version(&self) -> &str {
    self.resource_version.as_deref().unwrap_or("0")
  }
}

type OpenFuture<P> = BoxFuture<'static, anyhow::Result<BoxSource<P>>>;
type OpenFn<C, P> = dyn Fn(C, String, WatchFilter) -> OpenFuture<P> + Send + Sync;

/// A resource kind and the capability to open a watch source for it.
///
/// Specs are stateless and can be reused for every client and namespace.
pub struct WatchSpec<C, P> {
  name: String,
  open: Arc<OpenFn<C, P>>,
}

impl<C, P> WatchSpec<C, P>
where
  C: Send + 'static,
  P: Send + 'static,
{
  /// Build a spec from an async `open(client, namespace, filter)` function
  pub fn new<F, Fut, S>(name: impl Into<String>, open: F) -> Self
  where
    F: Fn(C, String, WatchFilter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<S>> + Send + 'static,
    S: WatchSource<Item = P> + 'static,
  {
    let open = move |client: C, namespace: String, filter: WatchFilter| -> OpenFuture<P> {
      let opening = open(client, namespace, filter);
      Box::pin(async move {
        let source = opening.await?;
        Ok(Box::new(source) as BoxSource<P>)
      })
    };

    Self {
      name: name.into(),
      open: Arc::new(open),
    }
  }
}

impl<C, P> WatchSpec<C, P> {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub(crate) fn open(&self, client: C, namespace: String, filter: WatchFilter) -> OpenFuture<P> {
    (self.open)(client, namespace, filter)
  }
}

impl<C, P> Clone for WatchSpec<C, P> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      open: Arc::clone(&self.open),
    }
  }
}

impl<C, P> fmt::Debug for WatchSpec<C, P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WatchSpec").field("name", &self.name).finish_non_exhaustive()
  }
}

/// Watch source fed from an in-process channel
///
/// Stopping closes the receiver: buffered items are still yielded, further
/// sends fail, and the stream ends once the buffer is empty.
pub struct ChannelSource<T> {
  rx: mpsc::Receiver<T>,
}

impl<T> ChannelSource<T> {
  pub fn new(rx: mpsc::Receiver<T>) -> Self {
    Self { rx }
  }
}

/// Create a channel-backed source with the given buffer size
pub fn channel_source<T>(capacity: usize) -> (mpsc::Sender<T>, ChannelSource<T>) {
  let (tx, rx) = mpsc::channel(capacity);
  (tx, ChannelSource::new(rx))
}

impl<T> Stream for ChannelSource<T> {
  type Item = T;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    self.rx.poll_recv(cx)
  }
}

impl<T: Send> WatchSource for ChannelSource<T> {
  fn stop(&mut self) {
    self.rx.close();
  }
}
