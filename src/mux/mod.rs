//! Fan-in multiplexer for watch streams
//!
//! One watcher task runs per (client, namespace, resource kind). Every task
//! sends into the same channel, and a single [`EventStream`] reads it.
//!
//! ```text
//! register() ──► Registry
//!                   │ spawn(spec)
//!                   ▼
//!      Watcher ─┐
//!      Watcher ─┼──► mpsc (capacity 1 by default) ──► EventStream
//!      Watcher ─┘                                         ▲
//!                                                         │ ShutdownComplete
//! close() ── cancel ──► all watchers ── TaskTracker::wait ┘
//! ```
//!
//! - Items from one watcher arrive in source order; watchers interleave freely
//! - Every watcher that started streaming sends exactly one `SourceExited`
//! - `ShutdownComplete` is the last envelope; the stream ends right after it

mod envelope;
mod registry;
mod source;
mod table;
mod watcher;


pub use envelope::{Envelope, ExitReason, Metadata};
pub use registry::{ClientRegistration, NamespaceLister, Registration, resolve_namespaces};
pub use source::{BoxSource, ChannelSource, WatchFilter, WatchSource, WatchSpec, channel_source};
pub use table::KindTable;

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::config::MuxConfig;
use crate::error::{Error, Result};
use registry::Registry;
use watcher::Watcher;

enum Lifecycle<P> {
  Running(mpsc::Sender<Envelope<P>>),
  Closing,
}

struct Inner<C, P> {
  registry: Registry<C>,
  lifecycle: Mutex<Lifecycle<P>>,
  shutdown: CancellationToken,
  tracker: TaskTracker,
  streaming: Arc<AtomicUsize>,
  drain_timeout: Duration,
  closed: watch::Sender<bool>,
}

impl<C, P> Inner<C, P> {
  /// Wait for every watcher, then emit the final envelope
  async fn finish_close(&self, tx: mpsc::Sender<Envelope<P>>) {
    self.tracker.wait().await;

    if tx.send(Envelope::ShutdownComplete).await.is_err() {
      tracing::debug!("Event stream dropped before shutdown completed");
    }
    drop(tx);

    self.closed.send_replace(true);
    tracing::info!("Finished closing all watchers");
  }
}

/// Handle to a multiplexer
///
/// Cheap to clone; every clone drives the same registry, channel and shutdown.
pub struct Multiplexer<C, P> {
  inner: Arc<Inner<C, P>>,
}

impl<C, P> Clone for Multiplexer<C, P> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<C, P> Multiplexer<C, P>
where
  C: NamespaceLister,
  P: Send + 'static,
{
  /// Create a multiplexer and the only stream that reads from it
  pub fn new(config: &MuxConfig) -> Result<(Self, EventStream<P>)> {
    config.validate()?;
    let (tx, rx) = mpsc::channel(config.channel_capacity);

    let inner = Inner {
      registry: Registry::new(),
      lifecycle: Mutex::new(Lifecycle::Running(tx)),
      shutdown: CancellationToken::new(),
      tracker: TaskTracker::new(),
      streaming: Arc::new(AtomicUsize::new(0)),
      drain_timeout: config.drain_timeout(),
      closed: watch::Sender::new(false),
    };

    Ok((Self { inner: Arc::new(inner) }, EventStream { rx }))
  }

  /// Register a client and the namespaces it should be watched in.
  ///
  /// Requested namespaces missing upstream are logged and reported in
  /// [`Registration::rejected`]. Register every client before spawning
  /// watchers: a spawn only covers clients registered at that moment.
  pub async fn register<I, S>(&self, identifier: &str, client: C, namespaces: I) -> Result<Registration>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.ensure_running()?;

    let requested: Vec<String> = namespaces.into_iter().map(Into::into).collect();
    let (entry, registration) = self.inner.registry.validate(identifier, client, requested).await?;

    let lifecycle = self.inner.lifecycle.lock();
    if !matches!(*lifecycle, Lifecycle::Running(_)) {
      return Err(Error::ShuttingDown);
    }
    self.inner.registry.insert(entry)?;
    drop(lifecycle);

    tracing::info!(
      "Registered client '{identifier}' with namespaces {:?}",
      registration.accepted
    );
    Ok(registration)
  }

  /// Start one watcher per registered (client, namespace) for `spec`.
  ///
  /// Returns how many watchers were started. Watchers that fail to open their
  /// source only log; they never reach the event stream. Must be called from
  /// within a tokio runtime.
  pub fn spawn(&self, spec: &WatchSpec<C, P>, filter: &WatchFilter) -> Result<usize> {
    let lifecycle = self.inner.lifecycle.lock();
    let Lifecycle::Running(tx) = &*lifecycle else {
      return Err(Error::ShuttingDown);
    };
    Ok(self.spawn_with(tx, spec, filter))
  }

  /// Spawn watchers for the named kinds, or every kind in `table` when `kinds` is empty.
  ///
  /// Unknown names fail before anything is spawned. The whole batch is started
  /// under one lifecycle check, so a concurrent `close()` sees either none or
  /// all of it.
  pub fn spawn_kinds<S: AsRef<str>>(
    &self,
    table: &KindTable<C, P>,
    kinds: &[S],
    filter: &WatchFilter,
  ) -> Result<usize> {
    let specs = table.select(kinds)?;

    let lifecycle = self.inner.lifecycle.lock();
    let Lifecycle::Running(tx) = &*lifecycle else {
      return Err(Error::ShuttingDown);
    };
    Ok(specs.into_iter().map(|spec| self.spawn_with(tx, spec, filter)).sum())
  }

  fn spawn_with(&self, tx: &mpsc::Sender<Envelope<P>>, spec: &WatchSpec<C, P>, filter: &WatchFilter) -> usize {
    let mut started = 0;
    for registration in self.inner.registry.snapshot() {
      for namespace in registration.namespaces() {
        let metadata = Metadata::new(spec.name(), registration.identifier(), namespace.as_str());
        let span = tracing::info_span!(
          "watcher",
          kind = %metadata.kind,
          client = %metadata.identifier,
          namespace = %metadata.namespace
        );

        let watcher = Watcher {
          spec: spec.clone(),
          client: registration.client().clone(),
          filter: filter.clone(),
          metadata,
          tx: tx.clone(),
          shutdown: self.inner.shutdown.clone(),
          streaming: Arc::clone(&self.inner.streaming),
          drain_timeout: self.inner.drain_timeout,
        };
        self.inner.tracker.spawn(watcher.run().instrument(span));
        started += 1;
      }
    }

    tracing::debug!("Started {started} watchers for {}", spec.name());
    started
  }

  /// Stop every watcher, wait for all of them, then send `ShutdownComplete`.
  ///
  /// The first call starts the shutdown on its own task; every call, first or
  /// later, returns once `ShutdownComplete` has been sent. Dropping a pending
  /// `close()` does not interrupt the shutdown. Watchers block on the channel
  /// like any other send, so the event stream must keep being read until
  /// `ShutdownComplete` arrives.
  pub async fn close(&self) {
    let mut closed = self.inner.closed.subscribe();

    let tx = match std::mem::replace(&mut *self.inner.lifecycle.lock(), Lifecycle::Closing) {
      Lifecycle::Running(tx) => Some(tx),
      Lifecycle::Closing => None,
    };

    if let Some(tx) = tx {
      self.inner.shutdown.cancel();
      self.inner.tracker.close();
      tracing::warn!("Shutting down {} active watchers", self.inner.tracker.len());

      let inner = Arc::clone(&self.inner);
      tokio::spawn(async move { inner.finish_close(tx).await });
    } else {
      tracing::debug!("Shutdown already in progress");
    }

    let finished = closed.wait_for(|done| *done).await.is_ok();
    if !finished {
      tracing::debug!("Multiplexer dropped before shutdown completed");
    }
  }

  /// Whether `close()` has been called
  pub fn is_shutting_down(&self) -> bool {
    self.inner.shutdown.is_cancelled()
  }

  /// Whether a `close()` has run to completion
  pub fn is_closed(&self) -> bool {
    *self.inner.closed.borrow()
  }

  /// Number of watchers currently streaming or draining
  pub fn active_watchers(&self) -> usize {
    self.inner.streaming.load(Ordering::SeqCst)
  }

  pub fn registrations(&self) -> Vec<Arc<ClientRegistration<C>>> {
    self.inner.registry.snapshot()
  }

  fn ensure_running(&self) -> Result<()> {
    if self.is_shutting_down() {
      return Err(Error::ShuttingDown);
    }
    Ok(())
  }
}

/// The consumer side of a [`Multiplexer`]
///
/// Yields `None` once `ShutdownComplete` has been delivered.
pub struct EventStream<P> {
  rx: mpsc::Receiver<Envelope<P>>,
}

impl<P> EventStream<P> {
  pub async fn recv(&mut self) -> Option<Envelope<P>> {
    self.rx.recv().await
  }
}

impl<P> Stream for EventStream<P> {
  type Item = Envelope<P>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.rx.poll_recv(cx)
  }
}
