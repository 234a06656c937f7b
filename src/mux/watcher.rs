//! Per-(client, namespace, kind) watcher task
//!
//! ```text
//! Connecting ──open ok──► Streaming ──shutdown / source end──► Closing ──► Terminated
//!     │                                                                      ▲
//!     └──────────── open failed / shutdown during connect ──────────────────┘
//! ```
//!
//! Only tasks that reached Streaming send a `SourceExited` envelope.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::envelope::{Envelope, ExitReason, Metadata};
use super::source::{BoxSource, WatchFilter, WatchSpec};

/// Everything a watcher task needs, owned
pub(crate) struct Watcher<C, P> {
  pub spec: WatchSpec<C, P>,
  pub client: C,
  pub filter: WatchFilter,
  pub metadata: Metadata,
  pub tx: mpsc::Sender<Envelope<P>>,
  pub shutdown: CancellationToken,
  pub streaming: Arc<AtomicUsize>,
  pub drain_timeout: Duration,
}

/// Keeps the streaming gauge in step with the task, even if it panics
struct StreamingGuard(Arc<AtomicUsize>);

impl StreamingGuard {
  fn enter(gauge: &Arc<AtomicUsize>) -> Self {
    gauge.fetch_add(1, Ordering::SeqCst);
    Self(Arc::clone(gauge))
  }
}

impl Drop for StreamingGuard {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

impl<C, P> Watcher<C, P>
where
  C: Send + 'static,
  P: Send + 'static,
{
  pub(crate) async fn run(self) {
    let Self {
      spec,
      client,
      filter,
      metadata,
      tx,
      shutdown,
      streaming,
      drain_timeout,
    } = self;

    let opening = spec.open(client, metadata.namespace.clone(), filter);
    let mut source = tokio::select! {
      result = opening => match result {
        Ok(source) => source,
        Err(e) => {
          tracing::warn!("Unable to create watcher for namespace '{}': {e:#}", metadata.namespace);
          return;
        }
      },
      () = shutdown.cancelled() => {
        tracing::debug!("Shutdown requested before watcher for '{}' connected", metadata.namespace);
        return;
      }
    };

    let _guard = StreamingGuard::enter(&streaming);
    tracing::debug!("Watcher streaming");

    let reason = loop {
      tokio::select! {
        () = shutdown.cancelled() => {
          break stop_and_drain(&mut source, drain_timeout).await;
        }
        item = source.next() => match item {
          Some(payload) => {
            let envelope = Envelope::Data { payload, metadata: metadata.clone() };
            if tx.send(envelope).await.is_err() {
              tracing::debug!("Event stream dropped, stopping watcher");
              source.stop();
              break ExitReason::ConsumerClosed;
            }
          }
          None => break ExitReason::SourceClosed,
        }
      }
    };

    match reason {
      ExitReason::SourceClosed => tracing::error!("Watcher for namespace '{}' exited", metadata.namespace),
      ExitReason::DrainTimedOut => tracing::error!(
        "Watcher for namespace '{}' did not drain within {drain_timeout:?} after stop",
        metadata.namespace
      ),
      ExitReason::Cancelled | ExitReason::ConsumerClosed => {
        tracing::debug!("Watcher for namespace '{}' exited: {reason}", metadata.namespace);
      }
    }

    if tx.send(Envelope::SourceExited { metadata, reason }).await.is_err() {
      tracing::debug!("Event stream dropped before exit could be reported");
    }
  }
}

/// Stop the source and discard what it still yields until it ends.
///
/// A source that keeps going past `timeout` is abandoned.
async fn stop_and_drain<P>(source: &mut BoxSource<P>, timeout: Duration) -> ExitReason {
  source.stop();

  let mut discarded = 0usize;
  let drained = tokio::time::timeout(timeout, async {
    while source.next().await.is_some() {
      discarded += 1;
    }
  })
  .await;

  if discarded > 0 {
    tracing::debug!("Discarded {discarded} buffered events after stop");
  }

  match drained {
    Ok(()) => ExitReason::Cancelled,
    Err(_) => ExitReason::DrainTimedOut,
  }
}
