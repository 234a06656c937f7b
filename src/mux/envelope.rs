//! Envelopes carried on the multiplexer channel

use std::fmt;

/// Provenance of an envelope: which watcher produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metadata {
  /// Resource kind name, e.g. `Pods`
  pub kind: String,
  /// Identifier the client was registered under
  pub identifier: String,
  pub namespace: String,
}

impl Metadata {
  pub fn new(kind: impl Into<String>, identifier: impl Into<String>, namespace: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      identifier: identifier.into(),
      namespace: namespace.into(),
    }
  }
}

impl fmt::Display for Metadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.kind, self.identifier, self.namespace)
  }
}

/// Why a watcher left its streaming loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
  /// Shutdown was requested and the source drained cleanly
  Cancelled,
  /// The source ended without shutdown being requested
  SourceClosed,
  /// Shutdown was requested but the source kept producing past the drain timeout
  DrainTimedOut,
  /// The event stream was dropped
  ConsumerClosed,
}

impl ExitReason {
  /// True when the exit was not requested through `close()`
  pub fn is_unsolicited(self) -> bool {
    matches!(self, ExitReason::SourceClosed | ExitReason::ConsumerClosed)
  }
}

impl fmt::Display for ExitReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExitReason::Cancelled => write!(f, "cancelled"),
      ExitReason::SourceClosed => write!(f, "source closed"),
      ExitReason::DrainTimedOut => write!(f, "drain timed out"),
      ExitReason::ConsumerClosed => write!(f, "consumer closed"),
    }
  }
}

/// Unit of data flowing from watchers to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<P> {
  /// An item produced by a watch source
  Data { payload: P, metadata: Metadata },
  /// A watcher left its streaming loop; sent once per watcher that started streaming
  SourceExited { metadata: Metadata, reason: ExitReason },
  /// Every watcher has terminated; nothing follows this
  ShutdownComplete,
}

impl<P> Envelope<P> {
  /// Metadata of the producing watcher, `None` for `ShutdownComplete`
  pub fn metadata(&self) -> Option<&Metadata> {
    match self {
      Envelope::Data { metadata, .. } | Envelope::SourceExited { metadata, .. } => Some(metadata),
      Envelope::ShutdownComplete => None,
    }
  }

  pub fn is_data(&self) -> bool {
    matches!(self, Envelope::Data { .. })
  }

  pub fn is_shutdown_complete(&self) -> bool {
    matches!(self, Envelope::ShutdownComplete)
  }

  pub fn into_payload(self) -> Option<P> {
    match self {
      Envelope::Data { payload, .. } => Some(payload),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_metadata_display() {
    let meta = Metadata::new("Pods", "local", "default");
    assert_eq!(meta.to_string(), "Pods/local/default");
  }

  #[test]
  fn test_envelope_metadata() {
    let meta = Metadata::new("Pods", "local", "default");
    let data = Envelope::Data {
      payload: 7,
      metadata: meta.clone(),
    };
    let exited: Envelope<i32> = Envelope::SourceExited {
      metadata: meta.clone(),
      reason: ExitReason::Cancelled,
    };
    let done: Envelope<i32> = Envelope::ShutdownComplete;

    assert_eq!(data.metadata(), Some(&meta));
    assert_eq!(exited.metadata(), Some(&meta));
    assert_eq!(done.metadata(), None);
    assert!(data.is_data());
    assert!(!exited.is_data());
    assert!(done.is_shutdown_complete());
  }

  #[test]
  fn test_into_payload() {
    let data = Envelope::Data {
      payload: "added",
      metadata: Metadata::new("Pods", "local", "default"),
    };
    assert_eq!(data.into_payload(), Some("added"));
    assert_eq!(Envelope::<&str>::ShutdownComplete.into_payload(), None);
  }

  #[test]
  fn test_exit_reason_unsolicited() {
    assert!(ExitReason::SourceClosed.is_unsolicited());
    assert!(ExitReason::ConsumerClosed.is_unsolicited());
    assert!(!ExitReason::Cancelled.is_unsolicited());
    assert!(!ExitReason::DrainTimedOut.is_unsolicited());
  }

  #[test]
  fn test_exit_reason_display() {
    assert_eq!(format!("{}", ExitReason::Cancelled), "cancelled");
    assert_eq!(format!("{}", ExitReason::SourceClosed), "source closed");
    assert_eq!(format!("{}", ExitReason::DrainTimedOut), "drain timed out");
    assert_eq!(format!("{}", ExitReason::ConsumerClosed), "consumer closed");
  }
}
