//! Error types returned by the multiplexer

/// Boxed collaborator error kept as the `source` of an [`Error`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// No usable namespace names were passed to registration
  #[error("client '{0}' was registered with no namespaces")]
  NoNamespaces(String),

  /// The authoritative namespace listing failed
  #[error("unable to list namespaces for client '{identifier}'")]
  ListNamespaces {
    identifier: String,
    #[source]
    source: BoxError,
  },

  /// Every requested namespace was missing upstream
  #[error("none of the requested namespaces exist for client '{identifier}': {rejected:?}")]
  NoMatchingNamespaces { identifier: String, rejected: Vec<String> },

  #[error("client '{0}' is already registered")]
  DuplicateClient(String),

  #[error("unknown resource kind '{0}'")]
  UnknownKind(String),

  /// `close()` has already been called
  #[error("multiplexer is shutting down")]
  ShuttingDown,

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
}

impl Error {
  /// Whether this error means the process has nothing useful to watch.
  ///
  /// Binaries terminate on these; embedders may choose otherwise.
  pub fn is_fatal_misconfiguration(&self) -> bool {
    matches!(
      self,
      Self::NoNamespaces(_) | Self::ListNamespaces { .. } | Self::NoMatchingNamespaces { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fatal_classification() {
    assert!(Error::NoNamespaces("local".to_string()).is_fatal_misconfiguration());
    assert!(
      Error::NoMatchingNamespaces {
        identifier: "local".to_string(),
        rejected: vec!["nope".to_string()],
      }
      .is_fatal_misconfiguration()
    );
    assert!(!Error::ShuttingDown.is_fatal_misconfiguration());
    assert!(!Error::DuplicateClient("local".to_string()).is_fatal_misconfiguration());
  }

  #[test]
  fn test_list_namespaces_keeps_source() {
    let err = Error::ListNamespaces {
      identifier: "local".to_string(),
      source: anyhow::anyhow!("connection refused").into(),
    };
    assert_eq!(err.to_string(), "unable to list namespaces for client 'local'");
    let source = std::error::Error::source(&err).map(ToString::to_string);
    assert_eq!(source.as_deref(), Some("connection refused"));
  }
}
