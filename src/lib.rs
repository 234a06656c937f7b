//! Fan-in multiplexer for long-lived watch streams.
//!
//! Clients are registered with the namespaces they should be watched in, then
//! one watcher task is spawned per (client, namespace, resource kind). All of
//! them feed a single [`EventStream`], and [`Multiplexer::close`] stops them
//! all before reporting [`Envelope::ShutdownComplete`].
//!
//! The [`kubernetes`] module wires this up to `kube`: a client implements
//! [`NamespaceLister`], and [`KindTable::builtin`] holds a spec for each core
//! resource kind.

pub mod config;
pub mod error;
pub mod kubernetes;
pub mod mux;

pub use config::{MuxConfig, WatchConfig};
pub use error::{Error, Result};
pub use mux::{
  ChannelSource, EventStream, Envelope, ExitReason, KindTable, Metadata, Multiplexer, NamespaceLister, Registration,
  WatchFilter, WatchSource, WatchSpec,
};
