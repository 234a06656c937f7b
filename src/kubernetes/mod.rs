//! Kubernetes collaborators: client construction, watch sources and built-in kinds

mod client;
mod kinds;

pub use client::{client_from_cluster, client_from_config, client_from_file};
pub use kinds::{KubeEvent, KubeSource, KubeSpec, describe};
