//! Resource-kind lookup table
//!
//! Adding a kind is one `insert`; the multiplexer looks specs up by name.

use crate::error::{Error, Result};

use super::source::WatchSpec;

/// Watch specs keyed by kind name, in insertion order
pub struct KindTable<C, P> {
  specs: Vec<WatchSpec<C, P>>,
}

impl<C, P> Default for KindTable<C, P> {
  fn default() -> Self {
    Self { specs: Vec::new() }
  }
}

impl<C, P> KindTable<C, P> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a spec, replacing any existing spec with the same name
  pub fn insert(&mut self, spec: WatchSpec<C, P>) {
    match self.specs.iter_mut().find(|s| s.name() == spec.name()) {
      Some(existing) => *existing = spec,
      None => self.specs.push(spec),
    }
  }

  /// Look a spec up by name, ignoring ASCII case
  pub fn get(&self, name: &str) -> Option<&WatchSpec<C, P>> {
    self.specs.iter().find(|s| s.name().eq_ignore_ascii_case(name))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.specs.iter().map(WatchSpec::name)
  }

  pub fn len(&self) -> usize {
    self.specs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.specs.is_empty()
  }

  /// Resolve kind names to specs; an empty selection means every kind
  pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&WatchSpec<C, P>>> {
    if names.is_empty() {
      return Ok(self.specs.iter().collect());
    }

    names
      .iter()
      .map(|name| {
        let name = name.as_ref().trim();
        self.get(name).ok_or_else(|| Error::UnknownKind(name.to_string()))
      })
      .collect()
  }
}
