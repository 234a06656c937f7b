//! Configuration for the multiplexer and the `watchmux` binary
//!
//! The binary reads `~/.config/watchmux/config.yaml` (or the path given with
//! `--config`); command line flags override whatever the file sets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::mux::WatchFilter;

const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;

/// Multiplexer tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
  /// Slots in the shared channel; 1 keeps it a near-unbuffered handoff
  pub channel_capacity: usize,
  /// How long a stopped source may keep yielding before it is abandoned
  pub drain_timeout_secs: u64,
}

impl Default for MuxConfig {
  fn default() -> Self {
    Self {
      channel_capacity: 1,
      drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
    }
  }
}

impl MuxConfig {
  pub fn drain_timeout(&self) -> Duration {
    Duration::from_secs(self.drain_timeout_secs)
  }

  pub fn validate(&self) -> Result<(), Error> {
    if self.channel_capacity == 0 {
      return Err(Error::InvalidConfig("channel_capacity must be at least 1".to_string()));
    }
    if self.drain_timeout_secs == 0 {
      return Err(Error::InvalidConfig("drain_timeout_secs must be at least 1".to_string()));
    }
    Ok(())
  }
}

/// Settings for the `watchmux` binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
  /// Identifier the cluster client is registered under
  pub name: String,
  pub namespaces: Vec<String>,
  /// Label selector, empty watches everything
  pub selector: Option<String>,
  pub field_selector: Option<String>,
  /// Resource kinds to watch, empty means every built-in kind
  pub kinds: Vec<String>,
  /// API server URL override
  pub apiserver: Option<String>,
  pub kubeconfig: Option<PathBuf>,
  /// Close after this many seconds; runs until Ctrl-C when unset
  pub run_for_secs: Option<u64>,
  pub mux: MuxConfig,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      name: "watchmux".to_string(),
      namespaces: vec!["default".to_string()],
      selector: None,
      field_selector: None,
      kinds: Vec::new(),
      apiserver: None,
      kubeconfig: None,
      run_for_secs: None,
      mux: MuxConfig::default(),
    }
  }
}

impl WatchConfig {
  /// Default location of the config file
  pub fn config_path() -> PathBuf {
    dirs::config_dir()
      .unwrap_or_default()
      .join("watchmux")
      .join("config.yaml")
  }

  /// Read the config at `path`, falling back to defaults when it doesn't exist
  pub fn read_from(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Ok(Self::default());
    }

    let content =
      std::fs::read_to_string(path).map_err(|e| anyhow!("Failed to read config at {}: {e}", path.display()))?;

    serde_yaml::from_str(&content).map_err(|e| anyhow!("Failed to parse config at {}: {e}", path.display()))
  }

  /// Filter options forwarded to every watcher
  pub fn filter(&self) -> WatchFilter {
    WatchFilter {
      label_selector: self.selector.clone().filter(|s| !s.is_empty()),
      field_selector: self.field_selector.clone().filter(|s| !s.is_empty()),
      ..WatchFilter::default()
    }
  }

  /// Whether the binary should build its client from the pod's service account
  pub fn in_cluster(&self) -> bool {
    self.apiserver.as_deref().is_none_or(str::is_empty) && self.kubeconfig.is_none()
  }
}
