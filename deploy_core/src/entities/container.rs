use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::volume::{ConfigSpec, PullPolicy, VolumeSpec};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
  /// CPU limit in millicores.
  pub cpu_millis: Option<u64>,
  pub memory_bytes: Option<u64>,
  pub memory_reservation_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Healthcheck {
  pub test: Vec<String>,
  pub interval_secs: u64,
  pub timeout_secs: u64,
  pub retries: u32,
  pub start_period_secs: u64,
  pub start_interval_secs: u64,
}

impl Healthcheck {
  /// Total time the executor tolerates `starting` before treating an
  /// unhealthy/absent transition as failure (spec.md §4.5).
  pub fn max_wait(&self) -> std::time::Duration {
    std::time::Duration::from_secs(
      self.start_period_secs
        + self.interval_secs.saturating_mul(self.retries as u64),
    )
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogDriver {
  #[default]
  JsonFile,
  Local,
  Journald,
  Syslog,
  None,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogConfig {
  pub driver: LogDriver,
  pub options: BTreeMap<String, String>,
}

/// The per-replica container definition (spec.md §3 `Container`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
  pub image: String,
  pub command: Vec<String>,
  pub entrypoint: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub init: bool,
  pub user: Option<String>,
  pub log: LogConfig,
  pub resources: Resources,
  pub healthcheck: Option<Healthcheck>,
  pub volumes: Vec<VolumeSpec>,
  pub configs: Vec<ConfigSpec>,
  pub pull_policy: PullPolicy,
}

impl Default for Container {
  fn default() -> Self {
    Container {
      image: String::new(),
      command: Vec::new(),
      entrypoint: Vec::new(),
      env: BTreeMap::new(),
      init: false,
      user: None,
      log: LogConfig::default(),
      resources: Resources::default(),
      healthcheck: None,
      volumes: Vec::new(),
      configs: Vec::new(),
      pull_policy: PullPolicy::default(),
    }
  }
}
