use serde::{Deserialize, Serialize};
use strum::Display;

use super::{container::Container, port::PortSpec};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
  #[default]
  Replicated,
  Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Placement {
  /// Machine names this service is restricted to. Empty means
  /// unconstrained (any `up` machine is eligible).
  pub machines: Vec<String>,
}

impl Placement {
  pub fn is_unconstrained(&self) -> bool {
    self.machines.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caddy {
  pub config: String,
}

/// The declarative unit of deployment (spec.md §3 `ServiceSpec`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
  /// Empty until the planner assigns a stable auto-generated name on
  /// first plan (spec.md §4.4).
  pub name: String,
  pub mode: Mode,
  /// Only meaningful in `Mode::Replicated`; defaults to 1.
  pub replicas: u32,
  pub container: Container,
  pub ports: Vec<PortSpec>,
  pub placement: Placement,
  pub caddy: Option<Caddy>,
}

impl ServiceSpec {
  pub fn desired_replicas(&self, eligible_machines: usize) -> usize {
    match self.mode {
      Mode::Global => eligible_machines,
      Mode::Replicated => self.replicas.max(1) as usize,
    }
  }

  /// Whether any port publishes in `host` mode. These force a
  /// stop-first update when the host port would otherwise collide
  /// (spec.md §4.4).
  pub fn has_host_port(&self) -> bool {
    self
      .ports
      .iter()
      .any(|p| p.mode == super::port::PortMode::Host)
  }
}
