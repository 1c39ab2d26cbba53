//! Per-machine desired-vs-actual classification (spec.md §4.4).

use crate::{
  entities::{MachineContainer, ServiceSpec},
  fingerprint,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  /// Matching container already present; nothing to do.
  NoOp { container_id: String },
  /// No container for this service on this machine yet.
  Run,
  /// A container exists but its recorded spec has drifted.
  Replace { container_id: String },
  /// An extra container beyond the desired count must go.
  Remove { container_id: String },
}

/// Finds every container on any machine labeled with this service's
/// stable identity (spec.md §6 `service.id` label), regardless of
/// whether that machine is currently eligible — callers need the full
/// set to emit `Remove` for containers stranded outside placement.
pub fn containers_for_service<'a>(
  containers: &'a [MachineContainer],
  service_id: &str,
) -> Vec<&'a MachineContainer> {
  containers
    .iter()
    .filter(|c| c.service_id() == Some(service_id))
    .collect()
}

pub fn classify_existing(
  container: &MachineContainer,
  spec: &ServiceSpec,
) -> Decision {
  match &container.recorded_fingerprint {
    Some(recorded) if fingerprint::matches_recorded(spec, recorded) => {
      Decision::NoOp { container_id: container.id.clone() }
    }
    _ => Decision::Replace { container_id: container.id.clone() },
  }
}
