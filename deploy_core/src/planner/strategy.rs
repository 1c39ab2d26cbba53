//! Update strategy selection (spec.md §4.4): rolling ("run new then
//! remove old") unless a host-port collision forces stop-first.

use std::collections::BTreeSet;

use crate::entities::{MachineContainer, PortMode, PortSpec, ServiceSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
  Rolling,
  StopFirst,
}

/// Decides the strategy for replacing `old` with `new` on the same
/// machine. Stop-first is required when the new spec publishes a host
/// port the still-running old container already holds (spec.md §9 S6):
/// running the new container first would fail to bind it.
pub fn decide(old: &MachineContainer, new: &ServiceSpec) -> UpdateStrategy {
  let new_host_ports = host_published_ports(&new.ports);
  if new_host_ports.is_empty() {
    return UpdateStrategy::Rolling;
  }
  let old_host_ports = recorded_host_ports(old);
  if new_host_ports.intersection(&old_host_ports).next().is_some() {
    UpdateStrategy::StopFirst
  } else {
    UpdateStrategy::Rolling
  }
}

fn host_published_ports(ports: &[PortSpec]) -> BTreeSet<u16> {
  ports
    .iter()
    .filter(|p| p.mode == PortMode::Host)
    .filter_map(|p| p.published)
    .collect()
}

/// Recovers the old container's host-mode published ports from its
/// `service.ports` label (spec.md §6), since `MachineContainer` itself
/// does not inline the full port list.
fn recorded_host_ports(container: &MachineContainer) -> BTreeSet<u16> {
  let Some(raw) = container.labels.get(crate::labels::SERVICE_PORTS) else {
    return BTreeSet::new();
  };
  let Ok(ports) = serde_json::from_str::<Vec<PortSpec>>(raw) else {
    return BTreeSet::new();
  };
  host_published_ports(&ports)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entities::{Container, Mode, Placement, Proto};
  use std::collections::BTreeMap;

  fn container_with_ports(ports: &[PortSpec]) -> MachineContainer {
    let mut labels = BTreeMap::new();
    labels.insert(
      crate::labels::SERVICE_PORTS.to_string(),
      serde_json::to_string(ports).unwrap(),
    );
    MachineContainer {
      id: "c1".to_string(),
      name: "old".to_string(),
      labels,
      recorded_fingerprint: None,
      running: true,
    }
  }

  fn spec_with_ports(ports: Vec<PortSpec>) -> ServiceSpec {
    ServiceSpec {
      name: "svc".to_string(),
      mode: Mode::Replicated,
      replicas: 1,
      container: Container::default(),
      ports,
      placement: Placement::default(),
      caddy: None,
    }
  }

  fn host_port(p: u16) -> PortSpec {
    PortSpec {
      host_ip: None,
      hostname: None,
      published: Some(p),
      target: p,
      proto: Proto::Tcp,
      mode: PortMode::Host,
    }
  }

  #[test]
  fn colliding_host_port_forces_stop_first() {
    let old = container_with_ports(&[host_port(8000)]);
    let new = spec_with_ports(vec![host_port(8000)]);
    assert_eq!(decide(&old, &new), UpdateStrategy::StopFirst);
  }

  #[test]
  fn distinct_host_ports_allow_rolling() {
    let old = container_with_ports(&[host_port(8000)]);
    let new = spec_with_ports(vec![host_port(8001)]);
    assert_eq!(decide(&old, &new), UpdateStrategy::Rolling);
  }

  #[test]
  fn no_host_ports_is_rolling() {
    let old = container_with_ports(&[]);
    let new = spec_with_ports(vec![]);
    assert_eq!(decide(&old, &new), UpdateStrategy::Rolling);
  }
}
