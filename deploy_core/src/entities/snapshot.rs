use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::machine::Machine;

/// A container observed on a specific machine (spec.md §3
/// `MachineContainer`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineContainer {
  pub id: String,
  pub name: String,
  pub labels: std::collections::BTreeMap<String, String>,
  /// The canonical fingerprint recorded in the `service.spec` label
  /// (spec.md §6), used to detect drift without re-inspecting the
  /// container.
  pub recorded_fingerprint: Option<String>,
  pub running: bool,
}

impl MachineContainer {
  pub fn service_name(&self) -> Option<&str> {
    self.labels.get("service.name").map(String::as_str)
  }

  pub fn service_id(&self) -> Option<&str> {
    self.labels.get("service.id").map(String::as_str)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeOnMachine {
  pub name: String,
  pub machine_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOnMachine {
  pub reference: String,
  pub machine_id: String,
}

/// One machine's inventory, as collected by the cluster state
/// inspector (spec.md §3 `ClusterState`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInventory {
  pub machine: Machine,
  pub containers: Vec<MachineContainer>,
  pub volumes: Vec<VolumeOnMachine>,
  pub images: Vec<ImageOnMachine>,
}

/// An immutable snapshot of the fleet, produced once per deployment
/// and never mutated in place (spec.md §3, §5). The volume scheduler
/// derives an [`crate::scheduler::OverlaySnapshot`] rather than
/// mutating this value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterState {
  pub machines: Vec<MachineInventory>,
}

impl ClusterState {
  pub fn by_id(&self, id: &str) -> Option<&MachineInventory> {
    self.machines.iter().find(|m| m.machine.id == id)
  }

  pub fn by_name(&self, name: &str) -> Option<&MachineInventory> {
    self.machines.iter().find(|m| m.machine.name == name)
  }

  pub fn up_machines(&self) -> impl Iterator<Item = &MachineInventory> {
    self.machines.iter().filter(|m| m.machine.is_up())
  }

  pub fn index_by_id(&self) -> HashMap<&str, &MachineInventory> {
    self
      .machines
      .iter()
      .map(|m| (m.machine.id.as_str(), m))
      .collect()
  }

  pub fn has_volume(&self, machine_id: &str, volume: &str) -> bool {
    self
      .by_id(machine_id)
      .map(|m| m.volumes.iter().any(|v| v.name == volume))
      .unwrap_or(false)
  }

  pub fn volume_machines(&self, volume: &str) -> Vec<&str> {
    self
      .machines
      .iter()
      .filter(|m| m.volumes.iter().any(|v| v.name == volume))
      .map(|m| m.machine.id.as_str())
      .collect()
  }
}
