//! The machine client: the narrow interface through which the engine
//! reaches the low-level container engine on each machine (spec.md §6
//! "Collaborator interfaces consumed"). Never implemented here — the
//! engine only depends on this trait, mirroring how `rrik-komodo`'s
//! core depends on its periphery client rather than embedding bollard
//! calls directly.

use async_trait::async_trait;

use crate::{
  entities::{ImageOnMachine, Machine, MachineContainer, ServiceSpec, VolumeOnMachine},
  error::Error,
};

/// One machine's inventory as reported by a single inspect RPC
/// (spec.md §4.2: "each RPC returns machine metadata plus (containers,
/// volumes, images)").
#[derive(Debug, Clone, Default)]
pub struct MachineSnapshot {
  pub containers: Vec<MachineContainer>,
  pub volumes: Vec<VolumeOnMachine>,
  pub images: Vec<ImageOnMachine>,
}

/// Health status as reported by the engine for a running container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerHealth {
  /// No healthcheck configured on the container.
  None,
  Starting,
  Healthy,
  Unhealthy,
}

/// The low-level container engine client (spec.md §6). Out of scope to
/// implement: production callers back this with an RPC client to each
/// machine's periphery-equivalent agent.
#[async_trait]
pub trait MachineClient: Send + Sync {
  async fn list_machines(&self) -> Result<Vec<Machine>, Error>;

  async fn inspect_machine(
    &self,
    machine: &Machine,
  ) -> Result<MachineSnapshot, Error>;

  async fn create_volume(
    &self,
    machine: &Machine,
    volume_name: &str,
  ) -> Result<(), Error>;

  /// Creates and starts a container realizing `spec` on `machine`,
  /// returning the engine-assigned container ID.
  async fn create_container(
    &self,
    machine: &Machine,
    service_id: &str,
    spec: &ServiceSpec,
  ) -> Result<String, Error>;

  async fn start_container(
    &self,
    machine: &Machine,
    container_id: &str,
  ) -> Result<(), Error>;

  async fn stop_container(
    &self,
    machine: &Machine,
    container_id: &str,
  ) -> Result<(), Error>;

  async fn remove_container(
    &self,
    machine: &Machine,
    container_id: &str,
  ) -> Result<(), Error>;

  async fn inspect_container_health(
    &self,
    machine: &Machine,
    container_id: &str,
  ) -> Result<ContainerHealth, Error>;
}
