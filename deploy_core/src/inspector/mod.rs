//! Cluster state inspector (spec.md §4.2): fans out one inspect RPC
//! per machine in parallel and assembles a consistent, immutable
//! snapshot. Unreachable machines are folded in with a `down` marker
//! and empty inventories rather than failing the whole snapshot.

use std::{sync::Arc, time::Duration};

use futures_util::future::join_all;

use crate::{
  client::MachineClient,
  entities::{Machine, MachineInventory, MachineState},
};

pub use crate::entities::ClusterState;

pub struct ClusterStateInspector {
  client: Arc<dyn MachineClient>,
  timeout: Duration,
}

impl ClusterStateInspector {
  pub fn new(client: Arc<dyn MachineClient>, timeout: Duration) -> Self {
    ClusterStateInspector { client, timeout }
  }

  /// Inspects every given machine concurrently and returns the
  /// resulting snapshot. The returned value is never mutated again by
  /// this component (spec.md §4.2 "never mutated ... after it is
  /// returned"); the volume scheduler derives an overlay instead.
  #[tracing::instrument("InspectCluster", skip(self, machines), fields(count = machines.len()))]
  pub async fn inspect(&self, machines: &[Machine]) -> ClusterState {
    let inventories = join_all(
      machines.iter().map(|machine| self.inspect_one(machine)),
    )
    .await;
    ClusterState { machines: inventories }
  }

  async fn inspect_one(&self, machine: &Machine) -> MachineInventory {
    match tokio::time::timeout(
      self.timeout,
      self.client.inspect_machine(machine),
    )
    .await
    {
      Ok(Ok(snapshot)) => MachineInventory {
        machine: machine.clone(),
        containers: snapshot.containers,
        volumes: snapshot.volumes,
        images: snapshot.images,
      },
      Ok(Err(err)) => {
        tracing::warn!(machine = %machine.name, error = %err, "inspect failed");
        down_inventory(machine)
      }
      Err(_) => {
        tracing::warn!(machine = %machine.name, timeout_secs = self.timeout.as_secs(), "inspect timed out");
        down_inventory(machine)
      }
    }
  }
}

fn down_inventory(machine: &Machine) -> MachineInventory {
  let mut machine = machine.clone();
  machine.state = MachineState::Down;
  MachineInventory {
    machine,
    containers: Vec::new(),
    volumes: Vec::new(),
    images: Vec::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::{ContainerHealth, MachineSnapshot};
  use crate::entities::ServiceSpec;
  use async_trait::async_trait;

  struct FakeClient {
    up: Vec<String>,
    hang: Vec<String>,
  }

  #[async_trait]
  impl MachineClient for FakeClient {
    async fn list_machines(&self) -> Result<Vec<Machine>, crate::error::Error> {
      Ok(Vec::new())
    }

    async fn inspect_machine(
      &self,
      machine: &Machine,
    ) -> Result<MachineSnapshot, crate::error::Error> {
      if self.hang.contains(&machine.id) {
        tokio::time::sleep(Duration::from_secs(60)).await;
      }
      if self.up.contains(&machine.id) {
        Ok(MachineSnapshot::default())
      } else {
        Err(crate::error::Error::transient(machine.name.clone(), "refused"))
      }
    }

    async fn create_volume(
      &self,
      _machine: &Machine,
      _volume_name: &str,
    ) -> Result<(), crate::error::Error> {
      unimplemented!()
    }

    async fn create_container(
      &self,
      _machine: &Machine,
      _service_id: &str,
      _spec: &ServiceSpec,
    ) -> Result<String, crate::error::Error> {
      unimplemented!()
    }

    async fn start_container(
      &self,
      _machine: &Machine,
      _container_id: &str,
    ) -> Result<(), crate::error::Error> {
      unimplemented!()
    }

    async fn stop_container(
      &self,
      _machine: &Machine,
      _container_id: &str,
    ) -> Result<(), crate::error::Error> {
      unimplemented!()
    }

    async fn remove_container(
      &self,
      _machine: &Machine,
      _container_id: &str,
    ) -> Result<(), crate::error::Error> {
      unimplemented!()
    }

    async fn inspect_container_health(
      &self,
      _machine: &Machine,
      _container_id: &str,
    ) -> Result<ContainerHealth, crate::error::Error> {
      unimplemented!()
    }
  }

  fn machine(id: &str) -> Machine {
    Machine {
      id: id.to_string(),
      name: id.to_string(),
      management_ip: "10.0.0.1".to_string(),
      public_key: String::new(),
      public_ip: None,
      endpoints: Vec::new(),
      state: MachineState::Up,
    }
  }

  #[tokio::test]
  async fn unreachable_machine_is_marked_down() {
    let client = Arc::new(FakeClient { up: vec!["a".into()], hang: vec![] });
    let inspector =
      ClusterStateInspector::new(client, Duration::from_millis(50));
    let state = inspector.inspect(&[machine("a"), machine("b")]).await;
    assert!(state.by_id("a").unwrap().machine.is_up());
    assert_eq!(state.by_id("b").unwrap().machine.state, MachineState::Down);
  }

  #[tokio::test]
  async fn slow_machine_times_out_as_down() {
    let client =
      Arc::new(FakeClient { up: vec!["a".into()], hang: vec!["a".into()] });
    let inspector =
      ClusterStateInspector::new(client, Duration::from_millis(20));
    let state = inspector.inspect(&[machine("a")]).await;
    assert_eq!(state.by_id("a").unwrap().machine.state, MachineState::Down);
  }
}
