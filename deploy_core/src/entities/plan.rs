use serde::{Deserialize, Serialize};

use super::service::ServiceSpec;

/// Create a named volume on a machine ahead of any replica that needs
/// it (spec.md §3, §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVolumeOperation {
  pub machine_id: String,
  pub machine_name: String,
  pub volume_name: String,
}

/// Create and start a new replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContainerOperation {
  pub machine_id: String,
  pub machine_name: String,
  pub service_name: String,
  pub spec: ServiceSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartContainerOperation {
  pub machine_id: String,
  pub machine_name: String,
  pub container_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopContainerOperation {
  pub machine_id: String,
  pub machine_name: String,
  pub container_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveContainerOperation {
  pub machine_id: String,
  pub machine_name: String,
  pub container_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
  Sequence(SequenceOperation),
  Parallel(ParallelOperation),
  CreateVolume(CreateVolumeOperation),
  RunContainer(RunContainerOperation),
  StartContainer(StartContainerOperation),
  StopContainer(StopContainerOperation),
  RemoveContainer(RemoveContainerOperation),
}

/// Children execute in order; the first failure halts subsequent
/// siblings and propagates (spec.md §3, §5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceOperation {
  pub children: Vec<Operation>,
}

/// Children execute concurrently; failures are aggregated but
/// siblings are not cancelled unless the parent is (spec.md §3, §5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelOperation {
  pub children: Vec<Operation>,
  /// Optional cap on simultaneously in-flight children. `None` means
  /// unbounded (subject to the executor's global cap).
  pub max_parallel: Option<usize>,
}

impl Operation {
  pub fn sequence(children: Vec<Operation>) -> Operation {
    Operation::Sequence(SequenceOperation { children })
  }

  pub fn parallel(
    children: Vec<Operation>,
    max_parallel: Option<usize>,
  ) -> Operation {
    Operation::Parallel(ParallelOperation { children, max_parallel })
  }

  /// An empty sequence, used as the "nothing to do" plan.
  pub fn empty() -> Operation {
    Operation::Sequence(SequenceOperation::default())
  }

  pub fn is_empty(&self) -> bool {
    match self {
      Operation::Sequence(s) => s.children.iter().all(Operation::is_empty),
      Operation::Parallel(p) => p.children.iter().all(Operation::is_empty),
      _ => false,
    }
  }

  pub fn machine_id(&self) -> Option<&str> {
    match self {
      Operation::CreateVolume(op) => Some(&op.machine_id),
      Operation::RunContainer(op) => Some(&op.machine_id),
      Operation::StartContainer(op) => Some(&op.machine_id),
      Operation::StopContainer(op) => Some(&op.machine_id),
      Operation::RemoveContainer(op) => Some(&op.machine_id),
      Operation::Sequence(_) | Operation::Parallel(_) => None,
    }
  }

  /// Ordering key within a service's sequence: machine ID ascending,
  /// then operation kind `stop < remove < run < start` (spec.md §4.4).
  pub fn sort_key(&self) -> (String, u8) {
    let kind = match self {
      Operation::StopContainer(_) => 0,
      Operation::RemoveContainer(_) => 1,
      Operation::RunContainer(_) => 2,
      Operation::StartContainer(_) => 3,
      Operation::CreateVolume(_) => 4,
      Operation::Sequence(_) | Operation::Parallel(_) => 5,
    };
    (self.machine_id().unwrap_or_default().to_string(), kind)
  }
}
