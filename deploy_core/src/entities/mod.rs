pub mod container;
pub mod machine;
pub mod plan;
pub mod port;
pub mod service;
pub mod snapshot;
pub mod volume;

pub use container::{Container, Healthcheck, LogConfig, LogDriver, Resources};
pub use machine::{Machine, MachineState};
pub use plan::{
  CreateVolumeOperation, Operation, ParallelOperation,
  RemoveContainerOperation, RunContainerOperation, SequenceOperation,
  StartContainerOperation, StopContainerOperation,
};
pub use port::{PortMode, PortSpec, Proto};
pub use service::{Caddy, Mode, Placement, ServiceSpec};
pub use snapshot::{ClusterState, MachineContainer, MachineInventory};
pub use volume::{ConfigSpec, PullPolicy, VolumeKind, VolumeSpec};
