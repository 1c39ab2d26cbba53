//! Volume scheduler (spec.md §4.3): decides, for every shared named
//! volume, which machines must have it created before service planning
//! runs, honoring placement constraints and shared-volume co-location.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  entities::{ClusterState, CreateVolumeOperation, Mode, ServiceSpec, VolumeKind, VolumeSpec},
  error::Error,
};

/// A pure-value overlay over the inspector's snapshot: records volumes
/// the scheduler has decided will exist once their `CreateVolume`
/// operations run, without mutating the underlying [`ClusterState`]
/// (spec.md §9 "Cross-service shared state during planning").
#[derive(Debug, Clone)]
pub struct OverlaySnapshot<'a> {
  base: &'a ClusterState,
  scheduled: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> OverlaySnapshot<'a> {
  pub fn base(&self) -> &ClusterState {
    self.base
  }

  pub fn has_volume(&self, machine_id: &str, volume: &str) -> bool {
    self.base.has_volume(machine_id, volume)
      || self
        .scheduled
        .get(volume)
        .map(|machines| machines.contains(machine_id))
        .unwrap_or(false)
  }
}

#[derive(Debug, Default)]
pub struct VolumeScheduler;

impl VolumeScheduler {
  /// Schedules every named, non-external volume referenced by
  /// `services`. Returns the overlay snapshot plus the
  /// `CreateVolumeOperation`s the caller must run before the affected
  /// services' plans.
  #[tracing::instrument("ScheduleVolumes", skip_all)]
  pub fn schedule<'a>(
    &self,
    state: &'a ClusterState,
    services: &[ServiceSpec],
    declared_volumes: &[VolumeSpec],
  ) -> Result<(OverlaySnapshot<'a>, Vec<CreateVolumeOperation>), Error> {
    self.check_external_volumes_exist(state, declared_volumes)?;

    // volume name -> referencing services
    let mut referencing: BTreeMap<&str, Vec<&ServiceSpec>> = BTreeMap::new();
    for service in services {
      for mount in &service.container.volumes {
        if matches!(mount.kind, VolumeKind::Volume { external: false, .. }) {
          referencing.entry(mount.name.as_str()).or_default().push(service);
        }
      }
    }

    let mut scheduled: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut ops = Vec::new();

    for (volume_name, services_using) in referencing {
      let eligible = self.intersect_eligible(state, &services_using, volume_name)?;

      let mut present: BTreeSet<String> = state
        .volume_machines(volume_name)
        .into_iter()
        .map(str::to_string)
        .collect();

      let target = self.target_count(&services_using, eligible.len());

      let mut candidates: Vec<&str> =
        eligible.iter().map(String::as_str).collect();
      candidates.sort();

      for machine_id in &candidates {
        if present.len() >= target {
          break;
        }
        if present.contains(*machine_id) {
          continue;
        }
        present.insert(machine_id.to_string());
        let inventory = state.by_id(machine_id).expect("eligible machine id came from the snapshot");
        ops.push(CreateVolumeOperation {
          machine_id: machine_id.to_string(),
          machine_name: inventory.machine.name.clone(),
          volume_name: volume_name.to_string(),
        });
      }

      scheduled.insert(volume_name.to_string(), present);
    }

    ops.sort_by(|a, b| {
      (a.machine_id.as_str(), a.volume_name.as_str())
        .cmp(&(b.machine_id.as_str(), b.volume_name.as_str()))
    });

    Ok((OverlaySnapshot { base: state, scheduled }, ops))
  }

  fn check_external_volumes_exist(
    &self,
    state: &ClusterState,
    declared_volumes: &[VolumeSpec],
  ) -> Result<(), Error> {
    let missing: Vec<&str> = declared_volumes
      .iter()
      .filter(|v| v.is_external())
      .filter(|v| state.volume_machines(&v.name).is_empty())
      .map(|v| v.name.as_str())
      .collect();
    if missing.is_empty() {
      return Ok(());
    }
    Err(Error::unschedulable(format!(
      "external volumes not found: {}",
      missing
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
    )))
  }

  /// Intersection of every referencing service's eligible-machine set
  /// (placement-restricted, or all `up` machines if unconstrained).
  fn intersect_eligible(
    &self,
    state: &ClusterState,
    services: &[&ServiceSpec],
    volume_name: &str,
  ) -> Result<BTreeSet<String>, Error> {
    let mut result: Option<BTreeSet<String>> = None;
    for service in services {
      let set = eligible_machine_ids(state, service);
      result = Some(match result {
        None => set,
        Some(prev) => prev.intersection(&set).cloned().collect(),
      });
    }
    let result = result.unwrap_or_default();
    if result.is_empty() {
      return Err(Error::unschedulable(format!(
        "no machine is eligible for every service sharing volume '{volume_name}'"
      )));
    }
    Ok(result)
  }

  fn target_count(&self, services: &[&ServiceSpec], eligible_count: usize) -> usize {
    if services.iter().any(|s| s.mode == Mode::Global) {
      return eligible_count;
    }
    let max_replicas =
      services.iter().map(|s| s.replicas.max(1) as usize).max().unwrap_or(1);
    max_replicas.min(eligible_count)
  }
}

/// Machines allowed by `Placement.Machines` (or all `up` machines if
/// unconstrained), further narrowed to machines holding every external
/// volume the service mounts (spec.md §4.3/S3: a service referencing an
/// external volume can only land where that volume already exists,
/// since external volumes are a precondition, never a `CreateVolume`
/// action).
pub fn eligible_machine_ids(
  state: &ClusterState,
  service: &ServiceSpec,
) -> BTreeSet<String> {
  let placement_eligible = if service.placement.is_unconstrained() {
    state.up_machines().map(|m| m.machine.id.clone()).collect()
  } else {
    service
      .placement
      .machines
      .iter()
      .filter_map(|name| state.by_name(name))
      .filter(|m| m.machine.is_up())
      .map(|m| m.machine.id.clone())
      .collect()
  };
  match external_volume_machines(state, service) {
    Some(required) => {
      placement_eligible.intersection(&required).cloned().collect()
    }
    None => placement_eligible,
  }
}

/// Intersection, across every external volume the service mounts, of
/// the machines that already have that volume. `None` if the service
/// mounts no external volume (no additional constraint).
fn external_volume_machines(
  state: &ClusterState,
  service: &ServiceSpec,
) -> Option<BTreeSet<String>> {
  let mut result: Option<BTreeSet<String>> = None;
  for mount in &service.container.volumes {
    if !mount.is_external() {
      continue;
    }
    let holders: BTreeSet<String> =
      state.volume_machines(&mount.name).into_iter().map(str::to_string).collect();
    result = Some(match result {
      None => holders,
      Some(prev) => prev.intersection(&holders).cloned().collect(),
    });
  }
  result
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entities::{Container, MachineInventory, MachineState, Placement};

  fn up_machine(id: &str) -> MachineInventory {
    MachineInventory {
      machine: crate::entities::Machine {
        id: id.to_string(),
        name: id.to_string(),
        management_ip: "10.0.0.1".to_string(),
        public_key: String::new(),
        public_ip: None,
        endpoints: Vec::new(),
        state: MachineState::Up,
      },
      containers: Vec::new(),
      volumes: Vec::new(),
      images: Vec::new(),
    }
  }

  fn volume_mount(name: &str, external: bool) -> VolumeSpec {
    VolumeSpec {
      name: name.to_string(),
      target: "/data".to_string(),
      read_only: false,
      kind: VolumeKind::Volume { external, driver_opts: Default::default() },
    }
  }

  fn service(name: &str, volume: &str, mode: Mode, replicas: u32) -> ServiceSpec {
    service_with_volumes(name, vec![volume_mount(volume, false)], mode, replicas)
  }

  fn service_with_volumes(
    name: &str,
    volumes: Vec<VolumeSpec>,
    mode: Mode,
    replicas: u32,
  ) -> ServiceSpec {
    ServiceSpec {
      name: name.to_string(),
      mode,
      replicas,
      container: Container { volumes, ..Default::default() },
      ports: vec![],
      placement: Placement::default(),
      caddy: None,
    }
  }

  fn machine_with_volume(id: &str, volume: &str) -> MachineInventory {
    let mut inventory = up_machine(id);
    inventory
      .volumes
      .push(crate::entities::VolumeOnMachine { name: volume.to_string(), machine_id: id.to_string() });
    inventory
  }

  #[test]
  fn missing_external_volume_is_unschedulable() {
    let state = ClusterState { machines: vec![up_machine("m1")] };
    let declared = vec![volume_mount("ext", true)];
    let result = VolumeScheduler.schedule(&state, &[], &declared);
    assert!(result.is_err());
  }

  #[test]
  fn replicated_volume_created_on_least_id_machines() {
    let state = ClusterState {
      machines: vec![up_machine("m1"), up_machine("m2"), up_machine("m3")],
    };
    let services = vec![service("svc", "v1", Mode::Replicated, 2)];
    let (_overlay, ops) =
      VolumeScheduler.schedule(&state, &services, &[]).unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].machine_id, "m1");
    assert_eq!(ops[1].machine_id, "m2");
  }

  #[test]
  fn global_volume_created_on_every_eligible_machine() {
    let state = ClusterState {
      machines: vec![up_machine("m1"), up_machine("m2")],
    };
    let services = vec![service("svc", "v1", Mode::Global, 1)];
    let (_overlay, ops) =
      VolumeScheduler.schedule(&state, &services, &[]).unwrap();
    assert_eq!(ops.len(), 2);
  }

  #[test]
  fn eligible_machine_ids_excludes_machines_missing_an_external_volume() {
    let state = ClusterState {
      machines: vec![up_machine("m1"), machine_with_volume("m2", "ext")],
    };
    let svc = service_with_volumes(
      "svc3",
      vec![volume_mount("ext", true)],
      Mode::Replicated,
      1,
    );
    let eligible = eligible_machine_ids(&state, &svc);
    assert_eq!(eligible, BTreeSet::from(["m2".to_string()]));
  }

  /// Mirrors spec.md scenario S3: `svc2` and `svc3` share non-external
  /// volume `v2`; `svc3` also mounts external volume `ext`, which
  /// exists only on `m2`. `v2` must be created on `m2`, not wherever
  /// `svc2` alone would be eligible.
  #[test]
  fn shared_volume_co_locates_with_external_volume_holder() {
    let state = ClusterState {
      machines: vec![up_machine("m1"), machine_with_volume("m2", "ext")],
    };
    let svc2 = service("svc2", "v2", Mode::Replicated, 1);
    let svc3 = service_with_volumes(
      "svc3",
      vec![volume_mount("v2", false), volume_mount("ext", true)],
      Mode::Replicated,
      1,
    );
    let declared = vec![volume_mount("ext", true)];
    let (_overlay, ops) = VolumeScheduler
      .schedule(&state, &[svc2, svc3], &declared)
      .unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].volume_name, "v2");
    assert_eq!(ops[0].machine_id, "m2");
  }
}
