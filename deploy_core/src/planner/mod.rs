//! Service planner (spec.md §4.4): diffs one service's desired spec
//! against the cluster snapshot and synthesizes its operation
//! sequence.

pub mod diff;
pub mod naming;
pub mod strategy;

use std::collections::BTreeSet;

use crate::{
  entities::{
    MachineContainer, Mode, Operation, RemoveContainerOperation,
    RunContainerOperation, SequenceOperation, ServiceSpec,
    StopContainerOperation,
  },
  error::Error,
  scheduler::{eligible_machine_ids, OverlaySnapshot},
};

use self::{diff::Decision, strategy::UpdateStrategy};

pub struct ServicePlanner {
  pub max_parallel: Option<usize>,
}

impl Default for ServicePlanner {
  fn default() -> Self {
    ServicePlanner { max_parallel: None }
  }
}

/// One machine's classification, carrying whatever the decision needs
/// to build its operation sequence.
enum MachineOp {
  NoOp,
  Run,
  Replace(MachineContainer),
  Remove(MachineContainer),
}

impl ServicePlanner {
  /// Plans one service against `overlay`. Assigns a stable
  /// auto-generated name in place when `spec.name` is empty (spec.md
  /// §4.4); callers must persist the mutated spec so subsequent `Plan`
  /// calls see the same name and stay idempotent.
  ///
  /// This engine treats the assigned `Name` as the stable service
  /// identity used for container label matching (`service.id`): there
  /// is no separate identity minted, since a name, once assigned,
  /// never changes for the lifetime of the service.
  #[tracing::instrument("PlanService", skip_all, fields(service = %spec.name))]
  pub fn plan(
    &self,
    spec: &mut ServiceSpec,
    overlay: &OverlaySnapshot,
  ) -> Result<Operation, Error> {
    if spec.name.is_empty() {
      spec.name = naming::generate_name();
    }
    let service_id = spec.name.clone();

    let eligible = eligible_machine_ids(overlay.base(), spec);
    let mut eligible_sorted: Vec<String> = eligible.iter().cloned().collect();
    eligible_sorted.sort();

    let mut decisions: Vec<(String, String, MachineOp)> = Vec::new();

    match spec.mode {
      Mode::Global => {
        self.plan_global(spec, &service_id, overlay, &eligible_sorted, &mut decisions)
      }
      Mode::Replicated => {
        self.plan_replicated(spec, &service_id, overlay, &eligible_sorted, &mut decisions)
      }
    }
    self.plan_stranded_removals(&service_id, overlay, &eligible, &mut decisions);

    decisions.sort_by(|a, b| a.0.cmp(&b.0));

    let machine_sequences: Vec<Operation> = decisions
      .into_iter()
      .map(|(machine_id, machine_name, op)| {
        build_sequence_for(&machine_id, &machine_name, spec, &service_id, op)
      })
      .filter(|op| !op.is_empty())
      .collect();

    if machine_sequences.is_empty() {
      return Ok(Operation::empty());
    }
    Ok(Operation::parallel(machine_sequences, self.max_parallel))
  }

  fn plan_global(
    &self,
    spec: &ServiceSpec,
    service_id: &str,
    overlay: &OverlaySnapshot,
    eligible_sorted: &[String],
    decisions: &mut Vec<(String, String, MachineOp)>,
  ) {
    for machine_id in eligible_sorted {
      let inventory =
        overlay.base().by_id(machine_id).expect("eligible id from snapshot");
      let existing =
        diff::containers_for_service(&inventory.containers, service_id);
      let op = match existing.first() {
        None => MachineOp::Run,
        Some(container) => match diff::classify_existing(container, spec) {
          Decision::NoOp { .. } => MachineOp::NoOp,
          Decision::Replace { .. } => MachineOp::Replace((*container).clone()),
          _ => unreachable!("classify_existing never returns Run/Remove"),
        },
      };
      decisions.push((machine_id.clone(), inventory.machine.name.clone(), op));
    }
  }

  /// Distributes replicas to minimize maximum per-machine load (spec.md
  /// §4.4 greedy-by-current-count). This engine places at most one
  /// replica per machine, so `Replicas` beyond the eligible machine
  /// count is capped — an explicit simplification of the ambiguous
  /// multi-replica-per-host case, recorded as a design decision.
  fn plan_replicated(
    &self,
    spec: &ServiceSpec,
    service_id: &str,
    overlay: &OverlaySnapshot,
    eligible_sorted: &[String],
    decisions: &mut Vec<(String, String, MachineOp)>,
  ) {
    let desired = spec
      .desired_replicas(eligible_sorted.len())
      .min(eligible_sorted.len());

    let mut existing_on_eligible: Vec<(String, String, Option<MachineContainer>)> =
      eligible_sorted
        .iter()
        .map(|machine_id| {
          let inventory = overlay
            .base()
            .by_id(machine_id)
            .expect("eligible id from snapshot");
          let existing =
            diff::containers_for_service(&inventory.containers, service_id)
              .first()
              .map(|c| (*c).clone());
          (machine_id.clone(), inventory.machine.name.clone(), existing)
        })
        .collect();

    let current_count =
      existing_on_eligible.iter().filter(|(_, _, c)| c.is_some()).count();

    if desired >= current_count {
      let mut needed = desired - current_count;
      for (machine_id, machine_name, existing) in existing_on_eligible.drain(..) {
        let op = match existing {
          Some(container) => match diff::classify_existing(&container, spec) {
            Decision::NoOp { .. } => MachineOp::NoOp,
            Decision::Replace { .. } => MachineOp::Replace(container),
            _ => unreachable!("classify_existing never returns Run/Remove"),
          },
          None if needed > 0 => {
            needed -= 1;
            MachineOp::Run
          }
          None => MachineOp::NoOp,
        };
        decisions.push((machine_id, machine_name, op));
      }
    } else {
      let mut excess = current_count - desired;
      // Mismatched containers are removed before matching ones
      // (spec.md §4.4 "choose mismatched ... containers for removal
      // first"); ties broken by ascending machine ID.
      existing_on_eligible.sort_by(|a, b| {
        let a_mismatch = a
          .2
          .as_ref()
          .map(|c| !matches!(diff::classify_existing(c, spec), Decision::NoOp { .. }))
          .unwrap_or(false);
        let b_mismatch = b
          .2
          .as_ref()
          .map(|c| !matches!(diff::classify_existing(c, spec), Decision::NoOp { .. }))
          .unwrap_or(false);
        b_mismatch.cmp(&a_mismatch).then_with(|| a.0.cmp(&b.0))
      });
      for (machine_id, machine_name, existing) in existing_on_eligible.drain(..) {
        let op = match existing {
          None => MachineOp::NoOp,
          Some(container) if excess > 0 => {
            excess -= 1;
            MachineOp::Remove(container)
          }
          Some(container) => match diff::classify_existing(&container, spec) {
            Decision::NoOp { .. } => MachineOp::NoOp,
            Decision::Replace { .. } => MachineOp::Replace(container),
            _ => unreachable!("classify_existing never returns Run/Remove"),
          },
        };
        decisions.push((machine_id, machine_name, op));
      }
    }
  }

  /// Containers for this service stranded on a machine that is no
  /// longer eligible (placement change, or the machine went down) must
  /// be removed regardless of mode (spec.md §4.4 "global" rule,
  /// generalized to replicated services too).
  fn plan_stranded_removals(
    &self,
    service_id: &str,
    overlay: &OverlaySnapshot,
    eligible: &BTreeSet<String>,
    decisions: &mut Vec<(String, String, MachineOp)>,
  ) {
    for inventory in &overlay.base().machines {
      if eligible.contains(&inventory.machine.id) {
        continue;
      }
      for container in
        diff::containers_for_service(&inventory.containers, service_id)
      {
        decisions.push((
          inventory.machine.id.clone(),
          inventory.machine.name.clone(),
          MachineOp::Remove(container.clone()),
        ));
      }
    }
  }
}

/// A single machine's work is always a `SequenceOperation`. The
/// machine-ID-ascending, kind-ordered determinism of spec.md §4.4
/// applies across the per-machine groups the caller assembles into a
/// `ParallelOperation` (see `decisions.sort_by` in `plan`), not within
/// one machine's own sequence: here the strategy alone picks the
/// order, since a rolling replace must run the new container before
/// stopping the old one, while a stop-first replace must do the
/// reverse. Sorting these children by kind would collapse every
/// rolling replace into stop-first.
fn build_sequence_for(
  machine_id: &str,
  machine_name: &str,
  spec: &ServiceSpec,
  service_id: &str,
  op: MachineOp,
) -> Operation {
  let children = match op {
    MachineOp::NoOp => Vec::new(),
    MachineOp::Run => vec![run_op(machine_id, machine_name, spec, service_id)],
    MachineOp::Replace(old) => {
      let strategy = strategy::decide(&old, spec);
      let run = run_op(machine_id, machine_name, spec, service_id);
      let mut stop_remove = stop_and_remove(machine_id, machine_name, &old);
      match strategy {
        UpdateStrategy::StopFirst => {
          stop_remove.push(run);
          stop_remove
        }
        UpdateStrategy::Rolling => {
          let mut ops = vec![run];
          ops.append(&mut stop_remove);
          ops
        }
      }
    }
    MachineOp::Remove(old) => stop_and_remove(machine_id, machine_name, &old),
  };
  Operation::Sequence(SequenceOperation { children })
}

fn run_op(
  machine_id: &str,
  machine_name: &str,
  spec: &ServiceSpec,
  service_name: &str,
) -> Operation {
  Operation::RunContainer(RunContainerOperation {
    machine_id: machine_id.to_string(),
    machine_name: machine_name.to_string(),
    service_name: service_name.to_string(),
    spec: spec.clone(),
  })
}

fn stop_and_remove(
  machine_id: &str,
  machine_name: &str,
  container: &MachineContainer,
) -> Vec<Operation> {
  let mut ops = Vec::with_capacity(2);
  if container.running {
    ops.push(Operation::StopContainer(StopContainerOperation {
      machine_id: machine_id.to_string(),
      machine_name: machine_name.to_string(),
      container_id: container.id.clone(),
    }));
  }
  ops.push(Operation::RemoveContainer(RemoveContainerOperation {
    machine_id: machine_id.to_string(),
    machine_name: machine_name.to_string(),
    container_id: container.id.clone(),
  }));
  ops
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entities::{
    ClusterState, Container, Machine, MachineInventory, MachineState,
    Placement, PortMode, PortSpec, Proto,
  };
  use crate::scheduler::VolumeScheduler;
  use std::collections::BTreeMap;

  fn up_machine(id: &str) -> MachineInventory {
    MachineInventory {
      machine: Machine {
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

  fn base_spec(name: &str, mode: Mode, replicas: u32) -> ServiceSpec {
    ServiceSpec {
      name: name.to_string(),
      mode,
      replicas,
      container: Container { image: "pause:latest".to_string(), ..Default::default() },
      ports: vec![],
      placement: Placement::default(),
      caddy: None,
    }
  }

  fn overlay_over(state: &ClusterState) -> OverlaySnapshot<'_> {
    VolumeScheduler.schedule(state, &[], &[]).unwrap().0
  }

  #[test]
  fn global_service_runs_on_every_up_machine() {
    let state = ClusterState {
      machines: vec![up_machine("m1"), up_machine("m2"), up_machine("m3")],
    };
    let overlay = overlay_over(&state);
    let mut spec = base_spec("web", Mode::Global, 1);
    let plan = ServicePlanner::default().plan(&mut spec, &overlay).unwrap();
    let runs = count_run_operations(&plan);
    assert_eq!(runs, 3);
  }

  #[test]
  fn idempotent_replan_is_empty() {
    let mut state = ClusterState { machines: vec![up_machine("m1")] };
    let mut spec = base_spec("web", Mode::Global, 1);
    spec.name = "web".to_string();

    let mut labels = BTreeMap::new();
    labels.insert(crate::labels::SERVICE_ID.to_string(), "web".to_string());
    state.machines[0].containers.push(crate::entities::MachineContainer {
      id: "c1".to_string(),
      name: "web".to_string(),
      labels,
      recorded_fingerprint: Some(crate::fingerprint::fingerprint(&spec)),
      running: true,
    });

    let overlay = overlay_over(&state);
    let plan = ServicePlanner::default().plan(&mut spec, &overlay).unwrap();
    assert!(plan.is_empty());
  }

  #[test]
  fn scale_up_runs_only_on_new_machine() {
    let mut state = ClusterState {
      machines: vec![up_machine("a"), up_machine("b"), up_machine("c")],
    };
    let mut spec = base_spec("web", Mode::Replicated, 3);
    spec.name = "web".to_string();

    for idx in [0, 1] {
      let mut labels = BTreeMap::new();
      labels.insert(crate::labels::SERVICE_ID.to_string(), "web".to_string());
      let mut existing_spec = spec.clone();
      existing_spec.replicas = 2;
      state.machines[idx].containers.push(crate::entities::MachineContainer {
        id: format!("c{idx}"),
        name: "web".to_string(),
        labels,
        recorded_fingerprint: Some(crate::fingerprint::fingerprint(&existing_spec)),
        running: true,
      });
    }

    let overlay = overlay_over(&state);
    let plan = ServicePlanner::default().plan(&mut spec, &overlay).unwrap();
    assert_eq!(count_run_operations(&plan), 1);
  }

  #[test]
  fn host_port_replace_uses_stop_first() {
    let mut state = ClusterState { machines: vec![up_machine("m1")] };
    let mut spec = base_spec("web", Mode::Global, 1);
    spec.name = "web".to_string();
    spec.ports = vec![PortSpec {
      host_ip: None,
      hostname: None,
      published: Some(8000),
      target: 8000,
      proto: Proto::Tcp,
      mode: PortMode::Host,
    }];

    let mut old_spec = spec.clone();
    old_spec.container.init = true;
    let mut labels = BTreeMap::new();
    labels.insert(crate::labels::SERVICE_ID.to_string(), "web".to_string());
    labels.insert(
      crate::labels::SERVICE_PORTS.to_string(),
      serde_json::to_string(&old_spec.ports).unwrap(),
    );
    state.machines[0].containers.push(crate::entities::MachineContainer {
      id: "old".to_string(),
      name: "web".to_string(),
      labels,
      recorded_fingerprint: Some(crate::fingerprint::fingerprint(&old_spec)),
      running: true,
    });

    let overlay = overlay_over(&state);
    let plan = ServicePlanner::default().plan(&mut spec, &overlay).unwrap();
    let seq = first_machine_sequence(&plan);
    let kinds: Vec<&str> = seq
      .iter()
      .map(|op| match op {
        Operation::StopContainer(_) => "stop",
        Operation::RemoveContainer(_) => "remove",
        Operation::RunContainer(_) => "run",
        other => panic!("unexpected op {other:?}"),
      })
      .collect();
    assert_eq!(kinds, vec!["stop", "remove", "run"]);
  }

  #[test]
  fn non_host_port_replace_uses_rolling_order() {
    let mut state = ClusterState { machines: vec![up_machine("m1")] };
    let mut spec = base_spec("web", Mode::Global, 1);
    spec.name = "web".to_string();

    let mut old_spec = spec.clone();
    old_spec.container.init = true;
    let mut labels = BTreeMap::new();
    labels.insert(crate::labels::SERVICE_ID.to_string(), "web".to_string());
    state.machines[0].containers.push(crate::entities::MachineContainer {
      id: "old".to_string(),
      name: "web".to_string(),
      labels,
      recorded_fingerprint: Some(crate::fingerprint::fingerprint(&old_spec)),
      running: true,
    });

    let overlay = overlay_over(&state);
    let plan = ServicePlanner::default().plan(&mut spec, &overlay).unwrap();
    let seq = first_machine_sequence(&plan);
    let kinds: Vec<&str> = seq
      .iter()
      .map(|op| match op {
        Operation::StopContainer(_) => "stop",
        Operation::RemoveContainer(_) => "remove",
        Operation::RunContainer(_) => "run",
        other => panic!("unexpected op {other:?}"),
      })
      .collect();
    assert_eq!(kinds, vec!["run", "stop", "remove"]);
  }

  fn count_run_operations(op: &Operation) -> usize {
    match op {
      Operation::Sequence(s) => s.children.iter().map(count_run_operations).sum(),
      Operation::Parallel(p) => p.children.iter().map(count_run_operations).sum(),
      Operation::RunContainer(_) => 1,
      _ => 0,
    }
  }

  fn first_machine_sequence(op: &Operation) -> Vec<Operation> {
    match op {
      Operation::Parallel(p) => match &p.children[0] {
        Operation::Sequence(s) => s.children.clone(),
        other => vec![other.clone()],
      },
      Operation::Sequence(s) => s.children.clone(),
      other => vec![other.clone()],
    }
  }
}
