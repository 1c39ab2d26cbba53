//! Compose deployment coordinator (spec.md §4.6): ties the translator,
//! inspector, volume scheduler, service planner and plan executor
//! together for one whole project.
//!
//! Owns the snapshot and plan for the duration of a `Run` (spec.md §3
//! "Ownership"). `plan()` is cached the way the source caches it on
//! the deployment object (spec.md §9 open question (b)); rather than
//! silently going stale, that footgun is surfaced explicitly through
//! [`Coordinator::invalidate`].

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;

use crate::{
  client::MachineClient,
  compose::{self, TranslateOptions},
  config::EngineConfig,
  entities::{Machine, Operation, ServiceSpec},
  error::Error,
  executor::Executor,
  inspector::ClusterStateInspector,
  scheduler::VolumeScheduler,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
  Idle,
  Running,
  Done,
}

struct Cached {
  plan: Operation,
  machines: Vec<Machine>,
}

/// Orchestrates one project's deployment end to end (spec.md §4.6
/// steps 1-6).
pub struct Coordinator {
  client: Arc<dyn MachineClient>,
  config: EngineConfig,
  manifest_paths: Vec<PathBuf>,
  translate_opts: TranslateOptions,
  cached: Mutex<Option<Cached>>,
  run_state: Mutex<RunState>,
}

impl Coordinator {
  pub fn new(
    client: Arc<dyn MachineClient>,
    config: EngineConfig,
    manifest_paths: Vec<PathBuf>,
    translate_opts: TranslateOptions,
  ) -> Self {
    Coordinator {
      client,
      config,
      manifest_paths,
      translate_opts,
      cached: Mutex::new(None),
      run_state: Mutex::new(RunState::Idle),
    }
  }

  /// Produces the composite plan for the whole project, translating,
  /// inspecting, scheduling and planning each service in `depends_on`
  /// order (spec.md §4.6 steps 1-4). Cached: a second call without an
  /// intervening [`Coordinator::invalidate`] returns the same plan
  /// without re-inspecting the cluster.
  #[tracing::instrument("CoordinatorPlan", skip(self))]
  pub async fn plan(&self) -> anyhow::Result<Operation> {
    let mut cached = self.cached.lock().await;
    if let Some(existing) = &*cached {
      return Ok(existing.plan.clone());
    }
    let built = self.build_plan().await?;
    let plan = built.plan.clone();
    *cached = Some(built);
    Ok(plan)
  }

  /// Discards the cached plan and resets run state so a subsequent
  /// [`Coordinator::run`] re-plans from a fresh snapshot (spec.md §9
  /// open question (b)).
  pub async fn invalidate(&self) {
    *self.cached.lock().await = None;
    *self.run_state.lock().await = RunState::Idle;
  }

  /// Executes the (possibly cached) plan exactly once. A second call
  /// with no intervening [`Coordinator::invalidate`] is a no-op
  /// (spec.md §4.6 step 6: "the plan has already been realized");
  /// a call that arrives while a prior `run` is still executing fails
  /// fast instead of interleaving executions of the same plan.
  #[tracing::instrument("CoordinatorRun", skip(self))]
  pub async fn run(&self) -> anyhow::Result<()> {
    {
      let mut state = self.run_state.lock().await;
      match *state {
        RunState::Running => {
          return Err(Error::conflict(
            "coordinator",
            "a deployment is already running for this project",
          )
          .into());
        }
        RunState::Done => return Ok(()),
        RunState::Idle => *state = RunState::Running,
      }
    }

    let result = self.run_inner().await;

    let mut state = self.run_state.lock().await;
    *state = if result.is_ok() { RunState::Done } else { RunState::Idle };
    result
  }

  async fn run_inner(&self) -> anyhow::Result<()> {
    self.plan().await?;
    let cached = self.cached.lock().await;
    let built = cached.as_ref().expect("plan() populates the cache before returning");
    let executor =
      Executor::new(self.client.clone(), self.config, &built.machines);
    executor.execute(&built.plan).await
  }

  async fn build_plan(&self) -> anyhow::Result<Cached> {
    let project =
      compose::translate(&self.manifest_paths, &self.translate_opts).await?;

    let machines = self.client.list_machines().await?;
    let inspector = ClusterStateInspector::new(
      self.client.clone(),
      self.config.inspector_timeout,
    );
    let state = inspector.inspect(&machines).await;

    let (overlay, volume_ops) =
      VolumeScheduler.schedule(&state, &project.services, &project.volumes)?;

    let mut specs_by_key: BTreeMap<String, ServiceSpec> = project
      .service_keys
      .into_iter()
      .zip(project.services)
      .collect();

    let levels = topological_levels(&project.depends_on)?;

    let mut level_ops = Vec::with_capacity(levels.len());
    for level in &levels {
      let mut service_ops = Vec::with_capacity(level.len());
      for key in level {
        let Some(spec) = specs_by_key.get_mut(key) else { continue };
        let planned = crate::planner::ServicePlanner::default()
          .plan(spec, &overlay)?;
        if !planned.is_empty() {
          service_ops.push(planned);
        }
      }
      if !service_ops.is_empty() {
        level_ops
          .push(Operation::parallel(service_ops, Some(self.config.max_parallel)));
      }
    }

    let mut top = Vec::with_capacity(1 + level_ops.len());
    if !volume_ops.is_empty() {
      top.push(Operation::parallel(
        volume_ops.into_iter().map(Operation::CreateVolume).collect(),
        None,
      ));
    }
    top.extend(level_ops);

    let plan = if top.is_empty() { Operation::empty() } else { Operation::sequence(top) };

    if plan.is_empty() {
      tracing::info!(project = %self.translate_opts.project_name, "up-to-date");
    }

    Ok(Cached { plan, machines })
  }
}

/// Batches service keys into dependency levels (spec.md §4.6 "respecting
/// `depends_on` ordering"): level 0 has no unresolved dependencies,
/// level 1 depends only on level 0, and so on. Each level is a
/// `ParallelOperation`'s worth of independent services; levels
/// themselves are sequenced.
fn topological_levels(
  depends_on: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<Vec<String>>, Error> {
  let mut remaining: BTreeMap<&str, usize> = BTreeMap::new();
  let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

  for (name, deps) in depends_on {
    remaining.entry(name.as_str()).or_insert(0);
    for dep in deps {
      *remaining.entry(name.as_str()).or_insert(0) += 1;
      dependents.entry(dep.as_str()).or_default().push(name.as_str());
      remaining.entry(dep.as_str()).or_insert(0);
    }
  }

  let total = remaining.len();
  let mut resolved = 0usize;
  let mut levels = Vec::new();

  while resolved < total {
    let mut ready: Vec<&str> = remaining
      .iter()
      .filter(|(_, &deg)| deg == 0)
      .map(|(&n, _)| n)
      .collect();
    if ready.is_empty() {
      let stuck: Vec<&str> = remaining.keys().copied().collect();
      return Err(Error::invalid_spec(
        "depends_on",
        format!(
          "cyclic or unresolved dependency among services: {}",
          stuck.join(", ")
        ),
      ));
    }
    ready.sort();
    for name in &ready {
      remaining.remove(name);
    }
    for name in &ready {
      if let Some(waiting) = dependents.get(name) {
        for dependent in waiting {
          if let Some(deg) = remaining.get_mut(dependent) {
            *deg = deg.saturating_sub(1);
          }
        }
      }
    }
    resolved += ready.len();
    levels.push(ready.into_iter().map(str::to_string).collect());
  }

  Ok(levels)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn independent_services_land_in_one_level() {
    let mut deps = BTreeMap::new();
    deps.insert("a".to_string(), vec![]);
    deps.insert("b".to_string(), vec![]);
    let levels = topological_levels(&deps).unwrap();
    assert_eq!(levels, vec![vec!["a".to_string(), "b".to_string()]]);
  }

  #[test]
  fn dependent_service_lands_in_later_level() {
    let mut deps = BTreeMap::new();
    deps.insert("db".to_string(), vec![]);
    deps.insert("web".to_string(), vec!["db".to_string()]);
    let levels = topological_levels(&deps).unwrap();
    assert_eq!(levels, vec![vec!["db".to_string()], vec!["web".to_string()]]);
  }

  #[test]
  fn cyclic_dependency_is_rejected() {
    let mut deps = BTreeMap::new();
    deps.insert("a".to_string(), vec!["b".to_string()]);
    deps.insert("b".to_string(), vec!["a".to_string()]);
    assert!(topological_levels(&deps).is_err());
  }

  #[test]
  fn diamond_dependency_resolves_in_three_levels() {
    let mut deps = BTreeMap::new();
    deps.insert("base".to_string(), vec![]);
    deps.insert("left".to_string(), vec!["base".to_string()]);
    deps.insert("right".to_string(), vec!["base".to_string()]);
    deps.insert(
      "top".to_string(),
      vec!["left".to_string(), "right".to_string()],
    );
    let levels = topological_levels(&deps).unwrap();
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0], vec!["base".to_string()]);
    assert_eq!(levels[1], vec!["left".to_string(), "right".to_string()]);
    assert_eq!(levels[2], vec!["top".to_string()]);
  }
}
