//! Plan executor (spec.md §4.5): walks an operation tree, enforces
//! per-leaf timeouts, fans `ParallelOperation` out with bounded
//! concurrency, and health-gates `RunContainer`.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures_util::future::{join_all, BoxFuture};
use tokio::sync::Semaphore;

use crate::{
  client::{ContainerHealth, MachineClient},
  config::EngineConfig,
  entities::{
    CreateVolumeOperation, Machine, Operation, RemoveContainerOperation,
    RunContainerOperation, StartContainerOperation, StopContainerOperation,
  },
  error::{Error, ExecutorError},
};

pub struct Executor {
  client: Arc<dyn MachineClient>,
  config: EngineConfig,
  machines: BTreeMap<String, Machine>,
}

impl Executor {
  pub fn new(
    client: Arc<dyn MachineClient>,
    config: EngineConfig,
    machines: &[Machine],
  ) -> Self {
    Executor {
      client,
      config,
      machines: machines.iter().map(|m| (m.id.clone(), m.clone())).collect(),
    }
  }

  /// Runs `op` to completion. A `SequenceOperation`'s first failure
  /// halts its remaining siblings and propagates; a
  /// `ParallelOperation`'s failures are aggregated without cancelling
  /// the rest (spec.md §4.5).
  #[tracing::instrument("Execute", skip_all)]
  pub async fn execute(&self, op: &Operation) -> anyhow::Result<()> {
    self.execute_inner(op).await.map_err(Into::into)
  }

  fn execute_inner<'a>(
    &'a self,
    op: &'a Operation,
  ) -> BoxFuture<'a, Result<(), Error>> {
    Box::pin(async move {
      match op {
        Operation::Sequence(seq) => {
          for child in &seq.children {
            self.execute_inner(child).await?;
          }
          Ok(())
        }
        Operation::Parallel(par) => {
          let permits = par.max_parallel.unwrap_or(self.config.max_parallel).max(1);
          let semaphore = Arc::new(Semaphore::new(permits));
          let results = join_all(par.children.iter().map(|child| {
            let semaphore = semaphore.clone();
            async move {
              let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
              self.execute_inner(child).await
            }
          }))
          .await;
          Error::aggregate(results.into_iter().filter_map(Result::err).collect())
            .map_err(downcast_error)
        }
        Operation::CreateVolume(leaf) => self.run_create_volume(leaf).await,
        Operation::RunContainer(leaf) => self.run_container(leaf).await,
        Operation::StartContainer(leaf) => self.start_container(leaf).await,
        Operation::StopContainer(leaf) => self.stop_container(leaf).await,
        Operation::RemoveContainer(leaf) => self.remove_container(leaf).await,
      }
    })
  }

  fn machine(&self, machine_id: &str) -> Result<&Machine, Error> {
    self
      .machines
      .get(machine_id)
      .ok_or_else(|| Error::not_found("machine", machine_id.to_string()))
  }

  async fn run_create_volume(
    &self,
    leaf: &CreateVolumeOperation,
  ) -> Result<(), Error> {
    let machine = self.machine(&leaf.machine_id)?;
    run_leaf(
      self.config.operation_timeout,
      &leaf.machine_id,
      &leaf.machine_name,
      "create_volume",
      self.client.create_volume(machine, &leaf.volume_name),
    )
    .await
  }

  async fn run_container(
    &self,
    leaf: &RunContainerOperation,
  ) -> Result<(), Error> {
    let machine = self.machine(&leaf.machine_id)?;
    let container_id = run_leaf_returning(
      self.config.pull_timeout,
      &leaf.machine_id,
      &leaf.machine_name,
      "create_container",
      self.client.create_container(machine, &leaf.service_name, &leaf.spec),
    )
    .await?;

    run_leaf(
      self.config.operation_timeout,
      &leaf.machine_id,
      &leaf.machine_name,
      "start_container",
      self.client.start_container(machine, &container_id),
    )
    .await?;

    if let Some(healthcheck) = &leaf.spec.container.healthcheck {
      self
        .wait_for_health(machine, &leaf.machine_name, &container_id, healthcheck)
        .await?;
    }
    Ok(())
  }

  async fn wait_for_health(
    &self,
    machine: &Machine,
    machine_name: &str,
    container_id: &str,
    healthcheck: &crate::entities::Healthcheck,
  ) -> Result<(), Error> {
    let deadline = tokio::time::Instant::now() + healthcheck.max_wait();
    let poll_interval = Duration::from_secs(healthcheck.interval_secs.max(1));
    loop {
      let health = self
        .client
        .inspect_container_health(machine, container_id)
        .await
        .map_err(|e| executor_error(&machine.id, machine_name, "healthcheck", &e.to_string()))?;
      match health {
        ContainerHealth::None | ContainerHealth::Healthy => return Ok(()),
        ContainerHealth::Unhealthy => {
          return Err(executor_error(
            &machine.id,
            machine_name,
            "healthcheck",
            "container reported unhealthy",
          ));
        }
        ContainerHealth::Starting => {}
      }
      if tokio::time::Instant::now() >= deadline {
        return Err(executor_error(
          &machine.id,
          machine_name,
          "healthcheck",
          "timed out waiting to leave 'starting'",
        ));
      }
      tokio::time::sleep(poll_interval).await;
    }
  }

  async fn start_container(
    &self,
    leaf: &StartContainerOperation,
  ) -> Result<(), Error> {
    let machine = self.machine(&leaf.machine_id)?;
    run_leaf(
      self.config.operation_timeout,
      &leaf.machine_id,
      &leaf.machine_name,
      "start_container",
      self.client.start_container(machine, &leaf.container_id),
    )
    .await
  }

  async fn stop_container(
    &self,
    leaf: &StopContainerOperation,
  ) -> Result<(), Error> {
    let machine = self.machine(&leaf.machine_id)?;
    run_leaf(
      self.config.operation_timeout,
      &leaf.machine_id,
      &leaf.machine_name,
      "stop_container",
      self.client.stop_container(machine, &leaf.container_id),
    )
    .await
  }

  async fn remove_container(
    &self,
    leaf: &RemoveContainerOperation,
  ) -> Result<(), Error> {
    let machine = self.machine(&leaf.machine_id)?;
    run_leaf(
      self.config.operation_timeout,
      &leaf.machine_id,
      &leaf.machine_name,
      "remove_container",
      self.client.remove_container(machine, &leaf.container_id),
    )
    .await
  }
}

async fn run_leaf(
  timeout: Duration,
  machine_id: &str,
  machine_name: &str,
  kind: &str,
  fut: impl std::future::Future<Output = Result<(), Error>>,
) -> Result<(), Error> {
  match tokio::time::timeout(timeout, fut).await {
    Ok(Ok(())) => Ok(()),
    Ok(Err(e)) => Err(executor_error(machine_id, machine_name, kind, &e.to_string())),
    Err(_) => Err(Error::transient(machine_name, format!("{kind} timed out after {timeout:?}"))),
  }
}

async fn run_leaf_returning<T>(
  timeout: Duration,
  machine_id: &str,
  machine_name: &str,
  kind: &str,
  fut: impl std::future::Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
  match tokio::time::timeout(timeout, fut).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => Err(executor_error(machine_id, machine_name, kind, &e.to_string())),
    Err(_) => Err(Error::transient(machine_name, format!("{kind} timed out after {timeout:?}"))),
  }
}

fn executor_error(
  machine_id: &str,
  machine_name: &str,
  kind: &str,
  underlying: &str,
) -> Error {
  Error::Executor(ExecutorError {
    machine_id: machine_id.to_string(),
    machine_name: machine_name.to_string(),
    operation_kind: kind.to_string(),
    underlying: underlying.to_string(),
  })
}

/// `Error::aggregate` returns `anyhow::Result<()>` since most callers
/// want an `anyhow::Error`; the executor's internal recursion needs
/// the structured `Error` back to keep composing `?` across `Sequence`
/// boundaries, so unwrap it back out.
fn downcast_error(err: anyhow::Error) -> Error {
  err.downcast::<Error>().unwrap_or_else(|e| {
    Error::Executor(ExecutorError {
      machine_id: String::new(),
      machine_name: String::new(),
      operation_kind: "aggregate".to_string(),
      underlying: e.to_string(),
    })
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::MachineSnapshot;
  use crate::entities::{Healthcheck, MachineState, ServiceSpec};
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex as StdMutex;

  #[derive(Default)]
  struct FakeClient {
    create_calls: AtomicUsize,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    fail_start_on: Vec<String>,
    hang_create_on: Vec<String>,
    health_sequence: StdMutex<Vec<ContainerHealth>>,
  }

  #[async_trait]
  impl MachineClient for FakeClient {
    async fn list_machines(&self) -> Result<Vec<Machine>, Error> {
      Ok(Vec::new())
    }

    async fn inspect_machine(
      &self,
      _machine: &Machine,
    ) -> Result<MachineSnapshot, Error> {
      Ok(MachineSnapshot::default())
    }

    async fn create_volume(
      &self,
      _machine: &Machine,
      _volume_name: &str,
    ) -> Result<(), Error> {
      Ok(())
    }

    async fn create_container(
      &self,
      machine: &Machine,
      _service_id: &str,
      _spec: &ServiceSpec,
    ) -> Result<String, Error> {
      self.create_calls.fetch_add(1, Ordering::SeqCst);
      if self.hang_create_on.contains(&machine.id) {
        tokio::time::sleep(Duration::from_secs(60)).await;
      }
      Ok(format!("container-{}", machine.id))
    }

    async fn start_container(
      &self,
      machine: &Machine,
      _container_id: &str,
    ) -> Result<(), Error> {
      self.start_calls.fetch_add(1, Ordering::SeqCst);
      if self.fail_start_on.contains(&machine.id) {
        return Err(Error::transient(machine.name.clone(), "engine refused start"));
      }
      Ok(())
    }

    async fn stop_container(
      &self,
      _machine: &Machine,
      _container_id: &str,
    ) -> Result<(), Error> {
      self.stop_calls.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }

    async fn remove_container(
      &self,
      _machine: &Machine,
      _container_id: &str,
    ) -> Result<(), Error> {
      self.remove_calls.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }

    async fn inspect_container_health(
      &self,
      _machine: &Machine,
      _container_id: &str,
    ) -> Result<ContainerHealth, Error> {
      let mut seq = self.health_sequence.lock().unwrap();
      if seq.len() > 1 {
        Ok(seq.remove(0))
      } else {
        Ok(seq.first().copied().unwrap_or(ContainerHealth::Healthy))
      }
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

  fn run_op(machine_id: &str) -> Operation {
    Operation::RunContainer(RunContainerOperation {
      machine_id: machine_id.to_string(),
      machine_name: machine_id.to_string(),
      service_name: "web".to_string(),
      spec: ServiceSpec {
        name: "web".to_string(),
        mode: crate::entities::Mode::Replicated,
        replicas: 1,
        container: crate::entities::Container {
          image: "pause:latest".to_string(),
          ..Default::default()
        },
        ports: Vec::new(),
        placement: crate::entities::Placement::default(),
        caddy: None,
      },
    })
  }

  fn executor(client: FakeClient, machines: &[Machine]) -> Executor {
    Executor::new(Arc::new(client), EngineConfig::default(), machines)
  }

  #[tokio::test]
  async fn sequence_halts_on_first_failure() {
    let client = FakeClient { fail_start_on: vec!["a".into()], ..Default::default() };
    let m = [machine("a"), machine("b")];
    let exec = executor(client, &m);
    let plan = Operation::sequence(vec![run_op("a"), run_op("b")]);
    assert!(exec.execute(&plan).await.is_err());
  }

  #[tokio::test]
  async fn parallel_runs_all_siblings_despite_one_failure() {
    let client = FakeClient { fail_start_on: vec!["a".into()], ..Default::default() };
    let m = [machine("a"), machine("b"), machine("c")];
    let exec = executor(client, &m);
    let plan = Operation::parallel(
      vec![run_op("a"), run_op("b"), run_op("c")],
      None,
    );
    let result = exec.execute(&plan).await;
    assert!(result.is_err());
    let err = result.unwrap_err().downcast::<Error>().unwrap();
    match err {
      Error::Aggregate(errs) => assert_eq!(errs.len(), 1),
      other => panic!("expected Aggregate, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn leaf_timeout_surfaces_as_transient() {
    let mut config = EngineConfig::default();
    config.pull_timeout = Duration::from_millis(20);
    let client = FakeClient { hang_create_on: vec!["a".into()], ..Default::default() };
    let m = [machine("a")];
    let exec = Executor::new(Arc::new(client), config, &m);
    let result = exec.execute(&run_op("a")).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn healthy_container_does_not_wait() {
    let client = FakeClient {
      health_sequence: StdMutex::new(vec![ContainerHealth::Healthy]),
      ..Default::default()
    };
    let m = [machine("a")];
    let exec = executor(client, &m);
    let mut op = run_op("a");
    if let Operation::RunContainer(leaf) = &mut op {
      leaf.spec.container.healthcheck = Some(Healthcheck {
        test: vec!["CMD".to_string()],
        interval_secs: 1,
        timeout_secs: 1,
        retries: 1,
        start_period_secs: 0,
        start_interval_secs: 1,
      });
    }
    exec.execute(&op).await.unwrap();
  }

  #[tokio::test]
  async fn unhealthy_container_fails_the_run() {
    let client = FakeClient {
      health_sequence: StdMutex::new(vec![ContainerHealth::Unhealthy]),
      ..Default::default()
    };
    let m = [machine("a")];
    let exec = executor(client, &m);
    let mut op = run_op("a");
    if let Operation::RunContainer(leaf) = &mut op {
      leaf.spec.container.healthcheck = Some(Healthcheck {
        test: vec!["CMD".to_string()],
        interval_secs: 1,
        timeout_secs: 1,
        retries: 1,
        start_period_secs: 0,
        start_interval_secs: 1,
      });
    }
    assert!(exec.execute(&op).await.is_err());
  }

  #[tokio::test]
  async fn starting_container_transitions_to_healthy() {
    let client = FakeClient {
      health_sequence: StdMutex::new(vec![
        ContainerHealth::Starting,
        ContainerHealth::Healthy,
      ]),
      ..Default::default()
    };
    let m = [machine("a")];
    let exec = executor(client, &m);
    let mut op = run_op("a");
    if let Operation::RunContainer(leaf) = &mut op {
      leaf.spec.container.healthcheck = Some(Healthcheck {
        test: vec!["CMD".to_string()],
        interval_secs: 1,
        timeout_secs: 1,
        retries: 5,
        start_period_secs: 0,
        start_interval_secs: 1,
      });
    }
    exec.execute(&op).await.unwrap();
  }
}
