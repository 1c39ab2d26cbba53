//! Ambient process configuration for the engine (SPEC_FULL.md §3.3).
//!
//! Does not read or own the on-disk *client* configuration file of
//! spec.md §6 — that remains an external collaborator. This is only
//! the engine's own tuning knobs: timeouts and concurrency caps.

use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Clone, Parser)]
#[command(name = "deploy-engine", about = "Deployment engine tuning flags")]
pub struct CliArgs {
  /// Upper bound on simultaneously in-flight leaf operations inside a
  /// `ParallelOperation` (spec.md §5).
  #[arg(long)]
  pub max_parallel: Option<usize>,

  /// Per-operation timeout in seconds (spec.md §4.5 default 120s).
  #[arg(long)]
  pub operation_timeout_secs: Option<u64>,

  /// Timeout for pull-adjacent operations in seconds (spec.md §4.5
  /// default 300s).
  #[arg(long)]
  pub pull_timeout_secs: Option<u64>,

  /// Per-machine inspector RPC timeout in seconds (spec.md §4.2
  /// default 5s).
  #[arg(long)]
  pub inspector_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Env {
  deploy_max_parallel: Option<usize>,
  deploy_operation_timeout_secs: Option<u64>,
  deploy_pull_timeout_secs: Option<u64>,
  deploy_inspector_timeout_secs: Option<u64>,
}

impl Default for Env {
  fn default() -> Self {
    Env {
      deploy_max_parallel: None,
      deploy_operation_timeout_secs: None,
      deploy_pull_timeout_secs: None,
      deploy_inspector_timeout_secs: None,
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
  pub max_parallel: usize,
  pub operation_timeout: Duration,
  pub pull_timeout: Duration,
  pub inspector_timeout: Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      max_parallel: 8,
      operation_timeout: Duration::from_secs(120),
      pull_timeout: Duration::from_secs(300),
      inspector_timeout: Duration::from_secs(5),
    }
  }
}

impl EngineConfig {
  /// CLI flags (highest precedence) layered over `.env`-then-OS-env
  /// (via `envy`) layered over the engine defaults, mirroring the
  /// OS-env -> `.env` -> defaults precedence spec.md §4.1 specifies
  /// for manifest interpolation.
  pub fn load(args: &CliArgs) -> Self {
    let _ = dotenvy::dotenv();
    let env: Env = envy::from_env().unwrap_or_default();
    let defaults = EngineConfig::default();

    EngineConfig {
      max_parallel: args
        .max_parallel
        .or(env.deploy_max_parallel)
        .unwrap_or(defaults.max_parallel),
      operation_timeout: args
        .operation_timeout_secs
        .or(env.deploy_operation_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(defaults.operation_timeout),
      pull_timeout: args
        .pull_timeout_secs
        .or(env.deploy_pull_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(defaults.pull_timeout),
      inspector_timeout: args
        .inspector_timeout_secs
        .or(env.deploy_inspector_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(defaults.inspector_timeout),
    }
  }
}
