//! Error taxonomy for the deployment engine (spec.md §7).
//!
//! Call sites return `anyhow::Result<T>` with `.context(...)` chains;
//! the variants here are the leaf error an `anyhow::Error` ultimately
//! wraps, recoverable via `anyhow::Error::downcast_ref::<Error>()` by
//! a caller (e.g. a CLI, out of scope here) that needs to map kinds to
//! exit codes or user-facing messages.

use thiserror::Error;

/// One leaf error from a `ParallelOperation`, see [`Error::Aggregate`].
#[derive(Debug, Clone, Error)]
#[error("[{machine_name}] {operation_kind}: {underlying}")]
pub struct ExecutorError {
  pub machine_id: String,
  pub machine_name: String,
  pub operation_kind: String,
  pub underlying: String,
}

#[derive(Debug, Error)]
pub enum Error {
  /// A service, machine, volume or domain was not present.
  #[error("{kind} '{name}' not found")]
  NotFound { kind: &'static str, name: String },

  /// Manifest or spec failed validation.
  #[error("invalid spec for '{subject}': {reason}")]
  InvalidSpec { subject: String, reason: String },

  /// Volume or placement constraints leave no eligible machine.
  #[error("unschedulable: {reason}")]
  Unschedulable { reason: String },

  /// Attempt to create an entity that already exists with differing
  /// attributes.
  #[error("conflict for '{subject}': {reason}")]
  Conflict { subject: String, reason: String },

  /// Network, RPC unavailable, or timeout. Callers may retry.
  #[error("transient error contacting '{machine_name}': {reason}")]
  Transient { machine_name: String, reason: String },

  /// The underlying engine rejected an operation.
  #[error(transparent)]
  Executor(#[from] ExecutorError),

  /// Multiple leaf errors from a `ParallelOperation`.
  #[error("{} operations failed: {}", .0.len(), summarize(.0))]
  Aggregate(Vec<Error>),
}

fn summarize(errors: &[Error]) -> String {
  errors
    .iter()
    .map(|e| e.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}

impl Error {
  pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
    Error::NotFound { kind, name: name.into() }
  }

  pub fn invalid_spec(
    subject: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Error::InvalidSpec {
      subject: subject.into(),
      reason: reason.into(),
    }
  }

  pub fn unschedulable(reason: impl Into<String>) -> Self {
    Error::Unschedulable { reason: reason.into() }
  }

  pub fn conflict(
    subject: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Error::Conflict { subject: subject.into(), reason: reason.into() }
  }

  pub fn transient(
    machine_name: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Error::Transient {
      machine_name: machine_name.into(),
      reason: reason.into(),
    }
  }

  /// Collapses a list of results into either `Ok(())` or a single
  /// [`Error::Aggregate`] (flattening any nested aggregates).
  pub fn aggregate(errors: Vec<Error>) -> anyhow::Result<()> {
    if errors.is_empty() {
      return Ok(());
    }
    let mut flat = Vec::with_capacity(errors.len());
    for e in errors {
      match e {
        Error::Aggregate(inner) => flat.extend(inner),
        other => flat.push(other),
      }
    }
    Err(Error::Aggregate(flat).into())
  }
}
