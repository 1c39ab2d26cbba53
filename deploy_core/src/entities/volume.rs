use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::Display;

/// A mount declared by a service. Two mounts within one service that
/// reference the same logical `name` must be structurally equal
/// (spec.md §3 "VolumeSpec invariants") — enforced by the compose
/// translator, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
  /// Logical name. For binds/tmpfs this is a content-addressed
  /// synthetic name (`bind-<sha256(target)>`, `tmpfs-<sha256(target)>`);
  /// for named volumes it is the user name with any project prefix
  /// stripped.
  pub name: String,
  pub target: String,
  pub read_only: bool,
  pub kind: VolumeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeKind {
  Bind { source: String },
  Volume { external: bool, driver_opts: BTreeMap<String, String> },
  Tmpfs { size_bytes: Option<u64> },
}

impl VolumeSpec {
  pub fn is_bind(&self) -> bool {
    matches!(self.kind, VolumeKind::Bind { .. })
  }

  pub fn is_external(&self) -> bool {
    matches!(self.kind, VolumeKind::Volume { external: true, .. })
  }
}

/// A config mount (spec.md §3, §4.1). Project-level `file:` configs
/// are loaded eagerly by the translator; inline configs carry content
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSpec {
  pub name: String,
  pub content: Vec<u8>,
  /// Mount target; defaults to `/<source>` if omitted in the manifest.
  pub target: String,
  pub labels: BTreeMap<String, String>,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PullPolicy {
  Always,
  #[default]
  Missing,
  Never,
}
