//! Raw Compose manifest schema: the on-disk shape, before translation
//! into canonical [`crate::entities::ServiceSpec`]s (spec.md §4.1).
//!
//! Deliberately covers the subset of Compose spec.md names. Unknown
//! fields on the long-syntax extension objects are rejected
//! (`deny_unknown_fields`, spec.md §9); the top-level manifest and
//! per-service maps are left open since real Compose files carry many
//! fields this engine intentionally ignores.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::extensions::{XCaddy, XMachines};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposeFile {
  #[serde(default)]
  pub services: IndexMap<String, RawService>,
  #[serde(default)]
  pub volumes: IndexMap<String, RawVolume>,
  #[serde(default)]
  pub configs: IndexMap<String, RawConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawService {
  pub image: Option<String>,
  pub build: Option<serde_yaml_ng::Value>,
  #[serde(default)]
  pub command: OptStringOrList,
  #[serde(default)]
  pub entrypoint: OptStringOrList,
  #[serde(default)]
  pub environment: EnvMapping,
  #[serde(default)]
  pub env_file: OptStringOrList,
  pub init: Option<bool>,
  pub user: Option<String>,
  pub logging: Option<RawLogging>,
  pub deploy: Option<RawDeploy>,
  pub healthcheck: Option<RawHealthcheck>,
  #[serde(default)]
  pub volumes: Vec<RawVolumeMount>,
  #[serde(default)]
  pub configs: Vec<RawConfigMount>,
  #[serde(default)]
  pub ports: Vec<String>,
  pub pull_policy: Option<String>,

  #[serde(rename = "x-ports", default)]
  pub x_ports: Vec<String>,
  #[serde(rename = "x-machines")]
  pub x_machines: Option<XMachines>,
  #[serde(rename = "x-caddy")]
  pub x_caddy: Option<XCaddy>,
  #[serde(rename = "x-namespace")]
  pub x_namespace: Option<String>,

  #[serde(default)]
  pub depends_on: DependsOn,
}

#[derive(Debug, Clone, Default)]
pub struct DependsOn(pub Vec<String>);

impl<'de> Deserialize<'de> for DependsOn {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
      List(Vec<String>),
      Map(BTreeMap<String, serde_yaml_ng::Value>),
    }
    Ok(match Repr::deserialize(deserializer)? {
      Repr::List(list) => DependsOn(list),
      Repr::Map(map) => DependsOn(map.into_keys().collect()),
    })
  }
}

#[derive(Debug, Clone, Default)]
pub struct OptStringOrList(pub Vec<String>);

impl<'de> Deserialize<'de> for OptStringOrList {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
      One(String),
      Many(Vec<String>),
    }
    Ok(match Repr::deserialize(deserializer)? {
      Repr::One(s) => OptStringOrList(
        shlex::split(&s).unwrap_or_else(|| vec![s]),
      ),
      Repr::Many(v) => OptStringOrList(v),
    })
  }
}

#[derive(Debug, Clone, Default)]
pub struct EnvMapping(pub BTreeMap<String, Option<String>>);

impl<'de> Deserialize<'de> for EnvMapping {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
      Map(BTreeMap<String, Option<serde_yaml_ng::Value>>),
      List(Vec<String>),
    }
    Ok(match Repr::deserialize(deserializer)? {
      Repr::Map(map) => EnvMapping(
        map
          .into_iter()
          .map(|(k, v)| (k, v.map(|v| value_to_string(&v))))
          .collect(),
      ),
      Repr::List(list) => EnvMapping(
        list
          .into_iter()
          .map(|entry| match entry.split_once('=') {
            Some((k, v)) => (k.to_string(), Some(v.to_string())),
            None => (entry, None),
          })
          .collect(),
      ),
    })
  }
}

fn value_to_string(v: &serde_yaml_ng::Value) -> String {
  match v {
    serde_yaml_ng::Value::String(s) => s.clone(),
    other => {
      serde_yaml_ng::to_string(other).unwrap_or_default().trim().to_string()
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLogging {
  pub driver: Option<String>,
  #[serde(default)]
  pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDeploy {
  pub mode: Option<String>,
  pub replicas: Option<u32>,
  pub resources: Option<RawResources>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResources {
  pub limits: Option<RawResourceLimits>,
  pub reservations: Option<RawResourceLimits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResourceLimits {
  pub cpus: Option<String>,
  pub memory: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHealthcheck {
  #[serde(default)]
  pub test: OptStringOrList,
  pub interval: Option<String>,
  pub timeout: Option<String>,
  pub retries: Option<u32>,
  pub start_period: Option<String>,
  pub start_interval: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RawVolumeMount {
  Short(String),
  Long {
    kind: String,
    source: Option<String>,
    target: String,
    read_only: bool,
    tmpfs_size_bytes: Option<u64>,
  },
}

impl<'de> Deserialize<'de> for RawVolumeMount {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
      Short(String),
      Long(LongVolumeMount),
    }
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct LongVolumeMount {
      #[serde(rename = "type")]
      kind: String,
      source: Option<String>,
      target: String,
      #[serde(default)]
      read_only: bool,
      tmpfs: Option<LongTmpfs>,
    }
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct LongTmpfs {
      size: Option<u64>,
    }
    Ok(match Repr::deserialize(deserializer)? {
      Repr::Short(s) => RawVolumeMount::Short(s),
      Repr::Long(l) => RawVolumeMount::Long {
        kind: l.kind,
        source: l.source,
        target: l.target,
        read_only: l.read_only,
        tmpfs_size_bytes: l.tmpfs.and_then(|t| t.size),
      },
    })
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigMount {
  pub source: String,
  pub target: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVolume {
  #[serde(default)]
  pub external: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
  pub file: Option<String>,
  pub content: Option<String>,
  #[serde(default)]
  pub labels: BTreeMap<String, String>,
}

/// `.env` file entries, and OS-environment overlay order (spec.md
/// §4.1): OS environment -> `.env` file -> manifest defaults, with
/// earlier sources winning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvSources {
  pub os_env: BTreeMap<String, String>,
  pub dot_env: BTreeMap<String, String>,
}
