//! The Compose-to-Spec translator (spec.md §4.1): normalizes a
//! multi-service manifest into canonical [`ServiceSpec`]s plus the
//! shared [`VolumeSpec`]s and [`ConfigSpec`]s they reference.

pub mod env;
pub mod extensions;
pub mod image;
pub mod manifest;
pub mod quantity;

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};

use crate::{
  entities::{
    Caddy, ConfigSpec, Container, Healthcheck, LogConfig, LogDriver,
    Mode, Placement, PortMode, PortSpec, PullPolicy, Resources,
    ServiceSpec, VolumeKind, VolumeSpec,
  },
  error::Error,
};

use self::{
  env::EnvContext,
  manifest::{ComposeFile, RawService, RawVolumeMount},
};

/// The result of translation: canonical specs plus enough metadata for
/// the coordinator to order service planning (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct Project {
  pub name: String,
  pub working_dir: PathBuf,
  pub services: Vec<ServiceSpec>,
  /// The raw manifest key each entry of `services` was translated
  /// from, in the same order. `x-namespace` means a service's final
  /// `ServiceSpec.name` can differ from its manifest key, but
  /// `depends_on` always references manifest keys — the coordinator
  /// needs this to resolve dependency ordering back to specs.
  pub service_keys: Vec<String>,
  pub volumes: Vec<VolumeSpec>,
  pub configs: Vec<ConfigSpec>,
  /// service name -> names it depends on, from Compose `depends_on`.
  pub depends_on: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct TranslateOptions {
  pub project_name: String,
  pub os_env: BTreeMap<String, String>,
  pub disable_env_file: bool,
}

/// Translates one or more manifest files (merged service-map last-one-wins,
/// the simplest Compose multi-file semantics) into a [`Project`].
#[tracing::instrument("TranslateCompose", skip(opts), fields(project = %opts.project_name))]
pub async fn translate(
  manifest_paths: &[PathBuf],
  opts: &TranslateOptions,
) -> anyhow::Result<Project> {
  if manifest_paths.is_empty() {
    return Err(Error::invalid_spec(
      "manifest",
      "at least one manifest path is required",
    )
    .into());
  }

  let working_dir = manifest_paths[0]
    .parent()
    .map(Path::to_path_buf)
    .unwrap_or_else(|| PathBuf::from("."));

  let mut merged = ComposeFile::default();
  for path in manifest_paths {
    let text = std::fs::read_to_string(path)?;
    let file: ComposeFile = serde_yaml_ng::from_str(&text).map_err(|e| {
      Error::invalid_spec(
        path.display().to_string(),
        format!("failed to parse manifest: {e}"),
      )
    })?;
    for (name, service) in file.services {
      merged.services.insert(name, service);
    }
    for (name, volume) in file.volumes {
      merged.volumes.insert(name, volume);
    }
    for (name, config) in file.configs {
      merged.configs.insert(name, config);
    }
  }

  let env = EnvContext::build(
    &opts.os_env,
    Some(&working_dir.join(".env")),
    opts.disable_env_file,
  )?;

  let git = image::probe_git(&working_dir).await;
  let now = chrono::Utc::now();

  let mut services = Vec::with_capacity(merged.services.len());
  let mut service_keys = Vec::with_capacity(merged.services.len());
  let mut volumes: BTreeMap<String, VolumeSpec> = BTreeMap::new();
  let mut configs: BTreeMap<String, ConfigSpec> = BTreeMap::new();
  let mut depends_on = BTreeMap::new();

  for (name, raw) in &merged.services {
    let spec = translate_service(
      name,
      raw,
      &merged,
      &opts.project_name,
      &working_dir,
      &env,
      &git,
      now,
      &mut volumes,
      &mut configs,
    )?;
    depends_on.insert(name.clone(), raw.depends_on.0.clone());
    service_keys.push(name.clone());
    services.push(spec);
  }

  Ok(Project {
    name: opts.project_name.clone(),
    working_dir,
    services,
    service_keys,
    volumes: volumes.into_values().collect(),
    configs: configs.into_values().collect(),
    depends_on,
  })
}

#[allow(clippy::too_many_arguments)]
fn translate_service(
  name: &str,
  raw: &RawService,
  manifest: &ComposeFile,
  project: &str,
  working_dir: &Path,
  env: &EnvContext,
  git: &image::GitInfo,
  now: chrono::DateTime<chrono::Utc>,
  volumes_out: &mut BTreeMap<String, VolumeSpec>,
  configs_out: &mut BTreeMap<String, ConfigSpec>,
) -> anyhow::Result<ServiceSpec> {
  let service_name = match &raw.x_namespace {
    Some(ns) => format!("{ns}-{name}"),
    None => name.to_string(),
  };
  validations::StringValidator::default()
    .min_length(1)
    .max_length(253)
    .matches(validations::StringValidatorMatches::ResourceName)
    .validate(&service_name)
    .map_err(|e| Error::invalid_spec(name, format!("invalid service name: {e}")))?;

  // --- environment ---
  let mut resolved_env = BTreeMap::new();
  for (k, v) in &raw.environment.0 {
    if let Some(v) = v {
      resolved_env.insert(k.clone(), env.interpolate(v));
    }
  }

  // --- image ---
  let image_ref = translate_image(name, raw, project, git, now, env)?;

  // --- ports ---
  if !raw.ports.is_empty() && !raw.x_ports.is_empty() {
    return Err(
      Error::invalid_spec(
        name,
        "'ports' and 'x-ports' are mutually exclusive",
      )
      .into(),
    );
  }
  let mut ports = Vec::new();
  for raw_port in raw.ports.iter().chain(raw.x_ports.iter()) {
    ports.extend(parse_service_ports(&env.interpolate(raw_port), name)?);
  }

  // --- caddy ---
  let caddy = match &raw.x_caddy {
    Some(x_caddy) => {
      if ports.iter().any(|p| p.mode == PortMode::Ingress) {
        return Err(Error::invalid_spec(
          name,
          "'x-caddy' cannot be combined with an ingress-mode port",
        )
        .into());
      }
      Some(Caddy { config: x_caddy.resolve(working_dir)? })
    }
    None => None,
  };

  // --- placement ---
  let placement = match &raw.x_machines {
    Some(x_machines) => Placement { machines: x_machines.resolve()? },
    None => Placement::default(),
  };

  // --- volumes ---
  let mut service_volumes = Vec::new();
  let mut seen: BTreeMap<String, VolumeSpec> = BTreeMap::new();
  for mount in &raw.volumes {
    let v = translate_volume_mount(mount, manifest, project)?;
    if let Some(existing) = seen.get(&v.name) {
      if existing != &v {
        return Err(Error::conflict(
          name,
          format!(
            "volume '{}' is mounted twice with different options",
            v.name
          ),
        )
        .into());
      }
      continue;
    }
    seen.insert(v.name.clone(), v.clone());
    volumes_out.entry(v.name.clone()).or_insert_with(|| v.clone());
    service_volumes.push(v);
  }

  // --- configs ---
  let mut service_configs = Vec::new();
  for mount in &raw.configs {
    let c = translate_config_mount(mount, manifest, working_dir)?;
    configs_out.entry(c.name.clone()).or_insert_with(|| c.clone());
    service_configs.push(c);
  }

  // --- resources ---
  let resources = match raw.deploy.as_ref().and_then(|d| d.resources.as_ref()) {
    Some(r) => Resources {
      cpu_millis: r
        .limits
        .as_ref()
        .and_then(|l| l.cpus.as_ref())
        .map(|s| quantity::parse_cpus_millis(s))
        .transpose()?,
      memory_bytes: r
        .limits
        .as_ref()
        .and_then(|l| l.memory.as_ref())
        .map(|s| quantity::parse_memory_bytes(s))
        .transpose()?,
      memory_reservation_bytes: r
        .reservations
        .as_ref()
        .and_then(|l| l.memory.as_ref())
        .map(|s| quantity::parse_memory_bytes(s))
        .transpose()?,
    },
    None => Resources::default(),
  };

  // --- healthcheck ---
  let healthcheck = match &raw.healthcheck {
    Some(hc) if !hc.test.0.is_empty() => Some(Healthcheck {
      test: hc.test.0.clone(),
      interval_secs: hc
        .interval
        .as_deref()
        .map(quantity::parse_duration_secs)
        .transpose()?
        .unwrap_or(30),
      timeout_secs: hc
        .timeout
        .as_deref()
        .map(quantity::parse_duration_secs)
        .transpose()?
        .unwrap_or(30),
      retries: hc.retries.unwrap_or(3),
      start_period_secs: hc
        .start_period
        .as_deref()
        .map(quantity::parse_duration_secs)
        .transpose()?
        .unwrap_or(0),
      start_interval_secs: hc
        .start_interval
        .as_deref()
        .map(quantity::parse_duration_secs)
        .transpose()?
        .unwrap_or(5),
    }),
    _ => None,
  };

  // --- logging ---
  let log = match &raw.logging {
    Some(l) => LogConfig {
      driver: match l.driver.as_deref() {
        None | Some("json-file") => LogDriver::JsonFile,
        Some("local") => LogDriver::Local,
        Some("journald") => LogDriver::Journald,
        Some("syslog") => LogDriver::Syslog,
        Some("none") => LogDriver::None,
        Some(other) => {
          return Err(Error::invalid_spec(
            name,
            format!("unknown log driver '{other}'"),
          )
          .into());
        }
      },
      options: l.options.clone(),
    },
    None => LogConfig::default(),
  };

  let pull_policy = match raw.pull_policy.as_deref() {
    None => PullPolicy::default(),
    Some("always") => PullPolicy::Always,
    Some("missing") => PullPolicy::Missing,
    Some("never") => PullPolicy::Never,
    Some(other) => {
      return Err(Error::invalid_spec(
        name,
        format!("unknown pull_policy '{other}'"),
      )
      .into());
    }
  };

  let container = Container {
    image: image_ref,
    command: raw
      .command
      .0
      .iter()
      .map(|s| env.interpolate(s))
      .collect(),
    entrypoint: raw
      .entrypoint
      .0
      .iter()
      .map(|s| env.interpolate(s))
      .collect(),
    env: resolved_env,
    init: raw.init.unwrap_or(false),
    user: raw.user.clone(),
    log,
    resources,
    healthcheck,
    volumes: service_volumes,
    configs: service_configs,
    pull_policy,
  };

  let (mode, replicas) = match raw.deploy.as_ref().and_then(|d| d.mode.as_deref()) {
    None | Some("replicated") => {
      (Mode::Replicated, raw.deploy.as_ref().and_then(|d| d.replicas).unwrap_or(1))
    }
    Some("global") => (Mode::Global, 1),
    Some(other) => {
      return Err(Error::invalid_spec(
        name,
        format!("unknown deploy.mode '{other}'"),
      )
      .into());
    }
  };

  Ok(ServiceSpec {
    name: service_name,
    mode,
    replicas,
    container,
    ports,
    placement,
    caddy,
  })
}

/// Thin indirection so the port grammar's error subject names the
/// offending service.
fn parse_service_ports(raw: &str, service: &str) -> anyhow::Result<Vec<PortSpec>> {
  crate::entities::port::parse_and_expand(raw).map_err(|e| {
    anyhow::anyhow!("service '{service}': {e}")
  })
}

fn translate_image(
  name: &str,
  raw: &RawService,
  project: &str,
  git: &image::GitInfo,
  now: chrono::DateTime<chrono::Utc>,
  env: &EnvContext,
) -> anyhow::Result<String> {
  let declared = raw
    .image
    .clone()
    .unwrap_or_else(|| format!("{project}/{name}"));
  let declared = env.interpolate(&declared);

  if image::has_template_markers(&declared) {
    let (_repo, tag) = image::split_tag(&declared);
    let ctx = image::TemplateContext {
      project: project.to_string(),
      service: name.to_string(),
      git: git.clone(),
      tag: tag.unwrap_or_default().to_string(),
    };
    return Ok(image::render(&declared, &ctx)?);
  }

  if raw.build.is_some() {
    let (repo, tag) = image::split_tag(&declared);
    if tag.is_none() {
      return Ok(format!("{repo}:{}", image::default_tag(now, git)));
    }
  }

  Ok(declared)
}

fn translate_volume_mount(
  mount: &RawVolumeMount,
  manifest: &ComposeFile,
  project: &str,
) -> anyhow::Result<VolumeSpec> {
  match mount {
    RawVolumeMount::Short(s) => {
      let parts: Vec<&str> = s.splitn(3, ':').collect();
      let (source, target, read_only) = match parts.as_slice() {
        [target] => (None, *target, false),
        [source, target] => (Some(*source), *target, false),
        [source, target, opts] => {
          (Some(*source), *target, opts.split(',').any(|o| o == "ro"))
        }
        _ => unreachable!(),
      };
      build_volume(source, target, read_only, None, manifest, project)
    }
    RawVolumeMount::Long { kind, source, target, read_only, tmpfs_size_bytes } => {
      match kind.as_str() {
        "bind" => {
          let source = source.clone().ok_or_else(|| {
            Error::invalid_spec("volumes", "bind mount requires 'source'")
          })?;
          Ok(VolumeSpec {
            name: format!("bind-{}", content_hash(target)),
            target: target.clone(),
            read_only: *read_only,
            kind: VolumeKind::Bind { source },
          })
        }
        "tmpfs" => Ok(VolumeSpec {
          name: format!("tmpfs-{}", content_hash(target)),
          target: target.clone(),
          read_only: *read_only,
          kind: VolumeKind::Tmpfs { size_bytes: *tmpfs_size_bytes },
        }),
        "volume" => {
          let source = source.clone().ok_or_else(|| {
            Error::invalid_spec("volumes", "volume mount requires 'source'")
          })?;
          build_volume(Some(&source), target, *read_only, None, manifest, project)
        }
        other => Err(
          Error::invalid_spec("volumes", format!("unknown mount type '{other}'"))
            .into(),
        ),
      }
    }
  }
}

fn build_volume(
  source: Option<&str>,
  target: &str,
  read_only: bool,
  driver_opts: Option<BTreeMap<String, String>>,
  manifest: &ComposeFile,
  project: &str,
) -> anyhow::Result<VolumeSpec> {
  Ok(match source {
    None => VolumeSpec {
      name: format!("anon-{}", content_hash(target)),
      target: target.to_string(),
      read_only,
      kind: VolumeKind::Volume {
        external: false,
        driver_opts: driver_opts.unwrap_or_default(),
      },
    },
    Some(source) if is_path_like(source) => VolumeSpec {
      name: format!("bind-{}", content_hash(target)),
      target: target.to_string(),
      read_only,
      kind: VolumeKind::Bind { source: source.to_string() },
    },
    Some(source) => {
      let stripped = strip_project_prefix(source, project);
      validations::StringValidator::default()
        .min_length(1)
        .max_length(253)
        .matches(validations::StringValidatorMatches::ResourceName)
        .validate(&stripped)
        .map_err(|e| Error::invalid_spec("volumes", format!("invalid volume name '{stripped}': {e}")))?;
      let external = manifest
        .volumes
        .get(source)
        .map(|v| v.external)
        .unwrap_or(false);
      VolumeSpec {
        name: stripped,
        target: target.to_string(),
        read_only,
        kind: VolumeKind::Volume {
          external,
          driver_opts: driver_opts.unwrap_or_default(),
        },
      }
    }
  })
}

fn is_path_like(s: &str) -> bool {
  s.starts_with('.') || s.starts_with('/') || s.starts_with('~')
}

fn strip_project_prefix(name: &str, project: &str) -> String {
  let prefix = format!("{project}_");
  name.strip_prefix(&prefix).unwrap_or(name).to_string()
}

fn translate_config_mount(
  mount: &manifest::RawConfigMount,
  manifest: &ComposeFile,
  working_dir: &Path,
) -> anyhow::Result<ConfigSpec> {
  let raw = manifest.configs.get(&mount.source).ok_or_else(|| {
    Error::not_found("config", mount.source.clone())
  })?;
  let content = match (&raw.file, &raw.content) {
    (Some(file), _) => {
      std::fs::read(working_dir.join(file)).map_err(|e| {
        Error::invalid_spec(
          &mount.source,
          format!("failed to read config file '{file}': {e}"),
        )
      })?
    }
    (None, Some(content)) => content.clone().into_bytes(),
    (None, None) => {
      return Err(
        Error::invalid_spec(
          &mount.source,
          "config must declare 'file' or 'content'",
        )
        .into(),
      );
    }
  };
  let target = mount
    .target
    .clone()
    .unwrap_or_else(|| format!("/{}", mount.source));
  Ok(ConfigSpec {
    name: mount.source.clone(),
    content,
    target,
    labels: raw.labels.clone(),
  })
}

fn content_hash(s: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(s.as_bytes());
  hex::encode(hasher.finalize())
}
