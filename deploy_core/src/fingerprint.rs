//! Canonical comparison of a [`ServiceSpec`] against an observed
//! container's recorded spec (spec.md §9 "Fingerprinting").
//!
//! The canonical serializer is deterministic: struct fields serialize
//! in declaration order (stable across runs for a given type), and
//! every map-valued field in [`crate::entities`] is a `BTreeMap`, so
//! two semantically-equal specs always produce byte-identical JSON.
//! The fingerprint is the sha256 of that JSON, hex-encoded so it is
//! safe to store as a container label value (spec.md §6
//! `service.spec` label).

use sha2::{Digest, Sha256};

use crate::entities::ServiceSpec;

/// Canonical JSON for `spec`, with scheduling-only fields cleared
/// first: `name` (assigned before this is computed and must not
/// perturb the fingerprint of an otherwise-identical, not-yet-named
/// spec), `replicas` and `placement` (they decide how many containers
/// exist and where, not what a given container looks like — a scale
/// or placement change must not force an in-place replace of replicas
/// that are otherwise unchanged).
fn canonical_json(spec: &ServiceSpec) -> String {
  let mut spec = spec.clone();
  spec.name.clear();
  spec.replicas = 0;
  spec.placement.machines.clear();
  serde_json::to_string(&spec)
    .expect("ServiceSpec serialization is infallible")
}

/// The label-safe fingerprint embedded in `MachineContainer`'s
/// recorded spec label.
pub fn fingerprint(spec: &ServiceSpec) -> String {
  let mut hasher = Sha256::new();
  hasher.update(canonical_json(spec).as_bytes());
  hex::encode(hasher.finalize())
}

/// Whether two specs are fingerprint-equal: `equals(a, b) ==
/// (fingerprint(a) == fingerprint(b))`, exposed separately so callers
/// comparing a spec directly against a recorded label don't need to
/// re-derive a `ServiceSpec` from the label.
pub fn equals(a: &ServiceSpec, b: &ServiceSpec) -> bool {
  fingerprint(a) == fingerprint(b)
}

/// Whether a spec matches a previously-recorded fingerprint label.
pub fn matches_recorded(spec: &ServiceSpec, recorded: &str) -> bool {
  fingerprint(spec) == recorded
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entities::{Container, Mode, Placement, ServiceSpec};

  fn base_spec() -> ServiceSpec {
    ServiceSpec {
      name: "web".into(),
      mode: Mode::Replicated,
      replicas: 2,
      container: Container { image: "nginx:latest".into(), ..Default::default() },
      ports: vec![],
      placement: Placement::default(),
      caddy: None,
    }
  }

  #[test]
  fn identical_specs_fingerprint_equal() {
    let a = base_spec();
    let b = base_spec();
    assert!(equals(&a, &b));
  }

  #[test]
  fn differing_image_changes_fingerprint() {
    let a = base_spec();
    let mut b = base_spec();
    b.container.image = "nginx:1.27".into();
    assert!(!equals(&a, &b));
  }

  #[test]
  fn name_does_not_affect_fingerprint() {
    let a = base_spec();
    let mut b = base_spec();
    b.name = "other-name".into();
    assert!(equals(&a, &b));
  }

  #[test]
  fn replica_count_and_placement_do_not_affect_fingerprint() {
    let a = base_spec();
    let mut b = base_spec();
    b.replicas = 5;
    b.placement.machines = vec!["m1".into(), "m2".into()];
    assert!(equals(&a, &b));
  }

  #[test]
  fn readback_round_trip_is_stable() {
    let spec = base_spec();
    let fp = fingerprint(&spec);
    assert!(matches_recorded(&spec, &fp));
  }
}
