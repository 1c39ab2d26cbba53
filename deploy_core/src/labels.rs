//! Machine-local container labels (spec.md §6).

use std::collections::BTreeMap;

use crate::{entities::ServiceSpec, fingerprint};

pub const SERVICE_ID: &str = "service.id";
pub const SERVICE_NAME: &str = "service.name";
pub const SERVICE_MODE: &str = "service.mode";
pub const SERVICE_SPEC: &str = "service.spec";
pub const MANAGED: &str = "managed";
pub const SERVICE_PORTS: &str = "service.ports";

/// Builds the label set stamped onto a container created from `spec`.
/// `service_id` is stable across replans (the planner mints it once);
/// `spec.name` may be auto-generated but is always populated by the
/// time this is called.
pub fn build(
  service_id: &str,
  spec: &ServiceSpec,
) -> BTreeMap<String, String> {
  let mut labels = BTreeMap::new();
  labels.insert(SERVICE_ID.to_string(), service_id.to_string());
  labels.insert(SERVICE_NAME.to_string(), spec.name.clone());
  labels.insert(SERVICE_MODE.to_string(), spec.mode.to_string());
  labels.insert(SERVICE_SPEC.to_string(), fingerprint::fingerprint(spec));
  labels.insert(MANAGED.to_string(), "true".to_string());
  labels.insert(
    SERVICE_PORTS.to_string(),
    serde_json::to_string(&spec.ports)
      .expect("PortSpec serialization is infallible"),
  );
  labels
}
