use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MachineState {
  Up,
  Down,
  #[default]
  Suspect,
}

/// An addressable node, owned by the (external) membership store. The
/// core treats machines as read-only (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
  pub id: String,
  pub name: String,
  pub management_ip: String,
  pub public_key: String,
  pub public_ip: Option<String>,
  pub endpoints: Vec<String>,
  pub state: MachineState,
}

impl Machine {
  pub fn is_up(&self) -> bool {
    self.state == MachineState::Up
  }
}
