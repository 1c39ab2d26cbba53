//! Tagged-variant extension decoders for `x-machines` and `x-caddy`
//! (spec.md §9 "dynamic configuration objects"): each constructible
//! from a bare string, a list, or a `{field: ...}` object, validated
//! at translation time rather than left as loosely-typed values.

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum XMachines {
  One(String),
  Many(Vec<String>),
}

impl XMachines {
  /// Normalizes to a trimmed, non-empty machine name list. A
  /// comma-separated single string is split; an empty entry anywhere
  /// is rejected (spec.md §4.1).
  pub fn resolve(&self) -> Result<Vec<String>, Error> {
    let raw: Vec<String> = match self {
      XMachines::One(s) => s.split(',').map(str::to_string).collect(),
      XMachines::Many(list) => list.clone(),
    };
    raw
      .into_iter()
      .map(|entry| {
        let trimmed = entry.trim().to_string();
        if trimmed.is_empty() {
          Err(Error::invalid_spec(
            "x-machines",
            "entries must not be empty",
          ))
        } else {
          Ok(trimmed)
        }
      })
      .collect()
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum XCaddy {
  Inline(String),
  Object {
    #[serde(deny_unknown_fields)]
    config: String,
  },
}

/// A path looks caddy-file-ish if it ends in a common Caddyfile
/// extension/name and contains no newline (an inline snippet always
/// has structure a bare filename can't).
fn looks_like_path(s: &str) -> bool {
  if s.contains('\n') {
    return false;
  }
  let trimmed = s.trim();
  trimmed.ends_with("Caddyfile")
    || trimmed.ends_with(".caddy")
    || trimmed.ends_with(".caddyfile")
}

impl XCaddy {
  /// Resolves to the literal Caddyfile snippet, reading from disk
  /// (relative to `working_dir`) when the inline string looks like a
  /// path rather than a snippet.
  pub fn resolve(
    &self,
    working_dir: &std::path::Path,
  ) -> Result<String, Error> {
    match self {
      XCaddy::Object { config } => Ok(config.clone()),
      XCaddy::Inline(s) if looks_like_path(s) => {
        let path = working_dir.join(s.trim());
        std::fs::read_to_string(&path).map_err(|e| {
          Error::invalid_spec(
            "x-caddy",
            format!("failed to read '{}': {e}", path.display()),
          )
        })
      }
      XCaddy::Inline(s) => Ok(s.clone()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn x_machines_splits_comma_string() {
    let m = XMachines::One("a, b ,c".to_string());
    assert_eq!(
      m.resolve().unwrap(),
      vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
  }

  #[test]
  fn x_machines_rejects_empty_entry() {
    let m = XMachines::One("a,,c".to_string());
    assert!(m.resolve().is_err());
  }

  #[test]
  fn x_caddy_inline_string_is_used_directly() {
    let c = XCaddy::Inline("reverse_proxy localhost:8080".to_string());
    assert_eq!(
      c.resolve(std::path::Path::new(".")).unwrap(),
      "reverse_proxy localhost:8080"
    );
  }
}
