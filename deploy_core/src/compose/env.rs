//! Environment resolution for manifest interpolation (spec.md §4.1):
//! **OS environment -> `.env` file -> manifest-level defaults**,
//! earlier sources winning. A variable absent everywhere interpolates
//! to the empty string. `disable_env_file` skips the `.env` stage
//! entirely.

use std::{collections::BTreeMap, path::Path, sync::OnceLock};

use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct EnvContext {
  resolved: BTreeMap<String, String>,
}

impl EnvContext {
  /// `os_env` is passed in (rather than read from `std::env` here) so
  /// translation stays a pure function of its inputs, consistent with
  /// spec.md §5 ("no suspension occurs inside ... the translator").
  pub fn build(
    os_env: &BTreeMap<String, String>,
    dot_env_path: Option<&Path>,
    disable_env_file: bool,
  ) -> anyhow::Result<Self> {
    let mut resolved = BTreeMap::new();

    if !disable_env_file {
      if let Some(path) = dot_env_path {
        if path.exists() {
          for item in dotenvy::from_path_iter(path)? {
            let (k, v) = item?;
            resolved.entry(k).or_insert(v);
          }
        }
      }
    }

    for (k, v) in os_env {
      resolved.insert(k.clone(), v.clone());
    }

    Ok(EnvContext { resolved })
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.resolved.get(key).map(String::as_str)
  }

  /// Substitutes `${VAR}`, `${VAR:-default}` and `${VAR-default}`
  /// references. An unresolved `VAR` with no inline default becomes
  /// the empty string.
  pub fn interpolate(&self, input: &str) -> String {
    static VAR_RE: OnceLock<Regex> = OnceLock::new();
    let re = VAR_RE.get_or_init(|| {
      Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:?-([^}]*))?\}")
        .expect("static interpolation regex is valid")
    });
    re.replace_all(input, |caps: &regex::Captures| {
      let name = &caps[1];
      match self.get(name) {
        Some(value) if !value.is_empty() => value.to_string(),
        Some(_) | None => {
          caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default()
        }
      }
    })
    .into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn os_env_wins_over_dot_env_default() {
    let mut os_env = BTreeMap::new();
    os_env.insert("TAG".to_string(), "from-os".to_string());
    let ctx = EnvContext::build(&os_env, None, true).unwrap();
    assert_eq!(ctx.interpolate("${TAG}"), "from-os");
  }

  #[test]
  fn missing_var_with_default_uses_default() {
    let ctx = EnvContext::build(&BTreeMap::new(), None, true).unwrap();
    assert_eq!(ctx.interpolate("${TAG:-latest}"), "latest");
  }

  #[test]
  fn missing_var_without_default_is_empty() {
    let ctx = EnvContext::build(&BTreeMap::new(), None, true).unwrap();
    assert_eq!(ctx.interpolate("prefix-${TAG}-suffix"), "prefix--suffix");
  }
}
