//! Small parsers for Compose's human-readable resource quantities
//! (`cpus: "0.5"`, `memory: "512M"`, `interval: "30s"`).

use crate::error::Error;

/// `"0.5"` -> 500 millicores.
pub fn parse_cpus_millis(s: &str) -> Result<u64, Error> {
  let cpus: f64 = s.trim().parse().map_err(|_| {
    Error::invalid_spec("resources", format!("invalid cpus value '{s}'"))
  })?;
  if cpus < 0.0 {
    return Err(Error::invalid_spec("resources", "cpus must not be negative"));
  }
  Ok((cpus * 1000.0).round() as u64)
}

/// `"512M"`, `"1g"`, `"128Ki"`, plain bytes if no suffix. Binary
/// (1024-based) multipliers throughout, matching the container
/// engine's own memory flag convention.
pub fn parse_memory_bytes(s: &str) -> Result<u64, Error> {
  let s = s.trim();
  let invalid = || {
    Error::invalid_spec("resources", format!("invalid memory value '{s}'"))
  };
  let split_at = s
    .find(|c: char| !c.is_ascii_digit() && c != '.')
    .unwrap_or(s.len());
  let (number, suffix) = s.split_at(split_at);
  let number: f64 = number.parse().map_err(|_| invalid())?;
  let multiplier: f64 = match suffix.trim().to_lowercase().as_str() {
    "" | "b" => 1.0,
    "k" | "ki" => 1024.0,
    "m" | "mi" => 1024.0 * 1024.0,
    "g" | "gi" => 1024.0 * 1024.0 * 1024.0,
    "t" | "ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
    _ => return Err(invalid()),
  };
  Ok((number * multiplier).round() as u64)
}

/// `"30s"`, `"1m30s"`-style single-unit durations (`s`/`m`/`h`), or a
/// bare number of seconds.
pub fn parse_duration_secs(s: &str) -> Result<u64, Error> {
  let s = s.trim();
  let invalid = || {
    Error::invalid_spec("healthcheck", format!("invalid duration '{s}'"))
  };
  if let Ok(secs) = s.parse::<u64>() {
    return Ok(secs);
  }
  let split_at = s
    .find(|c: char| !c.is_ascii_digit() && c != '.')
    .ok_or_else(invalid)?;
  let (number, unit) = s.split_at(split_at);
  let number: f64 = number.parse().map_err(|_| invalid())?;
  let secs = match unit {
    "s" => number,
    "m" => number * 60.0,
    "h" => number * 3600.0,
    _ => return Err(invalid()),
  };
  Ok(secs.round() as u64)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_fractional_cpus() {
    assert_eq!(parse_cpus_millis("0.5").unwrap(), 500);
  }

  #[test]
  fn parses_memory_with_binary_suffix() {
    assert_eq!(parse_memory_bytes("512M").unwrap(), 512 * 1024 * 1024);
    assert_eq!(parse_memory_bytes("1g").unwrap(), 1024 * 1024 * 1024);
  }

  #[test]
  fn parses_minute_duration() {
    assert_eq!(parse_duration_secs("1m").unwrap(), 60);
  }

  #[test]
  fn parses_bare_seconds() {
    assert_eq!(parse_duration_secs("45").unwrap(), 45);
  }
}
