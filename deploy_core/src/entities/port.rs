//! The extended `PortSpec` string grammar (spec.md §4.1, §6):
//!
//! ```text
//! [host_ip:][published:]target[/proto][@host]
//! ```
//!
//! plus the `hostname:containerPort/https` ingress-HTTPS shorthand.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::Error;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Proto {
  #[default]
  Tcp,
  Udp,
  Http,
  Https,
}

impl Proto {
  fn parse(s: &str) -> Result<Proto, Error> {
    match s {
      "tcp" => Ok(Proto::Tcp),
      "udp" => Ok(Proto::Udp),
      "http" => Ok(Proto::Http),
      "https" => Ok(Proto::Https),
      other => Err(Error::invalid_spec(
        "ports",
        format!("unknown protocol '{other}', expected one of tcp|udp|http|https"),
      )),
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortMode {
  #[default]
  Ingress,
  Host,
}

/// One parsed, fully-expanded port binding. A raw manifest entry with
/// a publish-side range (`3000-3002:8080`) expands into several of
/// these; each carries a single `published` port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
  /// Host IP to bind on, if explicitly restricted. IPv6 is stored
  /// unbracketed; brackets are a formatting detail.
  pub host_ip: Option<String>,
  /// DNS hostname for the `hostname:containerPort/https` ingress
  /// shorthand. Mutually exclusive with `host_ip` and `published`.
  pub hostname: Option<String>,
  /// Externally published port. Required when `mode == Host`.
  pub published: Option<u16>,
  /// Port the container listens on.
  pub target: u16,
  pub proto: Proto,
  pub mode: PortMode,
}

impl fmt::Display for PortSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", format(self))
  }
}

/// Renders the canonical extended-form string for a single, already
/// expanded `PortSpec`. `parse_single(&format(p)) == p` for every `p`.
pub fn format(p: &PortSpec) -> String {
  let mut s = String::new();
  if let Some(hostname) = &p.hostname {
    s.push_str(hostname);
    s.push(':');
  } else if let Some(ip) = &p.host_ip {
    if ip.contains(':') {
      s.push('[');
      s.push_str(ip);
      s.push(']');
    } else {
      s.push_str(ip);
    }
    s.push(':');
  }
  if let Some(published) = p.published {
    s.push_str(&published.to_string());
    s.push(':');
  }
  s.push_str(&p.target.to_string());
  s.push('/');
  s.push_str(&p.proto.to_string());
  if p.mode == PortMode::Host {
    s.push_str("@host");
  }
  s
}

/// Parses one already-expanded extended-form entry (no publish-side
/// range). Used for round-tripping a single `PortSpec` and for any
/// manifest entry that did not need expansion.
pub fn parse_single(raw: &str) -> Result<PortSpec, Error> {
  let specs = parse_and_expand(raw)?;
  if specs.len() != 1 {
    return Err(Error::invalid_spec(
      "ports",
      format!("'{raw}' expands to more than one port binding"),
    ));
  }
  Ok(specs.into_iter().next().unwrap())
}

/// Parses one raw extended-form manifest entry, expanding a
/// publish-side range `a-b` into one `PortSpec` per port (target
/// incremented in lockstep, spec.md §4.1).
pub fn parse_and_expand(raw: &str) -> Result<Vec<PortSpec>, Error> {
  let invalid = |reason: String| Error::invalid_spec("ports", reason);

  let (mode, rest) = match raw.strip_suffix("@host") {
    Some(rest) => (PortMode::Host, rest),
    None => (PortMode::Ingress, raw),
  };

  let (rest, proto) = match rest.rfind('/') {
    Some(idx) => (&rest[..idx], Proto::parse(&rest[idx + 1..])?),
    None => (rest, Proto::Tcp),
  };

  let fields = split_fields(rest).map_err(&invalid)?;

  let (host_ip, hostname, published_field, target_field) = match fields
    .as_slice()
  {
    [target] => (None, None, None, target.as_str()),
    [first, target] => classify_two_fields(first, target, proto)?,
    [host_ip, published, target] => {
      let host_ip = unwrap_bracketed(host_ip);
      (Some(host_ip), None, Some(published.as_str()), target.as_str())
    }
    _ => {
      return Err(invalid(format!(
        "'{raw}' has too many ':'-separated fields"
      )));
    }
  };

  let target: u16 = target_field.parse().map_err(|_| {
    invalid(format!("invalid target port '{target_field}' in '{raw}'"))
  })?;
  validate_port(target).map_err(&invalid)?;

  if hostname.is_some() && proto != Proto::Https {
    return Err(invalid(
      "hostname form requires proto=https".to_string(),
    ));
  }
  if hostname.is_some() && mode == PortMode::Host {
    return Err(invalid(
      "hostname form is ingress-only, cannot combine with @host"
        .to_string(),
    ));
  }

  let published_ports: Vec<Option<u16>> = match published_field {
    None => vec![None],
    Some(field) => expand_range(field)
      .map_err(&invalid)?
      .into_iter()
      .map(Some)
      .collect(),
  };

  if mode == PortMode::Host && published_ports == [None] {
    return Err(invalid(
      "host mode requires a published port".to_string(),
    ));
  }

  published_ports
    .into_iter()
    .enumerate()
    .map(|(i, published)| {
      let target = target
        .checked_add(i as u16)
        .ok_or_else(|| invalid("target port range overflowed u16".into()))?;
      validate_port(target).map_err(&invalid)?;
      if let Some(p) = published {
        validate_port(p).map_err(&invalid)?;
      }
      Ok(PortSpec {
        host_ip: host_ip.clone(),
        hostname: hostname.clone(),
        published,
        target,
        proto,
        mode,
      })
    })
    .collect()
}

fn classify_two_fields(
  first: &str,
  target: &str,
  proto: Proto,
) -> Result<
  (Option<String>, Option<String>, Option<&str>, &str),
  Error,
> {
  if first.starts_with('[') {
    return Ok((Some(unwrap_bracketed(first)), None, None, target));
  }
  if looks_like_port_or_range(first) {
    return Ok((None, None, Some(first), target));
  }
  if looks_like_ipv4(first) {
    return Ok((Some(first.to_string()), None, None, target));
  }
  if proto == Proto::Https {
    return Ok((None, Some(first.to_string()), None, target));
  }
  Err(Error::invalid_spec(
    "ports",
    format!(
      "'{first}' is neither a port, an IP, nor a hostname (hostname form requires /https)"
    ),
  ))
}

fn looks_like_port_or_range(s: &str) -> bool {
  match s.split_once('-') {
    Some((a, b)) => {
      a.chars().all(|c| c.is_ascii_digit())
        && b.chars().all(|c| c.is_ascii_digit())
        && !a.is_empty()
        && !b.is_empty()
    }
    None => !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
  }
}

fn looks_like_ipv4(s: &str) -> bool {
  s.split('.').count() == 4
    && s.split('.').all(|part| part.parse::<u8>().is_ok())
}

fn unwrap_bracketed(s: &str) -> String {
  s.strip_prefix('[')
    .and_then(|s| s.strip_suffix(']'))
    .unwrap_or(s)
    .to_string()
}

/// Splits `host_ip:published:target`-shaped input on `:`, treating a
/// leading `[...]` as one opaque field (IPv6 bracket awareness).
/// Unbracketed IPv6 naturally overflows the 3-field shapes above and
/// is rejected by the caller with a "too many fields" error.
fn split_fields(s: &str) -> Result<Vec<String>, String> {
  if let Some(rest) = s.strip_prefix('[') {
    let end = rest
      .find(']')
      .ok_or_else(|| format!("'{s}' has unterminated '['"))?;
    let host = &rest[..end];
    let after = &rest[end + 1..];
    let after = after
      .strip_prefix(':')
      .ok_or_else(|| format!("'{s}' expected ':' after ']'"))?;
    let mut fields = vec![format!("[{host}]")];
    fields.extend(after.split(':').map(String::from));
    Ok(fields)
  } else {
    Ok(s.split(':').map(String::from).collect())
  }
}

fn expand_range(field: &str) -> Result<Vec<u16>, String> {
  match field.split_once('-') {
    Some((a, b)) => {
      let a: u16 = a
        .parse()
        .map_err(|_| format!("invalid range start '{a}'"))?;
      let b: u16 = b
        .parse()
        .map_err(|_| format!("invalid range end '{b}'"))?;
      if b < a {
        return Err(format!("port range '{field}' is reversed"));
      }
      Ok((a..=b).collect())
    }
    None => {
      let p: u16 = field
        .parse()
        .map_err(|_| format!("invalid published port '{field}'"))?;
      Ok(vec![p])
    }
  }
}

fn validate_port(p: u16) -> Result<(), String> {
  if p == 0 {
    return Err("port 0 is invalid".to_string());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_simple() {
    let spec = PortSpec {
      host_ip: None,
      hostname: None,
      published: Some(8000),
      target: 8000,
      proto: Proto::Tcp,
      mode: PortMode::Host,
    };
    assert_eq!(parse_single(&format(&spec)).unwrap(), spec);
  }

  #[test]
  fn round_trips_ipv6_host() {
    let spec = PortSpec {
      host_ip: Some("::1".to_string()),
      hostname: None,
      published: Some(443),
      target: 8443,
      proto: Proto::Https,
      mode: PortMode::Ingress,
    };
    assert_eq!(parse_single(&format(&spec)).unwrap(), spec);
  }

  #[test]
  fn round_trips_hostname_form() {
    let spec = PortSpec {
      host_ip: None,
      hostname: Some("app.example.com".to_string()),
      published: None,
      target: 8080,
      proto: Proto::Https,
      mode: PortMode::Ingress,
    };
    assert_eq!(parse_single(&format(&spec)).unwrap(), spec);
  }

  #[test]
  fn range_expansion_matches_s5() {
    let expanded = parse_and_expand("3000-3002:8080/tcp").unwrap();
    let published: Vec<_> =
      expanded.iter().map(|p| p.published.unwrap()).collect();
    let targets: Vec<_> = expanded.iter().map(|p| p.target).collect();
    assert_eq!(published, vec![3000, 3001, 3002]);
    assert_eq!(targets, vec![8080, 8081, 8082]);
  }

  #[test]
  fn rejects_zero_port() {
    assert!(parse_single("0/tcp").is_err());
  }

  #[test]
  fn accepts_boundary_ports() {
    assert!(parse_single("1/tcp").is_ok());
    assert!(parse_single("65535/tcp").is_ok());
  }

  #[test]
  fn rejects_reversed_range() {
    assert!(parse_and_expand("3005-3000:8080/tcp").is_err());
  }

  #[test]
  fn rejects_unbracketed_ipv6() {
    assert!(parse_single("::1:8080:80/tcp").is_err());
  }

  #[test]
  fn host_mode_requires_published() {
    assert!(parse_single("8080/tcp@host").is_err());
  }
}
