//! Image templating (spec.md §4.1, S4): every service image is
//! rendered through a small template engine with context
//! `{Project, Service, Git, Tag}` and functions `gitsha [len]`,
//! `gitdate layout [tz]`, `date layout [tz]`.
//!
//! Shells out to `git` through the `command` crate the same way the
//! teacher's `git` library wraps `git rev-parse`/`git log` (see
//! `rrik-komodo/lib/git`), since the container engine and any build
//! system are external collaborators the translator never talks to
//! directly.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct GitInfo {
  pub is_repo: bool,
  pub is_dirty: bool,
  pub sha: String,
  pub date: DateTime<Utc>,
}

impl Default for GitInfo {
  fn default() -> Self {
    GitInfo {
      is_repo: false,
      is_dirty: false,
      sha: String::new(),
      date: Utc::now(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct TemplateContext {
  pub project: String,
  pub service: String,
  pub git: GitInfo,
  /// The tag portion of the image reference as originally written in
  /// the manifest, before templating (empty if none).
  pub tag: String,
}

/// Probes `working_dir` for git repo state. Returns a non-repo
/// [`GitInfo`] (rather than an error) when the directory isn't a git
/// work tree — that is a normal, expected state for S4's "outside a
/// git repo" case.
pub async fn probe_git(working_dir: &Path) -> GitInfo {
  let inside = command::run_standard_command(
    "git rev-parse --is-inside-work-tree",
    working_dir,
  )
  .await;
  if !inside.success() || inside.stdout.trim() != "true" {
    return GitInfo::default();
  }

  let sha =
    command::run_standard_command("git rev-parse HEAD", working_dir)
      .await;
  let sha = if sha.success() { sha.stdout.trim().to_string() } else {
    return GitInfo::default();
  };

  let status =
    command::run_standard_command("git status --porcelain", working_dir)
      .await;
  let is_dirty = status.success() && !status.stdout.trim().is_empty();

  let date_out = command::run_standard_command(
    "git log -1 --format=%cI",
    working_dir,
  )
  .await;
  let date = date_out
    .success()
    .then(|| DateTime::parse_from_rfc3339(date_out.stdout.trim()).ok())
    .flatten()
    .map(|d| d.with_timezone(&Utc))
    .unwrap_or_else(Utc::now);

  GitInfo { is_repo: true, is_dirty, sha, date }
}

pub fn has_template_markers(image: &str) -> bool {
  image.contains("{{")
}

/// Renders every `{{ ... }}` token in `template` against `ctx`.
pub fn render(
  template: &str,
  ctx: &TemplateContext,
) -> Result<String, Error> {
  let mut out = String::with_capacity(template.len());
  let mut rest = template;
  while let Some(start) = rest.find("{{") {
    out.push_str(&rest[..start]);
    let after = &rest[start + 2..];
    let end = after.find("}}").ok_or_else(|| {
      Error::invalid_spec("image", "unterminated '{{' in image template")
    })?;
    let token = after[..end].trim();
    out.push_str(&render_token(token, ctx)?);
    rest = &after[end + 2..];
  }
  out.push_str(rest);
  Ok(out)
}

fn render_token(
  token: &str,
  ctx: &TemplateContext,
) -> Result<String, Error> {
  let mut parts = token.split_whitespace();
  let ident = parts.next().unwrap_or("");
  let args: Vec<&str> = parts.collect();

  match ident {
    "gitsha" => {
      let len: usize = match args.first() {
        Some(n) => n.parse().map_err(|_| {
          Error::invalid_spec("image", format!("invalid gitsha length '{n}'"))
        })?,
        None => ctx.git.sha.len(),
      };
      Ok(ctx.git.sha.chars().take(len).collect())
    }
    "gitdate" => render_date(&ctx.git.date, &args, "gitdate"),
    "date" => render_date(&Utc::now(), &args, "date"),
    "Project" => Ok(ctx.project.clone()),
    "Service" => Ok(ctx.service.clone()),
    "Tag" => Ok(ctx.tag.clone()),
    other => Err(Error::invalid_spec(
      "image",
      format!("unknown template function or variable '{other}'"),
    )),
  }
}

fn render_date(
  at: &DateTime<Utc>,
  args: &[&str],
  name: &str,
) -> Result<String, Error> {
  let layout = args.first().ok_or_else(|| {
    Error::invalid_spec("image", format!("'{name}' requires a layout argument"))
  })?;
  // The `tz` argument (args[1]) is accepted for grammar compatibility;
  // only UTC rendering is supported (no bundled tz database dependency).
  Ok(at.format(layout).to_string())
}

/// Splits an image reference into `(repository, tag)`, treating the
/// last `:` after the last `/` as the tag separator (so a
/// `registry:port/name` host:port is never mistaken for a tag).
pub fn split_tag(image: &str) -> (&str, Option<&str>) {
  let slash = image.rfind('/').map(|i| i + 1).unwrap_or(0);
  match image[slash..].rfind(':') {
    Some(i) => (&image[..slash + i], Some(&image[slash + i + 1..])),
    None => (image, None),
  }
}

/// The default tag appended when a service has a `build` and its
/// image carries neither an explicit tag nor template markers
/// (spec.md §4.1, S4): `YYYY-MM-DD-HHMMSS[.sha7][.dirty]`, or
/// date-only outside a git repo.
pub fn default_tag(at: DateTime<Utc>, git: &GitInfo) -> String {
  let mut tag = at.format("%Y-%m-%d-%H%M%S").to_string();
  if git.is_repo {
    tag.push('.');
    tag.push_str(&git.sha.chars().take(7).collect::<String>());
    if git.is_dirty {
      tag.push_str(".dirty");
    }
  }
  tag
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx() -> TemplateContext {
    TemplateContext {
      project: "acme".into(),
      service: "web".into(),
      git: GitInfo {
        is_repo: true,
        is_dirty: true,
        sha: "84d33bb1234567890".into(),
        date: "2024-01-02T03:04:05Z".parse().unwrap(),
      },
      tag: String::new(),
    }
  }

  #[test]
  fn renders_gitsha_default_full() {
    let out = render("{{gitsha}}", &ctx()).unwrap();
    assert_eq!(out, "84d33bb1234567890");
  }

  #[test]
  fn renders_gitsha_with_length() {
    let out = render("{{gitsha 7}}", &ctx()).unwrap();
    assert_eq!(out, "84d33bb");
  }

  #[test]
  fn renders_gitdate_with_layout() {
    let out = render("{{gitdate %Y-%m-%d}}", &ctx()).unwrap();
    assert_eq!(out, "2024-01-02");
  }

  #[test]
  fn renders_project_and_service_variables() {
    let out = render("{{Project}}/{{Service}}", &ctx()).unwrap();
    assert_eq!(out, "acme/web");
  }

  #[test]
  fn default_tag_dirty_repo_matches_s4() {
    let at: DateTime<Utc> = "2024-05-06T07:08:09Z".parse().unwrap();
    let git = GitInfo {
      is_repo: true,
      is_dirty: true,
      sha: "84d33bb1234567890".into(),
      date: at,
    };
    assert_eq!(default_tag(at, &git), "2024-05-06-070809.84d33bb.dirty");
  }

  #[test]
  fn default_tag_outside_git_is_date_only() {
    let at: DateTime<Utc> = "2024-05-06T07:08:09Z".parse().unwrap();
    assert_eq!(default_tag(at, &GitInfo::default()), "2024-05-06-070809");
  }

  #[test]
  fn split_tag_ignores_registry_port() {
    assert_eq!(
      split_tag("registry.local:5000/acme/web:1.2.3"),
      ("registry.local:5000/acme/web", Some("1.2.3"))
    );
    assert_eq!(split_tag("registry.local:5000/acme/web"), ("registry.local:5000/acme/web", None));
  }
}
