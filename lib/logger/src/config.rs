use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LogConfig {
  /// The minimum level of logs to show.
  #[serde(default)]
  pub level: LogLevel,
  /// Which stdout/stderr format to emit, if any.
  #[serde(default)]
  pub stdio: StdioLogMode,
  /// Use `tracing`'s pretty formatter instead of the compact one.
  #[serde(default)]
  pub pretty: bool,
  /// Include the module path on each line.
  #[serde(default)]
  pub location: bool,
  /// Colorize terminal output.
  #[serde(default = "default_true")]
  pub ansi: bool,
}

fn default_true() -> bool {
  true
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogLevel {
  Error,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

impl From<LogLevel> for tracing::Level {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Error => tracing::Level::ERROR,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Trace => tracing::Level::TRACE,
    }
  }
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}
