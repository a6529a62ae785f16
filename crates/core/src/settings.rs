//! Engine settings
//!
//! Settings decide which sources the engine starts with, their priorities
//! and how it logs. They are read from a TOML file and environment
//! variables prefixed with `STRATA_` (nested keys separated by `__`,
//! e.g. `STRATA_LOGGING__LEVEL=debug`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;
use crate::{StrataError, StrataResult};

const DEFAULT_PATHS: [&str; 3] = ["config/strata.toml", "strata.toml", "/etc/strata/config.toml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub logging: LoggingSettings,
    pub expansion: ExpansionSettings,
    pub client: ClientSettings,
    pub file: FileSourceSettings,
    pub env: EnvSourceSettings,
    pub flag: FlagSourceSettings,
    pub remotes: Vec<RemoteSourceSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionSettings {
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub pull_timeout_ms: u64,
    pub watch_disabled: bool,
    pub debounce_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            pull_timeout_ms: 5_000,
            watch_disabled: false,
            debounce_ms: 50,
        }
    }
}

impl ClientSettings {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Local files. Directories contribute every regular file directly
/// inside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSourceSettings {
    pub enabled: bool,
    pub priority: i32,
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub prefix: String,
    /// Publish keys removed from a file as deletions
    pub with_deleted: bool,
}

impl Default for FileSourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 0,
            required: Vec::new(),
            optional: Vec::new(),
            prefix: String::new(),
            with_deleted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvSourceSettings {
    pub enabled: bool,
    pub priority: i32,
    /// Only variables starting with this prefix are read; it is stripped
    pub prefix: String,
}

impl Default for EnvSourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 1,
            prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagSourceSettings {
    pub enabled: bool,
    pub priority: i32,
}

impl Default for FlagSourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 3,
        }
    }
}

/// A source backed by a registered client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSourceSettings {
    pub name: String,
    pub client: String,
    #[serde(default = "default_remote_priority")]
    pub priority: i32,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub optional_paths: Vec<String>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_remote_priority() -> i32 {
    9
}

impl EngineSettings {
    /// Load from `path`, or the first default location that exists, then
    /// apply `STRATA_` environment overrides.
    pub fn load(path: Option<&str>) -> StrataResult<Self> {
        let path = match path {
            Some(p) if !Path::new(p).exists() => {
                return Err(StrataError::config_error(format!(
                    "settings file does not exist: {p}"
                )))
            }
            Some(p) => Some(p),
            None => DEFAULT_PATHS.into_iter().find(|p| Path::new(p).exists()),
        };
        Self::build(path, true)
    }

    /// Load from one file without environment overrides
    pub fn from_file(path: &str) -> StrataResult<Self> {
        Self::build(Some(path), false)
    }

    pub fn from_toml(toml_str: &str) -> StrataResult<Self> {
        let settings: EngineSettings = toml::from_str(toml_str)
            .map_err(|e| StrataError::config_error(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> StrataResult<String> {
        toml::to_string_pretty(self).map_err(|e| StrataError::Serialization(e.to_string()))
    }

    fn build(path: Option<&str>, with_env: bool) -> StrataResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&EngineSettings::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix("STRATA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }
        let settings: EngineSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> StrataResult<()> {
        if self.client.pull_timeout_ms == 0 {
            return Err(StrataError::config_error(
                "client.pull_timeout_ms must be greater than zero",
            ));
        }
        let mut names = std::collections::HashSet::new();
        for remote in &self.remotes {
            if remote.name.trim().is_empty() {
                return Err(StrataError::config_error("remote source without a name"));
            }
            if remote.client.trim().is_empty() {
                return Err(StrataError::config_error(format!(
                    "remote source {} does not name a client",
                    remote.name
                )));
            }
            if !names.insert(remote.name.as_str()) {
                return Err(StrataError::config_error(format!(
                    "remote source {} is declared twice",
                    remote.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.file.priority, 0);
        assert_eq!(settings.env.priority, 1);
        assert_eq!(settings.flag.priority, 3);
        assert_eq!(settings.client.pull_timeout(), Duration::from_secs(5));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[logging]
level = "debug"
format = "json"

[file]
required = ["conf/app.yaml"]
priority = 2

[[remotes]]
name = "central"
client = "memory"
paths = ["app"]
"#
        )
        .unwrap();

        let settings = EngineSettings::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.file.required, vec!["conf/app.yaml".to_string()]);
        assert_eq!(settings.file.priority, 2);
        assert!(settings.env.enabled);
        assert_eq!(settings.remotes.len(), 1);
        assert_eq!(settings.remotes[0].priority, 9);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(EngineSettings::load(Some("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn test_validation_rejects_remote_without_client() {
        let err = EngineSettings::from_toml(
            r#"
[[remotes]]
name = "central"
client = ""
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("central"));
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = EngineSettings::default().to_toml().unwrap();
        let back = EngineSettings::from_toml(&text).unwrap();
        assert_eq!(back, EngineSettings::default());
    }
}
