use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use strata_core::{EngineSettings, Event};
use strata_engine::{EventHandler, Manager, ManagerBuilder};

use crate::shutdown::wait_for_shutdown_signal;

/// What the command line asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(String),
    All,
    Keys,
    Watch(String),
}

/// Command line adjustments applied on top of the loaded settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub files: Vec<String>,
    pub optional_files: Vec<String>,
    pub no_env: bool,
    pub no_expand: bool,
}

impl CliOverrides {
    pub fn apply(&self, settings: &mut EngineSettings) {
        settings.file.required.extend(self.files.iter().cloned());
        settings.file.optional.extend(self.optional_files.iter().cloned());
        if !self.files.is_empty() || !self.optional_files.is_empty() {
            settings.file.enabled = true;
        }
        if self.no_env {
            settings.env.enabled = false;
        }
        if self.no_expand {
            settings.expansion.disabled = true;
        }
    }
}

pub struct Application {
    manager: Manager,
}

impl Application {
    pub async fn new(settings: &EngineSettings, flags: Vec<String>) -> Result<Self> {
        let manager = ManagerBuilder::from_settings(settings, flags)
            .build()
            .await
            .context("failed to load configuration")?;
        Ok(Self { manager })
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Execute `command`, writing its output to `out`. `Watch` streams
    /// events to stdout until a shutdown signal arrives.
    pub async fn run<W: Write>(&self, command: Command, out: &mut W) -> Result<()> {
        match command {
            Command::Get(key) => {
                let value = self
                    .manager
                    .expand(&key)
                    .with_context(|| format!("cannot read {key}"))?;
                writeln!(out, "{value}")?;
            }
            Command::All => {
                let all = self.manager.all();
                writeln!(out, "{}", serde_json::to_string_pretty(&all)?)?;
            }
            Command::Keys => {
                for key in self.manager.keys() {
                    writeln!(out, "{key}")?;
                }
            }
            Command::Watch(pattern) => {
                let handler: Arc<dyn EventHandler> = Arc::new(|events: &[Event]| {
                    for event in events {
                        println!("{event}");
                    }
                });
                let id = self.manager.watch(&pattern, handler)?;
                info!(pattern = %pattern, watch_id = id, "watching for changes");
                wait_for_shutdown_signal().await;
                self.manager.unwatch(id);
            }
        }
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        if let Err(e) = self.manager.close() {
            bail!("failed to close sources: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_for(path: &str) -> EngineSettings {
        let mut settings = EngineSettings::default();
        CliOverrides {
            files: vec![path.to_string()],
            no_env: true,
            ..CliOverrides::default()
        }
        .apply(&mut settings);
        settings.client.watch_disabled = true;
        settings
    }

    async fn output(app: &Application, command: Command) -> String {
        let mut out = Vec::new();
        app.run(command, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_get_all_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.yaml");
        std::fs::write(&path, "db:\n  host: local\n  url: pg://${db.host}\n").unwrap();

        let settings = settings_for(path.to_str().unwrap());
        assert!(!settings.env.enabled);
        let app = Application::new(&settings, vec!["--db.port=5432".to_string()])
            .await
            .unwrap();

        assert_eq!(output(&app, Command::Get("db.url".into())).await, "pg://local\n");
        assert_eq!(
            output(&app, Command::Keys).await,
            "db.host\ndb.port\ndb.url\n"
        );
        let all: serde_json::Value =
            serde_json::from_str(&output(&app, Command::All).await).unwrap();
        assert_eq!(all["db.port"], serde_json::json!(5432));
        assert_eq!(all["db.url"], serde_json::json!("pg://${db.host}"));

        let mut out = Vec::new();
        assert!(app.run(Command::Get("missing".into()), &mut out).await.is_err());
        app.close().unwrap();
    }

    #[test]
    fn test_overrides() {
        let mut settings = EngineSettings::default();
        settings.file.enabled = false;
        CliOverrides {
            optional_files: vec!["local.yaml".into()],
            no_expand: true,
            ..CliOverrides::default()
        }
        .apply(&mut settings);
        assert!(settings.file.enabled);
        assert_eq!(settings.file.optional, vec!["local.yaml".to_string()]);
        assert!(settings.expansion.disabled);
        assert!(settings.env.enabled);
    }
}
