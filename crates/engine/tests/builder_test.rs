#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use strata_core::{EngineSettings, Event, StrataError, Value};
    use strata_engine::{EventHandler, ManagerBuilder, RemoteSource};
    use tokio::sync::mpsc;

    fn write(dir: &std::path::Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_directory_entries_and_flag_priority() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("conf");
        std::fs::create_dir(&conf).unwrap();
        write(&conf, "a.yaml", "name: a\nport: 1\n");
        write(&conf, "b.yaml", "port: 2\n");
        let missing = dir.path().join("local.toml");

        let manager = ManagerBuilder::new()
            .watch_disabled()
            .with_file_source(
                [conf.to_str().unwrap()],
                [missing.to_str().unwrap()],
            )
            .build()
            .await
            .unwrap();
        assert_eq!(manager.get("name"), Some(Value::from("a")));
        assert_eq!(manager.get("port"), Some(Value::Int(2)));
        assert_eq!(manager.source("file").unwrap().paths().len(), 3);

        let manager = ManagerBuilder::new()
            .watch_disabled()
            .with_file_source([conf.to_str().unwrap()], Vec::<String>::new())
            .with_flag_source(["--port=9", "--verbose"])
            .build()
            .await
            .unwrap();
        assert_eq!(manager.get("port"), Some(Value::Int(9)));
        assert_eq!(manager.get("verbose"), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_missing_required_file_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("app.yaml");
        let err = ManagerBuilder::new()
            .with_file_source([missing.to_str().unwrap()], Vec::<String>::new())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Pull { .. }));
    }

    #[tokio::test]
    async fn test_env_source_with_prefix() {
        std::env::set_var("STRATA_BUILDER_TEST_DB_HOST", "envhost");
        let manager = ManagerBuilder::new()
            .with_env_source("STRATA_BUILDER_TEST")
            .build()
            .await
            .unwrap();
        assert_eq!(manager.get("db.host"), Some(Value::from("envhost")));
        assert_eq!(manager.get("DB_HOST"), Some(Value::from("envhost")));
        assert_eq!(manager.get("PATH"), None);
    }

    #[tokio::test]
    async fn test_expansion_options() {
        let manager = ManagerBuilder::new()
            .with_flag_source(["--greeting", "hi $C{name}", "--raw", "${greeting}"])
            .with_expansion("$C{", "}", |inner| Ok(Value::from(inner.to_uppercase())))
            .build()
            .await
            .unwrap();
        assert_eq!(manager.get("raw"), Some(Value::from("hi NAME")));

        let manager = ManagerBuilder::new()
            .with_flag_source(["--raw", "${greeting}"])
            .expand_disabled()
            .build()
            .await
            .unwrap();
        assert_eq!(manager.get("raw"), Some(Value::from("${greeting}")));
    }

    #[tokio::test]
    async fn test_from_settings() {
        let settings = EngineSettings::from_toml(
            r#"
[env]
prefix = "STRATA_SETTINGS_TEST_NOTHING"

[flag]
priority = 20

[[remotes]]
name = "central"
client = "memory"
optional_paths = ["app"]
"#,
        )
        .unwrap();
        let manager = ManagerBuilder::from_settings(&settings, vec!["--port=7".to_string()])
            .with_default("port", 1)
            .build()
            .await
            .unwrap();

        let names: Vec<String> = manager
            .sources()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["flag", "central", "env"]);
        assert_eq!(manager.get_i64("port", 0), 7);

        let unknown = EngineSettings::from_toml(
            r#"
[[remotes]]
name = "central"
client = "nacos"
"#,
        )
        .unwrap();
        let err = ManagerBuilder::from_settings(&unknown, Vec::new())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::UnknownClient(name) if name == "nacos"));
    }

    #[tokio::test]
    async fn test_remote_source_priority() {
        let manager = ManagerBuilder::new()
            .with_flag_source(["--port=3"])
            .with_remote_source(RemoteSource::new("central", "memory").with_optional_path("app"))
            .build()
            .await
            .unwrap();
        assert_eq!(manager.source("central").unwrap().priority(), 9);
        assert_eq!(manager.get("port"), Some(Value::Int(3)));
    }

    #[tokio::test]
    async fn test_file_change_reaches_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "app.yaml", "db:\n  host: one\n");

        let manager = ManagerBuilder::new()
            .with_debounce(Duration::from_millis(20))
            .with_file_source([path.as_str()], Vec::<String>::new())
            .build()
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: Arc<dyn EventHandler> = Arc::new(move |events: &[Event]| {
            for event in events {
                let _ = tx.send(event.clone());
            }
        });
        manager.watch(r"^db\.", handler).unwrap();

        std::fs::write(&path, "db:\n  host: two\n").unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("file change was not delivered")
            .unwrap();
        assert_eq!(event.key, "db.host");
        assert_eq!(event.value_to, Some(Value::from("two")));
        assert_eq!(manager.get("db.host"), Some(Value::from("two")));
        manager.close().unwrap();
    }
}
