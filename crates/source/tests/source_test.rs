#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use strata_core::{
        Action, ChangeCallback, Client, ClientConfig, Event, StrataError, StrataResult, Value,
    };
    use strata_infrastructure::{JsonParser, MemoryClient};
    use strata_source::{PathOptions, Source, SourceOptions};
    use tokio::sync::mpsc;

    fn memory(docs: &[(&str, &str)]) -> Arc<MemoryClient> {
        let mut client = MemoryClient::new(&ClientConfig::default());
        for (path, body) in docs {
            client = client.with_document(*path, body.as_bytes().to_vec());
        }
        Arc::new(client)
    }

    fn listen(source: &Source) -> mpsc::UnboundedReceiver<Vec<Event>> {
        let (tx, rx) = mpsc::unbounded_channel();
        source.on_events(move |batch| {
            let _ = tx.send(batch);
        });
        rx
    }

    async fn next_batch(rx: &mut mpsc::UnboundedReceiver<Vec<Event>>) -> Vec<Event> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for events")
            .expect("listener closed")
    }

    #[tokio::test]
    async fn test_required_and_optional_paths() {
        let client = memory(&[("app.json", r#"{"db": {"host": "localhost"}}"#)]);
        let source = Source::new("files", client, SourceOptions::default());

        source
            .add_path("app.json", PathOptions::required())
            .await
            .unwrap();
        assert_eq!(source.get("db.host"), Some(Value::from("localhost")));

        let err = source
            .add_path("missing.json", PathOptions::required())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Pull { .. }));
        assert!(!source.has_path("missing.json"));

        source
            .add_path("missing.json", PathOptions::new())
            .await
            .unwrap();
        assert!(source.has_path("missing.json"));
        assert_eq!(source.keys(), vec!["db.host".to_string()]);
    }

    #[tokio::test]
    async fn test_add_path_is_idempotent() {
        let client = memory(&[("app.json", r#"{"a": 1}"#)]);
        let source = Source::new("files", client, SourceOptions::default());
        let mut rx = listen(&source);

        source.add_path("app.json", PathOptions::new()).await.unwrap();
        source.add_path("app.json", PathOptions::new()).await.unwrap();
        assert_eq!(source.paths(), vec!["app.json".to_string()]);

        let batch = next_batch(&mut rx).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].action, Action::Created);
        assert_eq!(batch[0].source, "files");
        assert_eq!(batch[0].path, "app.json");
        assert!(tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_higher_priority_path_owns_key() {
        let client = memory(&[
            ("base.json", r#"{"port": 80, "name": "base"}"#),
            ("local.json", r#"{"port": 8080}"#),
        ]);
        let source = Source::new(
            "files",
            Arc::clone(&client) as Arc<dyn Client>,
            SourceOptions::default().with_deleted(),
        );
        source
            .add_path("local.json", PathOptions::new().with_priority(5))
            .await
            .unwrap();
        source
            .add_path("base.json", PathOptions::new().with_priority(1))
            .await
            .unwrap();

        assert_eq!(source.paths(), vec!["local.json", "base.json"]);
        assert_eq!(source.get("port"), Some(Value::Int(8080)));
        assert_eq!(source.get("name"), Some(Value::from("base")));

        let mut rx = listen(&source);
        client.push("local.json", b"{}").await.unwrap();
        let batch = next_batch(&mut rx).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].action, Action::Updated);
        assert_eq!(batch[0].value_from, Some(Value::Int(8080)));
        assert_eq!(batch[0].value_to, Some(Value::Int(80)));
        assert_eq!(source.get("port"), Some(Value::Int(80)));

        client.push("base.json", br#"{"name": "base"}"#).await.unwrap();
        let batch = next_batch(&mut rx).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].action, Action::Deleted);
        assert_eq!(batch[0].key, "port");
        assert_eq!(source.get("port"), None);
    }

    #[tokio::test]
    async fn test_lower_priority_change_is_hidden() {
        let client = memory(&[
            ("base.json", r#"{"port": 80}"#),
            ("local.json", r#"{"port": 8080}"#),
        ]);
        let source = Source::new(
            "files",
            Arc::clone(&client) as Arc<dyn Client>,
            SourceOptions::default(),
        );
        source
            .add_path("local.json", PathOptions::new().with_priority(5))
            .await
            .unwrap();
        source
            .add_path("base.json", PathOptions::new().with_priority(1))
            .await
            .unwrap();

        let mut rx = listen(&source);
        client
            .push("base.json", br#"{"port": 81, "extra": true}"#)
            .await
            .unwrap();
        let batch = next_batch(&mut rx).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].key, "extra");
        assert_eq!(source.get("port"), Some(Value::Int(8080)));
    }

    #[tokio::test]
    async fn test_removed_keys_are_kept_without_deletions() {
        let client = memory(&[("app.json", r#"{"a": 1, "b": 2}"#)]);
        let source = Source::new(
            "files",
            Arc::clone(&client) as Arc<dyn Client>,
            SourceOptions::default(),
        );
        source.add_path("app.json", PathOptions::new()).await.unwrap();
        let mut rx = listen(&source);

        client.push("app.json", br#"{"a": 5}"#).await.unwrap();
        let batch = next_batch(&mut rx).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].action, Action::Updated);
        assert_eq!(source.get("b"), Some(Value::Int(2)));
    }

    #[tokio::test]
    async fn test_watch_disabled_path_ignores_pushes() {
        let client = memory(&[("app.json", r#"{"a": 1}"#)]);
        let source = Source::new(
            "files",
            Arc::clone(&client) as Arc<dyn Client>,
            SourceOptions::default().with_parser(Arc::new(JsonParser)),
        );
        source
            .add_path("app.json", PathOptions::new().watch_disabled())
            .await
            .unwrap();
        assert!(!client.is_watched("app.json"));

        client.push("app.json", br#"{"a": 2}"#).await.unwrap();
        assert_eq!(source.get("a"), Some(Value::Int(1)));
    }

    #[tokio::test]
    async fn test_prefix_and_set() {
        let client = memory(&[("app.json", r#"{"a": 1}"#)]);
        let source = Source::new(
            "",
            client,
            SourceOptions::default().with_prefix("svc"),
        );
        assert!(source.name().starts_with("source-"));
        source.add_path("app.json", PathOptions::new()).await.unwrap();
        assert_eq!(source.get("svc.a"), Some(Value::Int(1)));

        source.set("svc.a", Value::Int(9));
        source.set("svc.unknown", Value::Int(1));
        assert_eq!(source.get("svc.a"), Some(Value::Int(9)));
        assert!(!source.contains("svc.unknown"));
    }

    #[tokio::test]
    async fn test_dropped_source_stops_watch_callbacks() {
        let client = memory(&[("app.json", r#"{"a": 1}"#)]);
        let source = Source::new(
            "files",
            Arc::clone(&client) as Arc<dyn Client>,
            SourceOptions::default(),
        );
        source.add_path("app.json", PathOptions::new()).await.unwrap();
        let weak = source.downgrade();
        drop(source);
        assert!(weak.upgrade().is_none());
        client.push("app.json", br#"{"a": 2}"#).await.unwrap();
    }

    struct SlowClient;

    #[async_trait]
    impl Client for SlowClient {
        fn name(&self) -> &str {
            "slow"
        }

        async fn pull(&self, _path: &str) -> StrataResult<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(b"{}".to_vec())
        }

        fn watch(&self, _path: &str, _on_change: ChangeCallback) -> StrataResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pull_timeout() {
        let source = Source::new(
            "slow",
            Arc::new(SlowClient),
            SourceOptions::default().with_pull_timeout(Duration::from_millis(50)),
        );
        let err = source
            .add_path("a", PathOptions::required())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Timeout(_)));
        assert!(err.is_retryable());

        source.add_path("a", PathOptions::new()).await.unwrap();
        assert!(source.all().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_path_updates_keep_event_order() {
        const ROUNDS: i64 = 200;
        let client = memory(&[("left.json", r#"{"k": 0}"#), ("right.json", "{}")]);
        let source = Source::new("files", client, SourceOptions::default());
        let mut rx = listen(&source);
        source.add_path("left.json", PathOptions::new()).await.unwrap();
        source.add_path("right.json", PathOptions::new()).await.unwrap();

        std::thread::scope(|scope| {
            for (path, offset) in [("left.json", 1), ("right.json", 2)] {
                let source = source.clone();
                scope.spawn(move || {
                    for round in 0..ROUNDS {
                        let body = format!(r#"{{"k": {}}}"#, round * 2 + offset);
                        source.handle_path_updated(path, body.as_bytes()).unwrap();
                    }
                });
            }
        });

        let mut events = Vec::new();
        while let Ok(Some(batch)) =
            tokio::time::timeout(Duration::from_millis(300), rx.recv()).await
        {
            events.extend(batch);
        }
        assert_eq!(events.len() as i64, 1 + 2 * ROUNDS);
        assert_eq!(events[0].action, Action::Created);
        for pair in events.windows(2) {
            assert_eq!(pair[1].value_from, pair[0].value_to, "events out of order");
        }
        assert_eq!(events.last().and_then(|e| e.value_to.clone()), source.get("k"));
    }
}
