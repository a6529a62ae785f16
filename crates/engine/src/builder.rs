//! Manager bootstrap
//!
//! Builds a [`Manager`] with the built-in file, environment and flag
//! sources plus any number of registry backed sources, either through
//! the fluent interface or from [`EngineSettings`].

use std::time::Duration;

use tracing::{debug, info};

use strata_core::settings::RemoteSourceSettings;
use strata_core::{
    ClientConfig, ClientRegistry, EngineSettings, ExpanderBuilder, StrataResult, Value,
};
use strata_infrastructure::clients::{ENV, FILE, FLAG};
use strata_infrastructure::{builtin_registry, parser_for_path};
use strata_source::{PathOptions, Source, SourceOptions};

use crate::Manager;

pub const DEFAULT_FILE_PRIORITY: i32 = 0;
pub const DEFAULT_ENV_PRIORITY: i32 = 1;
pub const DEFAULT_FLAG_PRIORITY: i32 = 3;
pub const DEFAULT_REMOTE_PRIORITY: i32 = 9;

/// Files larger than this are skipped when a directory is listed
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Path used for backends that expose a single document
const DEFAULT_PATH: &str = "default";

/// A source backed by a client from the registry
#[derive(Debug, Clone)]
pub struct RemoteSource {
    pub name: String,
    pub client: String,
    pub config: ClientConfig,
    pub required_paths: Vec<String>,
    pub optional_paths: Vec<String>,
    pub options: SourceOptions,
}

impl RemoteSource {
    pub fn new(name: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client: client.into(),
            config: ClientConfig::default(),
            required_paths: Vec::new(),
            optional_paths: Vec::new(),
            options: SourceOptions::default().with_priority(DEFAULT_REMOTE_PRIORITY),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.required_paths.push(path.into());
        self
    }

    pub fn with_optional_path(mut self, path: impl Into<String>) -> Self {
        self.optional_paths.push(path.into());
        self
    }

    pub fn with_options(mut self, options: SourceOptions) -> Self {
        self.options = options;
        self
    }
}

struct FileSpec {
    required: Vec<String>,
    optional: Vec<String>,
    options: SourceOptions,
}

/// Fluent builder for a [`Manager`]
pub struct ManagerBuilder {
    registry: ClientRegistry,
    client: ClientConfig,
    file: Option<FileSpec>,
    env: Option<(String, SourceOptions)>,
    flag: Option<(Vec<String>, SourceOptions)>,
    remotes: Vec<RemoteSource>,
    sources: Vec<Source>,
    defaults: Vec<(String, Value)>,
    expander: ExpanderBuilder,
    expand_disabled: bool,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            registry: builtin_registry(),
            client: ClientConfig::default(),
            file: None,
            env: None,
            flag: None,
            remotes: Vec::new(),
            sources: Vec::new(),
            defaults: Vec::new(),
            expander: ExpanderBuilder::default(),
            expand_disabled: false,
        }
    }

    /// Replace the client registry, e.g. to add remote backends
    pub fn with_registry(mut self, registry: ClientRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Switch off change watching for the built-in sources
    pub fn watch_disabled(mut self) -> Self {
        self.client.watch_disabled = true;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.client.debounce = debounce;
        self
    }

    /// Read `required` and `optional` files. A directory contributes the
    /// regular files directly inside it, in name order.
    pub fn with_file_source<R, O>(mut self, required: R, optional: O) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        self.file = Some(FileSpec {
            required: required.into_iter().map(Into::into).collect(),
            optional: optional.into_iter().map(Into::into).collect(),
            options: SourceOptions::default().with_priority(DEFAULT_FILE_PRIORITY),
        });
        self
    }

    /// Options of the file source; ignored unless the file source is on
    pub fn file_options(mut self, options: SourceOptions) -> Self {
        if let Some(file) = self.file.as_mut() {
            file.options = options;
        }
        self
    }

    /// Read the process environment. A non-empty `prefix` selects and
    /// strips matching variables.
    pub fn with_env_source(mut self, prefix: impl Into<String>) -> Self {
        self.env = Some((
            prefix.into(),
            SourceOptions::default().with_priority(DEFAULT_ENV_PRIORITY),
        ));
        self
    }

    pub fn env_options(mut self, options: SourceOptions) -> Self {
        if let Some(env) = self.env.as_mut() {
            env.1 = options;
        }
        self
    }

    /// Read `--key value` style arguments
    pub fn with_flag_source<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.flag = Some((
            args.into_iter().map(Into::into).collect(),
            SourceOptions::default().with_priority(DEFAULT_FLAG_PRIORITY),
        ));
        self
    }

    pub fn flag_options(mut self, options: SourceOptions) -> Self {
        if let Some(flag) = self.flag.as_mut() {
            flag.1 = options;
        }
        self
    }

    pub fn with_remote_source(mut self, remote: RemoteSource) -> Self {
        self.remotes.push(remote);
        self
    }

    /// Add a source assembled by the caller
    pub fn with_source(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    /// Register an extra placeholder syntax, see [`ExpanderBuilder`]
    pub fn with_expansion<F>(mut self, open: &str, close: &str, resolver: F) -> Self
    where
        F: Fn(&str) -> StrataResult<Value> + Send + Sync + 'static,
    {
        self.expander = self.expander.with_expansion(open, close, resolver);
        self
    }

    pub fn expand_disabled(mut self) -> Self {
        self.expand_disabled = true;
        self
    }

    /// Builder configured from engine settings. `args` feed the flag
    /// source when it is enabled.
    pub fn from_settings(settings: &EngineSettings, args: Vec<String>) -> Self {
        let timeout = settings.client.pull_timeout();
        let mut builder = Self::new().with_debounce(settings.client.debounce());
        if settings.client.watch_disabled {
            builder = builder.watch_disabled();
        }

        let file = &settings.file;
        if file.enabled && !(file.required.is_empty() && file.optional.is_empty()) {
            let mut options = SourceOptions::default()
                .with_priority(file.priority)
                .with_prefix(file.prefix.clone())
                .with_pull_timeout(timeout);
            if file.with_deleted {
                options = options.with_deleted();
            }
            builder = builder
                .with_file_source(file.required.clone(), file.optional.clone())
                .file_options(options);
        }
        if settings.env.enabled {
            builder = builder
                .with_env_source(settings.env.prefix.clone())
                .env_options(
                    SourceOptions::default()
                        .with_priority(settings.env.priority)
                        .with_pull_timeout(timeout),
                );
        }
        if settings.flag.enabled {
            builder = builder.with_flag_source(args).flag_options(
                SourceOptions::default()
                    .with_priority(settings.flag.priority)
                    .with_pull_timeout(timeout),
            );
        }
        for remote in &settings.remotes {
            let remote = remote_from_settings(remote, &builder.client, timeout);
            builder = builder.with_remote_source(remote);
        }
        if settings.expansion.disabled {
            builder = builder.expand_disabled();
        }
        builder
    }

    /// Create every configured source, pull its paths and add it to a
    /// new manager. Any required path that cannot be loaded fails the
    /// build.
    pub async fn build(self) -> StrataResult<Manager> {
        let manager = Manager::new(self.expander.build(), self.expand_disabled);
        for (key, value) in self.defaults {
            manager.set_default(key, value);
        }

        if let Some(file) = self.file {
            let client = self.registry.create(FILE, &self.client)?;
            let source = Source::new(FILE, client, file.options);
            for entry in &file.required {
                for path in files_in(entry).await? {
                    let options = PathOptions::required().with_parser(parser_for_path(&path));
                    source.add_path(&path, options).await?;
                }
            }
            for entry in &file.optional {
                for path in files_in(entry).await? {
                    let options = PathOptions::new().with_parser(parser_for_path(&path));
                    source.add_path(&path, options).await?;
                }
            }
            manager.add_source(source);
        }

        if let Some((prefix, options)) = self.env {
            let config = ClientConfig {
                prefix,
                ..self.client.clone()
            };
            let client = self.registry.create(ENV, &config)?;
            let source = Source::new(ENV, client, options);
            source.add_path(DEFAULT_PATH, PathOptions::required()).await?;
            manager.add_source(source);
        }

        if let Some((args, options)) = self.flag {
            let config = ClientConfig {
                args,
                ..self.client.clone()
            };
            let client = self.registry.create(FLAG, &config)?;
            let source = Source::new(FLAG, client, options);
            source.add_path(DEFAULT_PATH, PathOptions::required()).await?;
            manager.add_source(source);
        }

        for remote in self.remotes {
            let client = self.registry.create(&remote.client, &remote.config)?;
            let source = Source::new(remote.name, client, remote.options);
            for path in &remote.required_paths {
                source.add_path(path, PathOptions::required()).await?;
            }
            for path in &remote.optional_paths {
                source.add_path(path, PathOptions::new()).await?;
            }
            manager.add_source(source);
        }

        for source in self.sources {
            manager.add_source(source);
        }

        info!(sources = manager.sources().len(), "configuration manager ready");
        Ok(manager)
    }
}

fn remote_from_settings(
    remote: &RemoteSourceSettings,
    base: &ClientConfig,
    timeout: Duration,
) -> RemoteSource {
    let config = ClientConfig {
        prefix: remote.prefix.clone(),
        extra: remote.extra.clone(),
        ..base.clone()
    };
    let mut source = RemoteSource::new(remote.name.clone(), remote.client.clone())
        .with_config(config)
        .with_options(
            SourceOptions::default()
                .with_priority(remote.priority)
                .with_pull_timeout(timeout),
        );
    source.required_paths = remote.paths.clone();
    source.optional_paths = remote.optional_paths.clone();
    source
}

/// Regular files directly inside `entry` when it is a directory, in
/// name order, otherwise `entry` itself.
async fn files_in(entry: &str) -> StrataResult<Vec<String>> {
    let is_dir = tokio::fs::metadata(entry)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Ok(vec![entry.to_string()]);
    }

    let mut files = Vec::new();
    let mut dir = tokio::fs::read_dir(entry).await?;
    while let Some(item) = dir.next_entry().await? {
        let meta = item.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        if meta.len() >= MAX_FILE_SIZE {
            debug!(path = %item.path().display(), size = meta.len(), "file too large, skipped");
            continue;
        }
        files.push(item.path());
    }
    files.sort();
    Ok(files
        .iter()
        .filter_map(|p| p.to_str().map(str::to_string))
        .collect())
}
