//! Built-in backends and formats
//!
//! Clients for local files, process environment, command line flags and
//! an in-process document store, the YAML/JSON/TOML/properties parsers,
//! and the flattening step that turns nested documents into `a.b[0]`
//! keys.

pub mod clients;
pub mod flatten;
pub mod parsers;

pub use clients::{builtin_registry, register_builtin, EnvClient, FileClient, FlagClient, MemoryClient};
pub use flatten::{flatten, flatten_into};
pub use parsers::{
    parser_for_path, DefaultParser, JsonParser, PropertiesParser, TomlParser, YamlParser,
};
