//! Built-in backend clients

mod env;
mod file;
mod flag;
mod memory;

use std::sync::Arc;

use strata_core::{Client, ClientRegistry};

pub use env::EnvClient;
pub use file::FileClient;
pub use flag::FlagClient;
pub use memory::MemoryClient;

pub const FILE: &str = "file";
pub const ENV: &str = "env";
pub const FLAG: &str = "flag";
pub const MEMORY: &str = "memory";

/// Register the built-in clients under their backend names
pub fn register_builtin(registry: &mut ClientRegistry) {
    registry.register(FILE, |config| {
        Ok(Arc::new(FileClient::new(config)?) as Arc<dyn Client>)
    });
    registry.register(ENV, |config| {
        Ok(Arc::new(EnvClient::new(config)) as Arc<dyn Client>)
    });
    registry.register(FLAG, |config| {
        Ok(Arc::new(FlagClient::new(config)) as Arc<dyn Client>)
    });
    registry.register(MEMORY, |config| {
        Ok(Arc::new(MemoryClient::new(config)) as Arc<dyn Client>)
    });
}

/// A registry holding only the built-in clients
pub fn builtin_registry() -> ClientRegistry {
    let mut registry = ClientRegistry::new();
    register_builtin(&mut registry);
    registry
}
