//! Durable key-value backends for the session store.
//!
//! - `MemoryStore`: in-process map, nothing survives a restart
//! - `FileStore`: a JSON object file under the user cache directory
//! - `KeyringStore`: one OS keychain entry per key

pub mod file;
pub mod keychain;
pub mod memory;

pub use self::file::FileStore;
pub use self::keychain::KeyringStore;
pub use self::memory::MemoryStore;

use anyhow::Result;

/// A synchronous, durable string map.
///
/// Removing a key that is not present must succeed.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}
