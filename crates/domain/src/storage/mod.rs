//! Store contract and the in-process implementation used by tests and
//! embedders that do not need persistence.

pub mod memory;
pub mod path;
pub mod traits;

pub use memory::InMemoryKvStore;
pub use path::{KeyPath, KeyPathError, PATH_SEPARATOR};
pub use traits::{KvStore, StorageError, StorageResult};
