//! Domain-level building blocks for the linkdrop record store: server and user
//! records, key paths, the store contract, and the registry facade shared by
//! every store backend.

pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use config::{ConfigError, StoreConfig};
pub use model::*;
pub use services::*;
pub use storage::*;
