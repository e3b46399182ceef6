//! Registry facade, reply envelope and telemetry wiring.

pub mod registry;
pub mod reply;
pub mod telemetry;

pub use registry::*;
pub use reply::*;
pub use telemetry::*;
