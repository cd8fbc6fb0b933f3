//! HTTP handlers, one module per resource
//!
//! Glob re-exports carry the `__path_*` items `#[utoipa::path]` generates,
//! which `openapi::ApiDoc` resolves through this module.

pub mod audit;
pub mod entry;
pub mod health;
pub mod session;
pub mod settlement;

pub use audit::*;
pub use entry::*;
pub use health::*;
pub use session::*;
pub use settlement::*;
