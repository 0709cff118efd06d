//! Multi-repository engine.
//!
//! The web tier talks to this module only. It maps an opaque
//! [`RepositoryLocation`](crate::storage::RepositoryLocation) to a bare
//! repository under the configured storage root, validates raw request
//! strings into storage types and serializes writers per branch.

mod api;
mod config;
mod locks;
mod request;

pub use api::{RepositoryDescriptor, RepositoryEngine};
pub use config::{ConfigError, EngineConfig, ENV_DEFAULT_BRANCH, ENV_HISTORY_LIMIT, ENV_STORAGE_ROOT};
pub use locks::BranchLocks;
pub use request::{DeleteFileRequest, UpdateFileRequest};
