//! gitforge - repository storage engine for a self-hosted code-hosting service
//!
//! Every repository is a bare git repository under one storage root. Files
//! are written straight into the object database (blob, copy-on-write tree
//! chain, commit, ref update) without a working tree or index, so the
//! engine can serve many repositories concurrently from one process.
//!
//! # Example
//!
//! ```no_run
//! use gitforge::engine::{EngineConfig, RepositoryEngine, UpdateFileRequest};
//! use gitforge::storage::{Author, RepositoryLocation};
//!
//! let engine = RepositoryEngine::new(EngineConfig::new("./repositories")).unwrap();
//! let location = RepositoryLocation::for_owner(1, 42).unwrap();
//! engine.provision(&location).unwrap();
//!
//! let author = Author::new("alice", "alice@example.com");
//! let request = UpdateFileRequest::text("main", "README.md", "# hello", "init", author);
//! engine.update_file(&location, &request).unwrap();
//! ```

pub mod engine;
pub mod storage;
