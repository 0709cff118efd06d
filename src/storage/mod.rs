//! storage layer for gitforge
//!
//! this module manipulates the git object model of a single bare
//! repository directly: blobs, trees, commits and refs. The engine layer
//! above maps repository locations to these handles and never touches
//! git2 itself.
//!
//! # Layers
//!
//! ```text
//!   engine::RepositoryEngine        (location -> path, branch locks)
//!            │ opens per call
//!            ▼
//!   GitRepository                   (update_file, delete_file, get_*)
//!     │         │          │
//!     ▼         ▼          ▼
//!   blob      tree       refs       decode/write bytes, CoW path rewrite,
//!     │         │          │        CAS branch moves and HEAD
//!     └────► commit ◄──────┘        build commits, ancestry, history
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use gitforge::storage::{Author, BranchName, FilePath, GitRepository};
//!
//! let main = BranchName::new("main")?;
//! let repo = GitRepository::init("./repos/demo", &main)?;
//!
//! let author = Author::new("alice", "alice@example.com");
//! let commit = repo.update_file(&main, &FilePath::new("a.txt")?, b"hello", "init", &author)?;
//!
//! let file = repo.get_file(&main, &FilePath::new("a.txt")?)?;
//! assert_eq!(file.content, "hello");
//! ```

mod blob;
mod commit;
mod error;
mod refs;
mod repository;
mod tree;
mod types;

pub use blob::{decode_content, encode_content, FileContent};
pub use commit::CommitInfo;
pub use error::{ErrorKind, StorageError, StorageResult};
pub use refs::{BranchInfo, RefManager};
pub use repository::GitRepository;
pub use tree::TreeNode;
pub use types::{
    Author, BlobId, BranchName, CommitId, Encoding, EntryKind, FilePath, InvalidNameError,
    RepositoryLocation, TreeId,
};
