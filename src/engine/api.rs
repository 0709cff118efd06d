//! Engine API - the repository contract exposed to the web tier.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::config::EngineConfig;
use crate::engine::locks::BranchLocks;
use crate::engine::request::{DeleteFileRequest, UpdateFileRequest};
use crate::storage::{
    decode_content, Author, BranchInfo, BranchName, CommitInfo, Encoding, ErrorKind, FileContent,
    FilePath, GitRepository, RepositoryLocation, StorageResult, TreeNode,
};

/// A provisioned repository on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryDescriptor {
    pub location: RepositoryLocation,
    pub full_path: PathBuf,
}

/// The repository storage engine.
///
/// Every operation takes a [`RepositoryLocation`] and opens that repository
/// for the duration of the call; nothing is cached between calls. Calls
/// block on filesystem I/O, so async callers should run them on a blocking
/// worker pool.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone)]
pub struct RepositoryEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    default_branch: BranchName,
    /// Serializes writers per (repository, branch).
    locks: BranchLocks,
}

impl RepositoryEngine {
    /// Create an engine over `config.storage_root`.
    pub fn new(config: EngineConfig) -> StorageResult<Self> {
        let default_branch = BranchName::new(config.default_branch.clone())?;

        if config.create_root {
            std::fs::create_dir_all(&config.storage_root)?;
        } else {
            std::fs::metadata(&config.storage_root)?;
        }

        info!(
            root = %config.storage_root.display(),
            default_branch = %default_branch,
            "repository engine ready"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                default_branch,
                locks: BranchLocks::new(),
            }),
        })
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Directory holding the repository at `location`.
    pub fn repository_path(&self, location: &RepositoryLocation) -> PathBuf {
        location.under(&self.inner.config.storage_root)
    }

    fn open(&self, location: &RepositoryLocation) -> StorageResult<GitRepository> {
        GitRepository::open(self.repository_path(location))
    }

    // ==================== Lifecycle ====================

    /// Create an empty bare repository at `location`.
    ///
    /// HEAD points at the unborn default branch until the first commit.
    pub fn provision(&self, location: &RepositoryLocation) -> StorageResult<RepositoryDescriptor> {
        let full_path = self.repository_path(location);
        let result = GitRepository::init(&full_path, &self.inner.default_branch);
        let repo = traced("provision", location, result)?;

        info!(location = %location, path = %repo.path().display(), "repository provisioned");
        Ok(RepositoryDescriptor {
            location: location.clone(),
            full_path,
        })
    }

    /// Whether a valid repository lives at `location`.
    pub fn exists(&self, location: &RepositoryLocation) -> bool {
        GitRepository::exists(self.repository_path(location))
    }

    /// Remove the repository at `location`. Missing repositories are ignored.
    pub fn destroy(&self, location: &RepositoryLocation) -> StorageResult<()> {
        let result = GitRepository::destroy(self.repository_path(location));
        traced("destroy", location, result)?;

        self.inner.locks.forget(location);
        info!(location = %location, "repository destroyed");
        Ok(())
    }

    // ==================== Branches ====================

    /// Create branch `name` at the current tip of `from`.
    pub fn create_branch(
        &self,
        location: &RepositoryLocation,
        name: &str,
        from: &str,
    ) -> StorageResult<BranchInfo> {
        let result = (|| -> StorageResult<BranchInfo> {
            let branch = BranchName::new(name)?;
            let from = BranchName::new(from)?;
            let repo = self.open(location)?;

            let slot = self.inner.locks.slot(location, &branch);
            let _guard = slot.lock();
            let commit = repo.create_branch(&branch, &from)?;

            info!(location = %location, branch = %branch, from = %from, commit = %commit, "branch created");
            Ok(BranchInfo {
                name: branch.as_str().to_string(),
                commit,
            })
        })();
        traced("create_branch", location, result)
    }

    /// Delete branch `name`.
    ///
    /// Without `force`, the branch tip must be reachable from HEAD.
    pub fn delete_branch(&self, location: &RepositoryLocation, name: &str, force: bool) -> StorageResult<()> {
        let result = (|| -> StorageResult<()> {
            let branch = BranchName::new(name)?;
            let repo = self.open(location)?;

            let slot = self.inner.locks.slot(location, &branch);
            let _guard = slot.lock();
            repo.delete_branch(&branch, force)?;

            info!(location = %location, branch = %branch, force, "branch deleted");
            Ok(())
        })();
        traced("delete_branch", location, result)
    }

    /// List branches sorted by name.
    pub fn list_branches(&self, location: &RepositoryLocation) -> StorageResult<Vec<BranchInfo>> {
        let result = self.open(location).and_then(|repo| repo.list_branches());
        traced("list_branches", location, result)
    }

    /// Map every head, tag and a resolvable HEAD to its commit hash.
    pub fn list_refs(&self, location: &RepositoryLocation) -> StorageResult<BTreeMap<String, String>> {
        let result = self.open(location).and_then(|repo| repo.list_refs());
        traced("list_refs", location, result)
    }

    // ==================== Writes ====================

    /// Write one file as a new commit on the requested branch.
    ///
    /// A branch that does not exist yet receives a root commit.
    pub fn update_file(
        &self,
        location: &RepositoryLocation,
        request: &UpdateFileRequest,
    ) -> StorageResult<CommitInfo> {
        let result = (|| -> StorageResult<CommitInfo> {
            let branch = BranchName::new(request.branch.as_str())?;
            let path = FilePath::new(&request.path)?;
            let encoding: Encoding = request.encoding.parse()?;
            let bytes = decode_content(&request.content, encoding)?;
            request.author.validate()?;
            let repo = self.open(location)?;

            let slot = self.inner.locks.slot(location, &branch);
            let _guard = slot.lock();
            let info = repo.update_file(&branch, &path, &bytes, &request.message, &request.author)?;

            info!(
                location = %location,
                branch = %branch,
                path = %path,
                commit = %info.id,
                size = bytes.len(),
                "file updated"
            );
            Ok(info)
        })();
        traced("update_file", location, result)
    }

    /// Remove one file as a new commit on an existing branch.
    pub fn delete_file(
        &self,
        location: &RepositoryLocation,
        request: &DeleteFileRequest,
    ) -> StorageResult<CommitInfo> {
        let result = (|| -> StorageResult<CommitInfo> {
            let branch = BranchName::new(request.branch.as_str())?;
            let path = FilePath::new(&request.path)?;
            request.author.validate()?;
            let repo = self.open(location)?;

            let slot = self.inner.locks.slot(location, &branch);
            let _guard = slot.lock();
            let info = repo.delete_file(&branch, &path, &request.message, &request.author)?;

            info!(location = %location, branch = %branch, path = %path, commit = %info.id, "file deleted");
            Ok(info)
        })();
        traced("delete_file", location, result)
    }

    /// Seed an empty repository with a README on `branch`.
    ///
    /// Holds the repository-wide slot so that only one of several concurrent
    /// seeds, on any branches, finds the repository empty.
    pub fn create_initial_commit(
        &self,
        location: &RepositoryLocation,
        branch: &str,
        repository_name: &str,
        message: &str,
        author: &Author,
    ) -> StorageResult<CommitInfo> {
        let result = (|| -> StorageResult<CommitInfo> {
            let branch = BranchName::new(branch)?;
            author.validate()?;
            let repo = self.open(location)?;

            let repository_slot = self.inner.locks.repository(location);
            let _repository_guard = repository_slot.lock();
            let slot = self.inner.locks.slot(location, &branch);
            let _guard = slot.lock();
            let info = repo.create_initial_commit(&branch, repository_name, message, author)?;

            info!(location = %location, branch = %branch, commit = %info.id, "initial commit created");
            Ok(info)
        })();
        traced("create_initial_commit", location, result)
    }

    // ==================== Reads ====================

    /// Read a file at the tip of `branch`.
    pub fn get_file(&self, location: &RepositoryLocation, branch: &str, path: &str) -> StorageResult<FileContent> {
        let result = (|| -> StorageResult<FileContent> {
            let branch = BranchName::new(branch)?;
            let path = FilePath::new(path)?;
            self.open(location)?.get_file(&branch, &path)
        })();
        traced("get_file", location, result)
    }

    /// List the direct children of `path` at `reference`. An empty path is the root.
    pub fn get_tree(
        &self,
        location: &RepositoryLocation,
        reference: &str,
        path: &str,
    ) -> StorageResult<Vec<TreeNode>> {
        let result = (|| -> StorageResult<Vec<TreeNode>> {
            let dir = FilePath::root_or(path)?;
            self.open(location)?.get_tree(reference, &dir)
        })();
        traced("get_tree", location, result)
    }

    /// Look up a commit by full or abbreviated hash.
    pub fn get_commit(&self, location: &RepositoryLocation, hash: &str) -> StorageResult<CommitInfo> {
        let result = self.open(location).and_then(|repo| repo.get_commit(hash));
        traced("get_commit", location, result)
    }

    /// History of `branch`, newest first. `None` walks the whole ancestry.
    pub fn get_commits(
        &self,
        location: &RepositoryLocation,
        branch: &str,
        limit: Option<usize>,
    ) -> StorageResult<Vec<CommitInfo>> {
        let result = (|| -> StorageResult<Vec<CommitInfo>> {
            let branch = BranchName::new(branch)?;
            self.open(location)?.get_commits(&branch, limit)
        })();
        traced("get_commits", location, result)
    }
}

/// log a failed operation once, at a level matching its family
fn traced<T>(operation: &'static str, location: &RepositoryLocation, result: StorageResult<T>) -> StorageResult<T> {
    if let Err(e) = &result {
        match e.kind() {
            ErrorKind::Fatal => warn!(operation, location = %location, error = %e, "storage fault"),
            kind => debug!(operation, location = %location, kind = ?kind, error = %e, "operation rejected"),
        }
    }
    result
}
