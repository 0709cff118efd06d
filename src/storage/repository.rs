//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer. It wraps one bare
//!  `git2::Repository` and composes blob, tree, commit and ref operations
//!  into the operations the engine exposes. Nothing here goes through
//!  porcelain: there is no index and no working tree.
//!
//!  A `GitRepository` is cheap to open and is meant to live for one call.

use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use git2::{Repository, RepositoryInitOptions};
use tracing::debug;

use crate::storage::blob::{self, FileContent};
use crate::storage::commit::{self, CommitBuilder, CommitInfo, CommitMessage, History};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::{BranchInfo, RefManager};
use crate::storage::tree::{TreeMutator, TreeNode};
use crate::storage::types::{Author, BranchName, CommitId, FilePath};

/// path of the file written by the initial commit
const README_PATH: &str = "README.md";

/// Handle to one bare repository on disk.
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open_bare(path)
            .map_err(|_| StorageError::RepositoryNotFound(path.to_path_buf()))?;

        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    /// Initialize a new bare repository with HEAD on an unborn `default_branch`.
    ///
    /// Fails if a valid repository already exists at `path`.
    pub fn init(path: impl AsRef<Path>, default_branch: &BranchName) -> StorageResult<Self> {
        let path = path.as_ref();
        if Self::exists(path) {
            return Err(StorageError::RepositoryAlreadyInitialized(path.display().to_string()));
        }

        let mut opts = RepositoryInitOptions::new();
        opts.bare(true)
            .mkpath(true)
            .no_reinit(true)
            .initial_head(default_branch.as_str());
        let repo = Repository::init_opts(path, &opts)?;

        debug!(path = %path.display(), head = %default_branch, "initialized bare repository");
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    /// Check whether a valid repository lives at `path`. Never fails.
    pub fn exists(path: impl AsRef<Path>) -> bool {
        Repository::open_bare(path.as_ref()).is_ok()
    }

    /// Remove the repository container. Removing a missing one is a no-op.
    pub fn destroy(path: impl AsRef<Path>) -> StorageResult<()> {
        match std::fs::remove_dir_all(path.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> &Repository {
        &self.repo
    }

    // ==================== Branch Operations ====================

    /// Create `branch` at the tip of `from`.
    pub fn create_branch(&self, branch: &BranchName, from: &BranchName) -> StorageResult<CommitId> {
        RefManager::create_branch(&self.repo, branch, from)
    }

    /// Delete a branch, see [`RefManager::delete_branch`].
    pub fn delete_branch(&self, branch: &BranchName, force: bool) -> StorageResult<()> {
        RefManager::delete_branch(&self.repo, branch, force)
    }

    /// List all branches.
    pub fn list_branches(&self) -> StorageResult<Vec<BranchInfo>> {
        RefManager::list_branches(&self.repo)
    }

    /// Map heads, tags and HEAD to commit hashes.
    pub fn list_refs(&self) -> StorageResult<BTreeMap<String, String>> {
        RefManager::list_refs(&self.repo)
    }

    /// Resolve a branch to its tip.
    pub fn resolve_branch(&self, branch: &BranchName) -> StorageResult<CommitId> {
        RefManager::resolve_branch(&self.repo, branch)
    }

    // ==================== Commit Operations ====================

    /// Write `bytes` at `path` on `branch` as one new commit.
    ///
    /// A missing branch gets a root commit whose tree holds only this file.
    pub fn update_file(
        &self,
        branch: &BranchName,
        path: &FilePath,
        bytes: &[u8],
        message: &str,
        author: &Author,
    ) -> StorageResult<CommitInfo> {
        let repo = &self.repo;
        let parent = RefManager::try_resolve_branch(repo, branch)?;

        let blob_id = blob::write_blob(repo, bytes)?;

        let mut mutator = match parent {
            Some(tip) => TreeMutator::from_tree(repo, &commit::tree_of(repo, tip)?),
            None => TreeMutator::empty(repo),
        };
        mutator.upsert_file(path, blob_id)?;
        let tree_id = mutator.write()?;

        let message = if message.is_empty() {
            CommitMessage::update_file(&path.to_string())
        } else {
            message.to_string()
        };
        let commit_id = CommitBuilder::new(repo)
            .tree(tree_id)
            .parents(parent.into_iter().collect())
            .message(message)
            .author(author.clone())
            .commit()?;

        RefManager::advance_branch(repo, branch, parent, commit_id)?;

        if parent.is_none() && RefManager::head_commit(repo)?.is_none() {
            RefManager::set_head(repo, branch)?;
        }

        debug!(branch = %branch, path = %path, blob = %blob_id, commit = %commit_id, "file committed");
        commit::get_commit(repo, commit_id)
    }

    /// Remove `path` on `branch` as one new commit.
    ///
    /// The commit is made even when the path is already absent.
    pub fn delete_file(
        &self,
        branch: &BranchName,
        path: &FilePath,
        message: &str,
        author: &Author,
    ) -> StorageResult<CommitInfo> {
        let repo = &self.repo;
        let tip = RefManager::resolve_branch(repo, branch)?;

        let mut mutator = TreeMutator::from_tree(repo, &commit::tree_of(repo, tip)?);
        mutator.remove_file(path)?;
        let tree_id = mutator.write()?;

        let message = if message.is_empty() {
            CommitMessage::delete_file(&path.to_string())
        } else {
            message.to_string()
        };
        let commit_id = CommitBuilder::new(repo)
            .tree(tree_id)
            .parent(tip)
            .message(message)
            .author(author.clone())
            .commit()?;

        RefManager::advance_branch(repo, branch, Some(tip), commit_id)?;

        debug!(branch = %branch, path = %path, commit = %commit_id, "file deleted");
        commit::get_commit(repo, commit_id)
    }

    /// Seed an empty repository with a README on `branch`.
    ///
    /// Fails if any branch already exists.
    pub fn create_initial_commit(
        &self,
        branch: &BranchName,
        repository_name: &str,
        message: &str,
        author: &Author,
    ) -> StorageResult<CommitInfo> {
        if !self.list_branches()?.is_empty() {
            return Err(StorageError::RepositoryAlreadyInitialized(self.path.display().to_string()));
        }

        let readme = CommitMessage::initial_readme(repository_name);
        let path = FilePath::new(README_PATH)?;
        self.update_file(branch, &path, readme.as_bytes(), message, author)
    }

    // ==================== Read Operations ====================

    /// Read the file at `path` on the tip of `branch`.
    pub fn get_file(&self, branch: &BranchName, path: &FilePath) -> StorageResult<FileContent> {
        let repo = &self.repo;
        let tip = RefManager::resolve_branch(repo, branch)?;
        let tree = commit::tree_of(repo, tip)?;
        let blob = tree.blob_at(repo, path)?;
        Ok(FileContent::from_blob(path, &blob))
    }

    /// List the direct children of `dir` at `reference`.
    pub fn get_tree(&self, reference: &str, dir: &FilePath) -> StorageResult<Vec<TreeNode>> {
        let repo = &self.repo;
        let commit_id = RefManager::resolve_ref(repo, reference)?;
        let tree = commit::tree_of(repo, commit_id)?;
        let subtree = tree.subtree_at(repo, dir)?;
        subtree.list(repo, dir)
    }

    /// Get information about a commit by (possibly abbreviated) hash.
    pub fn get_commit(&self, hash: &str) -> StorageResult<CommitInfo> {
        commit::find_commit_by_hash(&self.repo, hash)
    }

    /// Walk history from the tip of `branch`, newest first.
    pub fn get_commits(&self, branch: &BranchName, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        let tip = RefManager::resolve_branch(&self.repo, branch)?;
        History::new(&self.repo, tip, limit)?.collect()
    }
}
