//!  Branch and reference management.
//!
//!  Git refs are pointers to commits, and the only mutable state in a
//!  repository. This module handles:
//! - Branch lifecycle (create from another branch, delete with merge check)
//! - Compare-and-swap advancement of a branch onto a new commit
//! - Ref listing (heads, tags, HEAD)
//!
//! HEAD is always symbolic here: it names a branch, which may be unborn.

use std::collections::BTreeMap;

use git2::{ErrorCode, Repository};
use serde::Serialize;

use crate::storage::commit;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId};

/// a branch and the commit it points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: String,
    #[serde(rename = "commit_hash")]
    pub commit: CommitId,
}

/// Manages Git references (branches).
pub struct RefManager;

impl RefManager {
    const TAG_PREFIX: &'static str = "refs/tags/";

    /// Resolve a branch name to its current commit ID.
    pub fn resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<CommitId> {
        Self::try_resolve_branch(repo, branch)?
            .ok_or_else(|| StorageError::BranchNotFound(branch.to_string()))
    }

    /// Resolve a branch name, `None` if the branch does not exist.
    pub fn try_resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<Option<CommitId>> {
        let reference = match repo.find_reference(&branch.as_ref_path()) {
            Ok(reference) => reference,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Git(e)),
        };

        let commit = reference.peel_to_commit()?;
        Ok(Some(CommitId::new(commit.id())))
    }

    /// Check if a branch exists.
    pub fn branch_exists(repo: &Repository, branch: &BranchName) -> bool {
        repo.find_reference(&branch.as_ref_path()).is_ok()
    }

    /// The branch HEAD points at, whether or not it has commits yet.
    pub fn head_branch(repo: &Repository) -> StorageResult<Option<BranchName>> {
        let head = match repo.find_reference("HEAD") {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Git(e)),
        };

        Ok(head.symbolic_target().and_then(BranchName::from_ref_path))
    }

    /// Get the commit HEAD resolves to, `None` while HEAD is unborn.
    pub fn head_commit(repo: &Repository) -> StorageResult<Option<CommitId>> {
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                return Ok(None)
            }
            Err(e) => return Err(StorageError::Git(e)),
        };

        let commit = head.peel_to_commit()?;
        Ok(Some(CommitId::new(commit.id())))
    }

    /// Point the symbolic HEAD at a branch (which may be unborn).
    pub fn set_head(repo: &Repository, branch: &BranchName) -> StorageResult<()> {
        repo.set_head(&branch.as_ref_path())?;
        Ok(())
    }

    /// Create `branch` at the current tip of `from`.
    ///
    /// The new ref holds a copy of the commit ID, not a symbolic link to `from`.
    pub fn create_branch(repo: &Repository, branch: &BranchName, from: &BranchName) -> StorageResult<CommitId> {
        let target = Self::resolve_branch(repo, from)?;

        if Self::branch_exists(repo, branch) {
            return Err(StorageError::BranchAlreadyExists(branch.to_string()));
        }

        let log_message = format!("branch: Created from {}", from);
        repo.reference(&branch.as_ref_path(), target.raw(), false, &log_message)
            .map_err(|e| match e.code() {
                ErrorCode::Exists => StorageError::BranchAlreadyExists(branch.to_string()),
                _ => StorageError::Git(e),
            })?;

        Ok(target)
    }

    /// Move a branch onto a new commit.
    ///
    /// `expected` is the tip the caller read before computing `new_target`
    /// (`None` if the branch did not exist). The update is rejected with
    /// `ConcurrentModification` if the ref no longer matches it.
    pub fn advance_branch(
        repo: &Repository,
        branch: &BranchName,
        expected: Option<CommitId>,
        new_target: CommitId,
    ) -> StorageResult<()> {
        let refname = branch.as_ref_path();
        let log_message = format!("commit: advance to {}", new_target.short());

        let result = match expected {
            Some(current) => {
                repo.reference_matching(&refname, new_target.raw(), true, current.raw(), &log_message)
            }
            None => repo.reference(&refname, new_target.raw(), false, &log_message),
        };

        match result {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.code(), ErrorCode::Modified | ErrorCode::Exists | ErrorCode::NotFound) => {
                Err(StorageError::ConcurrentModification {
                    branch: branch.to_string(),
                })
            }
            Err(e) => Err(StorageError::Git(e)),
        }
    }

    /// Delete a branch.
    ///
    /// The HEAD branch can never be deleted. Unless `force` is set, the
    /// branch tip must also be reachable from HEAD's tip; an unborn HEAD
    /// reaches nothing.
    pub fn delete_branch(repo: &Repository, branch: &BranchName, force: bool) -> StorageResult<()> {
        let mut reference = match repo.find_reference(&branch.as_ref_path()) {
            Ok(reference) => reference,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(StorageError::BranchNotFound(branch.to_string()))
            }
            Err(e) => return Err(StorageError::Git(e)),
        };

        if Self::head_branch(repo)?.as_ref() == Some(branch) {
            return Err(StorageError::CurrentHeadDeletion(branch.to_string()));
        }

        if !force {
            let tip = CommitId::new(reference.peel_to_commit()?.id());
            let merged = match Self::head_commit(repo)? {
                Some(head) => commit::is_ancestor(repo, tip, head)?,
                None => false,
            };
            if !merged {
                return Err(StorageError::UnmergedBranchDeletion(branch.to_string()));
            }
        }

        reference.delete()?;
        Ok(())
    }

    /// List all local branches with their tips, sorted by name.
    pub fn list_branches(repo: &Repository) -> StorageResult<Vec<BranchInfo>> {
        let mut result = Vec::new();

        for reference in repo.references()? {
            let reference = reference?;
            let Some(name) = reference.name().and_then(BranchName::from_ref_path) else {
                continue;
            };
            let commit = reference.peel_to_commit()?;
            result.push(BranchInfo {
                name: name.as_str().to_string(),
                commit: CommitId::new(commit.id()),
            });
        }

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    /// Map every head, tag and (if it resolves) HEAD to a commit hash.
    ///
    /// Tags that do not peel to a commit are left out. An empty repository
    /// yields an empty map.
    pub fn list_refs(repo: &Repository) -> StorageResult<BTreeMap<String, String>> {
        let mut refs = BTreeMap::new();

        for reference in repo.references()? {
            let reference = reference?;
            let Some(name) = reference.name() else {
                continue;
            };

            if name.starts_with(BranchName::REF_PREFIX) {
                let commit = reference.peel_to_commit()?;
                refs.insert(name.to_string(), commit.id().to_string());
            } else if name.starts_with(Self::TAG_PREFIX) {
                if let Ok(commit) = reference.peel_to_commit() {
                    refs.insert(name.to_string(), commit.id().to_string());
                }
            }
        }

        if let Some(head) = Self::head_commit(repo)? {
            refs.insert("HEAD".to_string(), head.to_string());
        }

        Ok(refs)
    }

    /// Resolve a branch, tag, full ref name or commit hash to a commit.
    pub fn resolve_ref(repo: &Repository, reference: &str) -> StorageResult<CommitId> {
        if let Ok(branch) = BranchName::new(reference) {
            if let Some(id) = Self::try_resolve_branch(repo, &branch)? {
                return Ok(id);
            }
        }

        let candidates = [format!("{}{}", Self::TAG_PREFIX, reference), reference.to_string()];
        for candidate in &candidates {
            if let Ok(found) = repo.find_reference(candidate) {
                if let Ok(commit) = found.peel_to_commit() {
                    return Ok(CommitId::new(commit.id()));
                }
            }
        }

        commit::find_commit_by_hash(repo, reference)
            .map(|info| info.id)
            .map_err(|_| StorageError::RefNotFound(reference.to_string()))
    }
}
