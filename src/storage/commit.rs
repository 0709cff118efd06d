//! commits and history
//!
//! every engine write produces exactly one commit:
//! - a file write or delete on an existing branch has the old tip as its only parent
//! - the first write to a missing branch is a root commit
//! - branch deletion safety is an ancestry question between two commits
//!
//! commits are built without touching refs; `RefManager` moves branches.

use chrono::{DateTime, TimeZone, Utc};
use git2::{Repository, Revwalk, Sort};
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{Author, CommitId, TreeId};

/// metadata of one commit, as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    #[serde(rename = "hash")]
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub author: Author,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let signature = commit.author();
        let timestamp = Utc
            .timestamp_opt(signature.when().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            author: Author::new(
                String::from_utf8_lossy(signature.name_bytes()),
                String::from_utf8_lossy(signature.email_bytes()),
            ),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            timestamp,
        }
    }

    /// no parents: the first commit of its branch
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }
}

/// writes one commit object
///
/// the author signs as both author and committer. No ref is updated.
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    author: Option<Author>,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            author: None,
        }
    }

    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// append one parent
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    /// replace the parent list; an empty list makes a root commit
    pub fn parents(mut self, parents: Vec<CommitId>) -> Self {
        self.parents = parents;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    /// write the commit object and return its ID
    pub fn commit(self) -> StorageResult<CommitId> {
        let (Some(tree_id), Some(author)) = (self.tree_id, self.author.as_ref()) else {
            return Err(StorageError::InvalidContent(
                "a commit needs both a tree and an author".to_string(),
            ));
        };

        let tree = self.repo.find_tree(tree_id.raw())?;
        let signature = author.to_git2_signature()?;
        let parents = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let oid = self
            .repo
            .commit(None, &signature, &signature, &self.message, &tree, &parent_refs)?;
        Ok(CommitId::new(oid))
    }
}

/// metadata of a commit known to exist
pub fn get_commit(repo: &Repository, id: CommitId) -> StorageResult<CommitInfo> {
    repo.find_commit(id.raw())
        .map(|commit| CommitInfo::from_git2(&commit))
        .map_err(|_| StorageError::CommitNotFound(id.to_string()))
}

/// look up a commit by full or abbreviated hex hash
///
/// malformed and unknown identifiers fail the same way.
pub fn find_commit_by_hash(repo: &Repository, hash: &str) -> StorageResult<CommitInfo> {
    let well_formed = (4..=40).contains(&hash.len()) && hash.bytes().all(|b| b.is_ascii_hexdigit());
    if !well_formed {
        return Err(StorageError::CommitNotFound(hash.to_string()));
    }

    repo.find_commit_by_prefix(hash)
        .map(|commit| CommitInfo::from_git2(&commit))
        .map_err(|_| StorageError::CommitNotFound(hash.to_string()))
}

/// the root tree a commit points at
pub fn tree_of(repo: &Repository, commit_id: CommitId) -> StorageResult<TreeHandle<'_>> {
    let commit = repo
        .find_commit(commit_id.raw())
        .map_err(|_| StorageError::CommitNotFound(commit_id.to_string()))?;
    Ok(TreeHandle::new(commit.tree()?))
}

/// check whether `ancestor` is reachable from `descendant` by parent edges
///
/// a commit counts as its own ancestor.
pub fn is_ancestor(repo: &Repository, ancestor: CommitId, descendant: CommitId) -> StorageResult<bool> {
    if ancestor == descendant {
        return Ok(true);
    }
    Ok(repo.graph_descendant_of(descendant.raw(), ancestor.raw())?)
}

/// ancestry walk from a tip, newest first, optionally bounded
pub struct History<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
    remaining: Option<usize>,
}

impl<'repo> History<'repo> {
    pub fn new(repo: &'repo Repository, tip: CommitId, limit: Option<usize>) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(tip.raw())?;

        Ok(Self {
            repo,
            revwalk,
            remaining: limit,
        })
    }
}

impl Iterator for History<'_> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }

        let step = self.revwalk.next()?;
        Some(
            step.and_then(|oid| self.repo.find_commit(oid))
                .map(|commit| CommitInfo::from_git2(&commit))
                .map_err(StorageError::Git),
        )
    }
}

/// messages and content generated on the caller's behalf
pub struct CommitMessage;

impl CommitMessage {
    /// default message of a file write
    pub fn update_file(path: &str) -> String {
        format!("Update {}", path)
    }

    /// default message of a file deletion
    pub fn delete_file(path: &str) -> String {
        format!("Delete {}", path)
    }

    /// README body written by the initial commit
    pub fn initial_readme(repository_name: &str) -> String {
        format!("# {}\n\nInitial commit", repository_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tree::create_empty_tree;
    use tempfile::TempDir;

    fn bare_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        (dir, repo)
    }

    fn author() -> Author {
        Author::new("test-user", "test@example.com")
    }

    fn commit_on(repo: &Repository, parents: Vec<CommitId>, message: &str) -> CommitId {
        let tree_id = create_empty_tree(repo).unwrap();
        CommitBuilder::new(repo)
            .tree(tree_id)
            .parents(parents)
            .message(message)
            .author(author())
            .commit()
            .unwrap()
    }

    #[test]
    fn test_root_commit() {
        let (_dir, repo) = bare_repo();
        let root = commit_on(&repo, vec![], "init");

        let info = get_commit(&repo, root).unwrap();
        assert!(info.is_root());
        assert_eq!(info.author, author());
        assert_eq!(info.message, "init");
    }

    #[test]
    fn test_commit_builder() {
        let (_dir, repo) = bare_repo();
        let initial = commit_on(&repo, vec![], "init");

        let tree_id = create_empty_tree(&repo).unwrap();
        let second = CommitBuilder::new(&repo)
            .tree(tree_id)
            .parent(initial)
            .message("Second commit\n\nbody")
            .author(author())
            .commit()
            .unwrap();

        let info = get_commit(&repo, second).unwrap();
        assert_eq!(info.parent_ids, vec![initial]);
        assert_eq!(info.message, "Second commit\n\nbody");
        assert_eq!(info.tree_id, tree_id);
    }

    #[test]
    fn test_commit_requires_author_and_tree() {
        let (_dir, repo) = bare_repo();
        let tree_id = create_empty_tree(&repo).unwrap();

        assert!(CommitBuilder::new(&repo).tree(tree_id).commit().is_err());
        assert!(CommitBuilder::new(&repo).author(author()).commit().is_err());
    }

    #[test]
    fn test_history_iteration() {
        let (_dir, repo) = bare_repo();
        let c1 = commit_on(&repo, vec![], "first");
        let c2 = commit_on(&repo, vec![c1], "second");
        let c3 = commit_on(&repo, vec![c2], "third");

        let commits: Vec<_> = History::new(&repo, c3, None).unwrap().collect::<Result<_, _>>().unwrap();

        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0].id, c3);
        assert_eq!(commits[1].id, c2);
        assert_eq!(commits[2].id, c1);

        let limited: Vec<_> = History::new(&repo, c3, Some(2)).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].id, c2);

        let empty: Vec<_> = History::new(&repo, c3, Some(0)).unwrap().collect::<Result<_, _>>().unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_ancestry() {
        let (_dir, repo) = bare_repo();
        let base = commit_on(&repo, vec![], "base");
        let left = commit_on(&repo, vec![base], "left");
        let right = commit_on(&repo, vec![base], "right");

        assert!(is_ancestor(&repo, base, left).unwrap());
        assert!(is_ancestor(&repo, left, left).unwrap());
        assert!(!is_ancestor(&repo, left, base).unwrap());
        assert!(!is_ancestor(&repo, left, right).unwrap());
    }

    #[test]
    fn test_find_by_hash() {
        let (_dir, repo) = bare_repo();
        let id = commit_on(&repo, vec![], "init");
        let full = id.to_string();

        assert_eq!(find_commit_by_hash(&repo, &full).unwrap().id, id);
        assert_eq!(find_commit_by_hash(&repo, &full[..10]).unwrap().id, id);
    }

    #[test]
    fn test_find_by_hash_not_found() {
        let (_dir, repo) = bare_repo();
        commit_on(&repo, vec![], "init");

        for bad in ["", "xyz", "zzzzzzzz", "0000000000000000000000000000000000000000"] {
            assert!(matches!(
                find_commit_by_hash(&repo, bad),
                Err(StorageError::CommitNotFound(_))
            ));
        }
    }

    #[test]
    fn test_find_by_hash_rejects_non_commit() {
        let (_dir, repo) = bare_repo();
        let blob = repo.blob(b"not a commit").unwrap();

        let result = find_commit_by_hash(&repo, &blob.to_string());
        assert!(matches!(result, Err(StorageError::CommitNotFound(_))));
    }

    #[test]
    fn test_commit_messages() {
        assert_eq!(CommitMessage::update_file("a.txt"), "Update a.txt");
        assert_eq!(CommitMessage::delete_file("a.txt"), "Delete a.txt");
        assert_eq!(CommitMessage::initial_readme("demo"), "# demo\n\nInitial commit");
    }
}
