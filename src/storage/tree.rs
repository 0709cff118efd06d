//! tree operations for file management.
//!
//! in Git, a tree is a directory. Trees are immutable, so changing one file
//! means writing a fresh copy of every tree on the way from that file up to
//! the root; untouched siblings are shared by hash.
//!
//! this module provides safe abstractions over Git's tree manipulation,
//! which is notoriously fiddly to get right.

use std::cmp::Ordering;

use git2::{ErrorCode, FileMode, ObjectType, Oid, Repository, Tree};
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, EntryKind, FilePath, InvalidNameError, TreeId};

/// A read only handle to a git tree at a specific commit
///
/// think of it as a snapshot - it won't change even if new commits are made.
#[derive(Debug)]
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    /// create a TreeHandle from a git2::Tree
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// get the underlying git2::Tree (for internal use)
    pub(crate) fn inner(&self) -> &Tree<'repo> {
        &self.tree
    }

    /// check whether the tree has no entries
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// look up the entry at a path, `None` if nothing is there
    pub fn entry_at(&self, path: &FilePath) -> StorageResult<Option<git2::TreeEntry<'static>>> {
        match self.tree.get_path(&path.to_path_buf()) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(StorageError::Git(e)),
        }
    }

    /// resolve a path to a blob
    ///
    /// fails with `FileNotFound` when nothing is there and `IsDirectory`
    /// when the path names a subtree.
    pub fn blob_at(&self, repo: &'repo Repository, path: &FilePath) -> StorageResult<git2::Blob<'repo>> {
        let entry = self
            .entry_at(path)?
            .ok_or_else(|| StorageError::FileNotFound(path.to_string()))?;

        match entry.kind() {
            Some(ObjectType::Blob) => Ok(repo.find_blob(entry.id())?),
            Some(ObjectType::Tree) => Err(StorageError::IsDirectory(path.to_string())),
            _ => Err(StorageError::FileNotFound(path.to_string())),
        }
    }

    /// resolve a path to a subtree; the root path is this tree
    pub fn subtree_at(&self, repo: &'repo Repository, path: &FilePath) -> StorageResult<TreeHandle<'repo>> {
        if path.is_root() {
            return Ok(TreeHandle::new(self.tree.clone()));
        }

        let entry = self
            .entry_at(path)?
            .ok_or_else(|| StorageError::FileNotFound(path.to_string()))?;

        match entry.kind() {
            Some(ObjectType::Tree) => Ok(TreeHandle::new(repo.find_tree(entry.id())?)),
            Some(ObjectType::Blob) => Err(StorageError::IsFile(path.to_string())),
            _ => Err(StorageError::FileNotFound(path.to_string())),
        }
    }

    /// list the direct children of this tree
    ///
    /// `dir` is the path of this tree inside the root, used to build
    /// each child's full path. Non-file, non-directory entries (gitlinks)
    /// are skipped.
    pub fn list(&self, repo: &Repository, dir: &FilePath) -> StorageResult<Vec<TreeNode>> {
        let odb = repo.odb()?;
        let mut nodes = Vec::with_capacity(self.tree.len());

        for entry in self.tree.iter() {
            let kind = match entry.kind() {
                Some(ObjectType::Blob) => EntryKind::Blob,
                Some(ObjectType::Tree) => EntryKind::Tree,
                _ => continue,
            };
            let name = match entry.name() {
                Some(name) => name.to_string(),
                None => String::from_utf8_lossy(entry.name_bytes()).into_owned(),
            };
            let size = match kind {
                EntryKind::Blob => Some(odb.read_header(entry.id())?.0),
                EntryKind::Tree => None,
            };

            nodes.push(TreeNode {
                path: dir.join(&name).to_string(),
                name,
                kind,
                id: entry.id().to_string(),
                mode: entry.filemode() as u32,
                size,
            });
        }

        nodes.sort_by(TreeNode::listing_order);
        Ok(nodes)
    }
}

/// one entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub id: String,
    pub mode: u32,
    /// blob size in bytes, absent for subtrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl TreeNode {
    /// directories first, then by name
    fn listing_order(a: &TreeNode, b: &TreeNode) -> Ordering {
        match (a.kind, b.kind) {
            (EntryKind::Tree, EntryKind::Blob) => Ordering::Less,
            (EntryKind::Blob, EntryKind::Tree) => Ordering::Greater,
            _ => a.name.cmp(&b.name),
        }
    }
}

/// a single path edit
enum Edit {
    Upsert(BlobId),
    Remove,
}

/// a mutable tree builder for making changes
///
/// each edit rewrites the chain of trees from the edited leaf up to the
/// root; the original tree is not modified.
///
/// # Usage Pattern
///
/// ```ignore
/// let mut mutator = TreeMutator::from_tree(repo, &tree);
/// mutator.upsert_file(&FilePath::new("src/lib.rs")?, blob_id)?;
/// mutator.remove_file(&FilePath::new("old.txt")?)?;
/// let new_tree_id = mutator.write()?;
/// ```
pub struct TreeMutator<'repo> {
    repo: &'repo Repository,
    /// current root, `None` while the tree is empty
    root: Option<Oid>,
}

impl<'repo> TreeMutator<'repo> {
    /// create a new TreeMutator from an existing tree
    pub fn from_tree(repo: &'repo Repository, tree: &TreeHandle<'_>) -> Self {
        let root = if tree.is_empty() { None } else { Some(tree.inner().id()) };
        Self { repo, root }
    }

    /// create a new TreeMutator for an empty tree
    pub fn empty(repo: &'repo Repository) -> Self {
        Self { repo, root: None }
    }

    /// insert or replace the file at `path` with a regular-file blob
    ///
    /// missing directories on the way are created. Fails with `IsDirectory`
    /// if `path` is a directory and `IsFile` if a parent is a file. The root
    /// path names no entry and is rejected as an empty name.
    pub fn upsert_file(&mut self, path: &FilePath, blob_id: BlobId) -> StorageResult<()> {
        require_entry(path)?;
        let base = self.root_tree()?;
        self.root = self.rewrite(base, path, 0, &Edit::Upsert(blob_id))?;
        Ok(())
    }

    /// remove the file at `path` if it is there
    ///
    /// a missing path is not an error, a directory is (`IsDirectory`).
    /// Directories left empty are pruned.
    pub fn remove_file(&mut self, path: &FilePath) -> StorageResult<()> {
        require_entry(path)?;
        let base = self.root_tree()?;
        self.root = self.rewrite(base, path, 0, &Edit::Remove)?;
        Ok(())
    }

    /// write the result and return the new root tree ID
    pub fn write(self) -> StorageResult<TreeId> {
        match self.root {
            Some(oid) => Ok(TreeId::new(oid)),
            None => create_empty_tree(self.repo),
        }
    }

    fn root_tree(&self) -> StorageResult<Option<Tree<'repo>>> {
        match self.root {
            Some(oid) => Ok(Some(self.repo.find_tree(oid)?)),
            None => Ok(None),
        }
    }

    /// rebuild `base` with the edit applied at `path.segments()[depth..]`
    ///
    /// returns `None` when the rebuilt tree has no entries left.
    fn rewrite(
        &self,
        base: Option<Tree<'repo>>,
        path: &FilePath,
        depth: usize,
        edit: &Edit,
    ) -> StorageResult<Option<Oid>> {
        let segments = path.segments();
        let name = segments[depth].as_str();
        let is_leaf = depth + 1 == segments.len();

        let mut builder = self.repo.treebuilder(base.as_ref())?;
        let existing = builder.get(name)?.map(|entry| (entry.kind(), entry.id()));

        if is_leaf {
            match edit {
                Edit::Upsert(blob_id) => {
                    if let Some((Some(ObjectType::Tree), _)) = existing {
                        return Err(StorageError::IsDirectory(path.to_string()));
                    }
                    builder.insert(name, blob_id.raw(), FileMode::Blob.into())?;
                }
                Edit::Remove => match existing {
                    Some((Some(ObjectType::Tree), _)) => {
                        return Err(StorageError::IsDirectory(path.to_string()));
                    }
                    Some(_) => {
                        builder.remove(name)?;
                    }
                    None => {}
                },
            }
        } else {
            let child = match existing {
                Some((Some(ObjectType::Tree), id)) => Some(self.repo.find_tree(id)?),
                Some(_) => match edit {
                    Edit::Upsert(_) => {
                        let prefix = segments[..=depth].join("/");
                        return Err(StorageError::IsFile(prefix));
                    }
                    Edit::Remove => return Ok(base.map(|tree| tree.id())),
                },
                None => match edit {
                    Edit::Upsert(_) => None,
                    Edit::Remove => return Ok(base.map(|tree| tree.id())),
                },
            };

            match self.rewrite(child, path, depth + 1, edit)? {
                Some(child_id) => {
                    builder.insert(name, child_id, FileMode::Tree.into())?;
                }
                None => {
                    builder.remove(name)?;
                }
            }
        }

        if builder.len() == 0 {
            return Ok(None);
        }
        Ok(Some(builder.write()?))
    }
}

fn require_entry(path: &FilePath) -> StorageResult<()> {
    if path.is_root() {
        return Err(InvalidNameError::Empty.into());
    }
    Ok(())
}

/// write the empty tree (the root of a repository with no files)
pub fn create_empty_tree(repo: &Repository) -> StorageResult<TreeId> {
    let builder = repo.treebuilder(None)?;
    Ok(TreeId::new(builder.write()?))
}
