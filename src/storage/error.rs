//! Storage layer error types
//!
//! Every failure path of the engine raises one variant of [`StorageError`].
//! Only the outermost boundary turns a variant into a transport response,
//! by matching on [`StorageError::kind`] once.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::InvalidNameError;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// the branch does not exist in the repository
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// the path does not resolve in the tree
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// malformed or unknown commit identifier
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// a ref (branch, tag, hash) could not be resolved to a commit
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// no repository container at the location
    #[error("repository not found: {0}")]
    RepositoryNotFound(PathBuf),

    /// branch already exists
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// a valid repository already lives at the location, or it already has commits
    #[error("repository already initialized: {0}")]
    RepositoryAlreadyInitialized(String),

    /// the branch is the target of the symbolic HEAD
    #[error("cannot delete branch {0}: it is the current HEAD")]
    CurrentHeadDeletion(String),

    /// the branch tip is not reachable from HEAD
    #[error("cannot delete branch {0}: it is not fully merged")]
    UnmergedBranchDeletion(String),

    /// expected a file, found a directory
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// expected a directory, found a file
    #[error("is a file: {0}")]
    IsFile(String),

    /// content encoding other than utf-8 or base64
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// content does not decode under the declared encoding
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// invalid branch name, file path or location
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// branch update failed due to concurrent modification
    #[error("concurrent modification: branch {branch} was updated by another writer")]
    ConcurrentModification { branch: String },

    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// error families, one discriminant per way a caller must react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Precondition,
    Validation,
    /// untyped filesystem or object-store fault, never blindly retried
    Fatal,
}

impl ErrorKind {
    /// transport-level status equivalent
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Precondition => 400,
            ErrorKind::Validation => 422,
            ErrorKind::Fatal => 500,
        }
    }
}

impl StorageError {
    /// the family this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::BranchNotFound(_)
            | StorageError::FileNotFound(_)
            | StorageError::CommitNotFound(_)
            | StorageError::RefNotFound(_)
            | StorageError::RepositoryNotFound(_) => ErrorKind::NotFound,
            StorageError::BranchAlreadyExists(_)
            | StorageError::RepositoryAlreadyInitialized(_)
            | StorageError::ConcurrentModification { .. } => ErrorKind::Conflict,
            StorageError::CurrentHeadDeletion(_)
            | StorageError::UnmergedBranchDeletion(_)
            | StorageError::IsDirectory(_)
            | StorageError::IsFile(_) => ErrorKind::Precondition,
            StorageError::UnsupportedEncoding(_)
            | StorageError::InvalidContent(_)
            | StorageError::InvalidName(_) => ErrorKind::Validation,
            StorageError::Git(_) | StorageError::Io(_) => ErrorKind::Fatal,
        }
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// check if this error is recoverable by retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
