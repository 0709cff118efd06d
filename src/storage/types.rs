//! value types shared by the storage layer: object ids, names, paths, authors.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use git2::Oid;
use serde::{Deserialize, Serialize, Serializer};

use crate::storage::error::StorageError;

/// Declares a typed wrapper around `git2::Oid` for one object kind.
///
/// Keeps a blob hash from being passed where a commit hash is expected.
/// The raw Oid is crate-private; outside the crate an id is only a hex
/// string (`Display`, `Serialize`).
macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Oid);

        impl $name {
            pub(crate) fn new(oid: Oid) -> Self {
                Self(oid)
            }

            pub(crate) fn raw(&self) -> Oid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }
    };
}

object_id!(
    /// hash of a commit object
    CommitId
);
object_id!(
    /// hash of a blob (file content)
    BlobId
);
object_id!(
    /// hash of a tree (directory)
    TreeId
);

impl CommitId {
    /// abbreviated 7-character hash
    pub fn short(&self) -> String {
        let mut hex = self.0.to_string();
        hex.truncate(7);
        hex
    }
}

/// Opaque identifier of one repository's container under the storage root.
///
/// The web tier derives it from the metadata store (owner id + repository id);
/// the engine only checks that it stays inside the root once joined.
///
/// Valid locations:
/// - relative, non-empty
/// - `/`-separated segments, none of which is `.` or `..`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct RepositoryLocation(String);

impl RepositoryLocation {
    /// create a new RepositoryLocation, validating the input
    pub fn new(location: impl Into<String>) -> Result<Self, InvalidNameError> {
        let location = location.into();
        Self::validate(&location)?;
        Ok(Self(location))
    }

    /// the conventional location for a repository owned by a user
    ///
    /// ids are formatted as-is, so the result is validated like any other location.
    pub fn for_owner(
        owner_id: impl fmt::Display,
        repository_id: impl fmt::Display,
    ) -> Result<Self, InvalidNameError> {
        Self::new(format!("user_{}/repository_{}", owner_id, repository_id))
    }

    fn validate(location: &str) -> Result<(), InvalidNameError> {
        if location.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        let path = Path::new(location);
        for component in path.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(InvalidNameError::InvalidPath(location.to_string())),
            }
        }

        if location.split('/').any(|segment| segment.is_empty() || segment == ".") {
            return Err(InvalidNameError::InvalidPath(location.to_string()));
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// resolve the container directory under a storage root
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RepositoryLocation {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RepositoryLocation {
    type Error = InvalidNameError;

    fn try_from(location: String) -> Result<Self, Self::Error> {
        Self::new(location)
    }
}

/// A validated branch name (short form, without `refs/heads/`).
///
/// Validation follows git's own ref-format rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct BranchName(String);

impl BranchName {
    /// prefix shared by every local branch ref
    pub const REF_PREFIX: &'static str = "refs/heads/";

    /// create a new BranchName
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if name == "HEAD" || !git2::Branch::name_is_valid(&name).unwrap_or(false) {
            return Err(InvalidNameError::InvalidRefName(name));
        }
        Ok(Self(name))
    }

    /// strip `refs/heads/` from a full ref name
    pub fn from_ref_path(refname: &str) -> Option<Self> {
        refname
            .strip_prefix(Self::REF_PREFIX)
            .map(|short| Self(short.to_string()))
    }

    /// get the full ref path (e.g., "refs/heads/main")
    pub fn as_ref_path(&self) -> String {
        format!("{}{}", Self::REF_PREFIX, self.0)
    }

    /// get the short name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BranchName {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BranchName {
    type Error = InvalidNameError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

/// A normalized path to a file inside a repository tree.
///
/// Stored as its segments; `a//b/` and `/a/b` both normalize to `a/b`.
/// An empty path addresses the root tree and is only accepted by
/// [`FilePath::root_or`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePath {
    segments: Vec<String>,
}

impl FilePath {
    /// parse a path that must name an entry (not the root)
    pub fn new(path: &str) -> Result<Self, InvalidNameError> {
        let parsed = Self::root_or(path)?;
        if parsed.is_root() {
            return Err(InvalidNameError::Empty);
        }
        Ok(parsed)
    }

    /// parse a path where empty means the root tree
    pub fn root_or(path: &str) -> Result<Self, InvalidNameError> {
        let mut segments = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" => continue,
                "." | ".." | ".git" => return Err(InvalidNameError::InvalidPath(path.to_string())),
                s if s.contains('\0') || s.contains('\\') => {
                    return Err(InvalidNameError::InvalidPath(path.to_string()))
                }
                s => segments.push(s.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// check whether this is the root path
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// the path segments, root first
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// the last segment (file name)
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// child path of this directory
    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// path relative to the tree root, as git2 expects it
    pub fn to_path_buf(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// author of a commit, supplied by the identity subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    /// create a new author
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// check that git can sign with this identity
    ///
    /// name and email must be non-empty and free of `<`, `>` and newlines.
    pub fn validate(&self) -> Result<(), InvalidNameError> {
        let invalid = |field: &str| {
            field.trim().is_empty() || field.contains(|c: char| matches!(c, '<' | '>' | '\n' | '\0'))
        };
        if invalid(&self.name) || invalid(&self.email) {
            return Err(InvalidNameError::InvalidAuthor(format!("{} <{}>", self.name, self.email)));
        }
        Ok(())
    }

    /// convert to git2::Signature stamped with the current time
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, InvalidNameError> {
        self.validate()?;
        git2::Signature::now(&self.name, &self.email)
            .map_err(|_| InvalidNameError::InvalidAuthor(format!("{} <{}>", self.name, self.email)))
    }
}

/// how file content travels across the engine boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

impl Encoding {
    /// wire name of the encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Base64 => "base64",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "base64" => Ok(Self::Base64),
            _ => Err(StorageError::UnsupportedEncoding(s.to_string())),
        }
    }
}

/// kind of a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

/// error type for invalid names (branches, paths, locations)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    InvalidRefName(String),
    InvalidPath(String),
    InvalidAuthor(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::InvalidRefName(name) => write!(f, "invalid ref name: '{}'", name),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
            Self::InvalidAuthor(author) => write!(f, "invalid author: '{}'", author),
        }
    }
}

impl std::error::Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_name_valid() {
        assert!(BranchName::new("main").is_ok());
        assert!(BranchName::new("feature/login").is_ok());
        assert!(BranchName::new("release-1.0").is_ok());
    }

    #[test]
    fn test_branch_name_invalid() {
        assert!(BranchName::new("").is_err());
        assert!(BranchName::new("HEAD").is_err());
        assert!(BranchName::new("a..b").is_err());
        assert!(BranchName::new("ends/").is_err());
        assert!(BranchName::new("has space").is_err());
        assert!(BranchName::new("lock.lock").is_err());
    }

    #[test]
    fn test_branch_name_ref_path() {
        let branch = BranchName::new("main").unwrap();
        assert_eq!(branch.as_ref_path(), "refs/heads/main");
        assert_eq!(BranchName::from_ref_path("refs/heads/main"), Some(branch));
        assert_eq!(BranchName::from_ref_path("refs/tags/v1"), None);
    }

    #[test]
    fn test_file_path_normalization() {
        let path = FilePath::new("/src//lib.rs/").unwrap();
        assert_eq!(path.to_string(), "src/lib.rs");
        assert_eq!(path.segments().len(), 2);
        assert_eq!(path.file_name(), Some("lib.rs"));
        assert_eq!(path.to_path_buf(), PathBuf::from("src/lib.rs"));
    }

    #[test]
    fn test_file_path_invalid() {
        assert!(FilePath::new("").is_err());
        assert!(FilePath::new("/").is_err());
        assert!(FilePath::new("../etc/passwd").is_err());
        assert!(FilePath::new("a/./b").is_err());
        assert!(FilePath::new(".git/config").is_err());
        assert!(FilePath::root_or("").unwrap().is_root());
    }

    #[test]
    fn test_location_for_owner() {
        let location = RepositoryLocation::for_owner(7, 42).unwrap();
        assert_eq!(location.as_str(), "user_7/repository_42");
        assert!(RepositoryLocation::new(location.as_str()).is_ok());
    }

    #[test]
    fn test_location_for_owner_rejects_traversal() {
        assert!(RepositoryLocation::for_owner("x/../../outside", 1).is_err());
        assert!(RepositoryLocation::for_owner(1, "2/../..").is_err());
        assert!(RepositoryLocation::for_owner("", "").is_ok());
    }

    #[test]
    fn test_deserialize_runs_validation() {
        assert!(serde_json::from_str::<RepositoryLocation>("\"../x\"").is_err());
        assert!(serde_json::from_str::<RepositoryLocation>("\"../../etc\"").is_err());
        assert!(serde_json::from_str::<BranchName>("\"bad..name\"").is_err());
        assert!(serde_json::from_str::<BranchName>("\"HEAD\"").is_err());

        let location: RepositoryLocation = serde_json::from_str("\"user_1/repository_2\"").unwrap();
        assert_eq!(location.as_str(), "user_1/repository_2");
        let branch: BranchName = serde_json::from_str("\"feature/x\"").unwrap();
        assert_eq!(branch.as_str(), "feature/x");
    }

    #[test]
    fn test_author_validation() {
        assert!(Author::new("alice", "alice@example.com").validate().is_ok());
        for author in [
            Author::new("", "alice@example.com"),
            Author::new("alice", " "),
            Author::new("al<ice", "alice@example.com"),
            Author::new("alice", "alice@example.com>"),
            Author::new("alice\nbob", "alice@example.com"),
        ] {
            assert!(matches!(author.validate(), Err(InvalidNameError::InvalidAuthor(_))));
            assert!(author.to_git2_signature().is_err());
        }
    }

    #[test]
    fn test_location_cannot_escape_root() {
        assert!(RepositoryLocation::new("").is_err());
        assert!(RepositoryLocation::new("/abs/path").is_err());
        assert!(RepositoryLocation::new("../other").is_err());
        assert!(RepositoryLocation::new("a/../../b").is_err());
        assert!(RepositoryLocation::new("a//b").is_err());
    }

    #[test]
    fn test_encoding_parse() {
        assert_eq!("utf-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("UTF8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("base64".parse::<Encoding>().unwrap(), Encoding::Base64);
        assert!(matches!(
            "latin-1".parse::<Encoding>(),
            Err(StorageError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_encoding_wire_name() {
        assert_eq!(serde_json::to_string(&Encoding::Utf8).unwrap(), "\"utf-8\"");
        assert_eq!(serde_json::to_string(&EntryKind::Tree).unwrap(), "\"tree\"");
    }
}
