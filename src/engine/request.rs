//! Write requests accepted by the engine.
//!
//! These are the raw shapes the web tier forwards: strings straight from
//! the client, validated by the engine before anything touches disk.

use serde::Deserialize;

use crate::storage::Author;

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Write one file on one branch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateFileRequest {
    pub branch: String,
    pub path: String,
    pub content: String,
    /// `utf-8` or `base64`
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// empty means "Update <path>"
    #[serde(default)]
    pub message: String,
    pub author: Author,
}

impl UpdateFileRequest {
    /// utf-8 text write with an explicit message
    pub fn text(
        branch: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
        message: impl Into<String>,
        author: Author,
    ) -> Self {
        Self {
            branch: branch.into(),
            path: path.into(),
            content: content.into(),
            encoding: default_encoding(),
            message: message.into(),
            author,
        }
    }

    /// override the declared encoding
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }
}

/// Remove one file from one branch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeleteFileRequest {
    pub branch: String,
    pub path: String,
    #[serde(default)]
    pub message: String,
    pub author: Author,
}

impl DeleteFileRequest {
    pub fn new(
        branch: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
        author: Author,
    ) -> Self {
        Self {
            branch: branch.into(),
            path: path.into(),
            message: message.into(),
            author,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_defaults() {
        let json = r#"{
            "branch": "main",
            "path": "a.txt",
            "content": "hello",
            "author": {"name": "alice", "email": "alice@example.com"}
        }"#;
        let request: UpdateFileRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.encoding, "utf-8");
        assert_eq!(request.message, "");
        assert_eq!(request.author, Author::new("alice", "alice@example.com"));
    }

    #[test]
    fn test_update_request_builder() {
        let request = UpdateFileRequest::text("main", "bin/x", "AAE=", "upload", Author::new("a", "a@b"))
            .with_encoding("base64");
        assert_eq!(request.encoding, "base64");
        assert_eq!(request.message, "upload");
    }

    #[test]
    fn test_delete_request_from_json() {
        let json = r#"{"branch": "dev", "path": "old.txt", "author": {"name": "b", "email": "b@c"}}"#;
        let request: DeleteFileRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request, DeleteFileRequest::new("dev", "old.txt", "", Author::new("b", "b@c")));
    }
}
