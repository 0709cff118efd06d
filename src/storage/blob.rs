//! Blob operations for file content.
//!
//! Content crosses the engine boundary as text: either UTF-8 as-is or
//! base64 for arbitrary bytes. The blob itself always stores the decoded
//! raw bytes, so identical files hash identically whatever encoding the
//! caller used to upload them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, Encoding, FilePath};

/// decode caller-supplied content into the raw bytes to store
pub fn decode_content(content: &str, encoding: Encoding) -> StorageResult<Vec<u8>> {
    match encoding {
        Encoding::Utf8 => Ok(content.as_bytes().to_vec()),
        Encoding::Base64 => STANDARD
            .decode(content.trim())
            .map_err(|e| StorageError::InvalidContent(e.to_string())),
    }
}

/// encode raw bytes for the wire
///
/// the encoding is chosen by the bytes: valid UTF-8 goes out as text,
/// anything else as base64.
pub fn encode_content(bytes: &[u8]) -> (String, Encoding) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), Encoding::Utf8),
        Err(_) => (STANDARD.encode(bytes), Encoding::Base64),
    }
}

/// a file read back from a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub encoding: Encoding,
    pub blob_id: BlobId,
    pub size: usize,
}

impl FileContent {
    /// build the wire form of a blob found at `path`
    pub(crate) fn from_blob(path: &FilePath, blob: &git2::Blob<'_>) -> Self {
        let (content, encoding) = encode_content(blob.content());
        Self {
            path: path.to_string(),
            content,
            encoding,
            blob_id: BlobId::new(blob.id()),
            size: blob.size(),
        }
    }

    /// recover the raw bytes
    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        decode_content(&self.content, self.encoding)
    }
}

/// write raw bytes as a blob to the repository
///
/// returns the blob ID (SHA-1 hash of the content)
pub fn write_blob(repo: &git2::Repository, bytes: &[u8]) -> StorageResult<BlobId> {
    let oid = repo.blob(bytes)?;
    Ok(BlobId::new(oid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_decode_utf8() {
        let bytes = decode_content("héllo", Encoding::Utf8).unwrap();
        assert_eq!(bytes, "héllo".as_bytes());
    }

    #[test]
    fn test_decode_base64() {
        let bytes = decode_content("AAH/fg==", Encoding::Base64).unwrap();
        assert_eq!(bytes, vec![0x00, 0x01, 0xff, 0x7e]);
    }

    #[test]
    fn test_decode_invalid_base64() {
        let result = decode_content("not base64!!", Encoding::Base64);
        assert!(matches!(result, Err(StorageError::InvalidContent(_))));
    }

    #[test]
    fn test_encoding_is_content_driven() {
        assert_eq!(encode_content(b"plain text"), ("plain text".to_string(), Encoding::Utf8));

        let (content, encoding) = encode_content(&[0xff, 0xfe, 0x00]);
        assert_eq!(encoding, Encoding::Base64);
        assert_eq!(content, "//4A");
    }

    #[test]
    fn test_text_uploaded_as_base64_reads_back_as_text() {
        let raw = decode_content("aGVsbG8=", Encoding::Base64).unwrap();
        assert_eq!(encode_content(&raw), ("hello".to_string(), Encoding::Utf8));
    }

    #[test]
    fn test_blob_dedup() {
        let (_dir, repo) = setup_repo();
        let a = write_blob(&repo, b"same bytes").unwrap();
        let b = write_blob(&repo, b"same bytes").unwrap();
        let c = write_blob(&repo, b"other bytes").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(repo.find_blob(a.raw()).unwrap().content(), b"same bytes");
    }

    #[test]
    fn test_file_content_round_trip() {
        let (_dir, repo) = setup_repo();
        let raw = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00];
        let id = write_blob(&repo, &raw).unwrap();
        let blob = repo.find_blob(id.raw()).unwrap();

        let path = FilePath::new("img/logo.png").unwrap();
        let file = FileContent::from_blob(&path, &blob);

        assert_eq!(file.encoding, Encoding::Base64);
        assert_eq!(file.path, "img/logo.png");
        assert_eq!(file.size, raw.len());
        assert_eq!(file.to_bytes().unwrap(), raw);
    }
}
