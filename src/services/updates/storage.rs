use crate::errors::ServiceError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Hex SHA-256 of an artifact.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Normalises a client-supplied relative path. Empty, absolute, drive-letter,
/// backslash and `..` paths are refused; `.` and empty segments are dropped.
pub fn sanitize_relative_path(raw: &str) -> Result<String, ServiceError> {
    let path = raw.trim();
    if path.is_empty() {
        return Err(ServiceError::BadRequest("download path is empty".into()));
    }
    if path.starts_with('/') || path.contains('\\') || path.contains('\0') {
        return Err(ServiceError::BadRequest(format!("invalid download path: {}", raw)));
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(ServiceError::BadRequest(format!("invalid download path: {}", raw)));
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(ServiceError::BadRequest(format!(
                    "path traversal rejected: {}",
                    raw
                )))
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(ServiceError::BadRequest("download path is empty".into()));
    }
    Ok(segments.join("/"))
}

/// Build artifacts laid out as `{root}/{version}/{file_name}`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relative_path(version: &str, file_name: &str) -> String {
        format!("{}/{}", version, file_name)
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, ServiceError> {
        let clean = sanitize_relative_path(relative)?;
        let mut path = self.root.clone();
        for segment in clean.split('/') {
            path.push(segment);
        }
        Ok(path)
    }

    pub async fn write(&self, relative: &str, bytes: &[u8]) -> Result<PathBuf, ServiceError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Stored artifact");
        Ok(path)
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.resolve(relative)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ServiceError::NotFound(
                format!("artifact {} is missing from storage", relative),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes the file and, when it is left empty, its version directory.
    pub async fn remove(&self, relative: &str) -> Result<(), ServiceError> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Artifact already absent");
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = path.parent() {
            if parent != self.root {
                // Fails while other files remain, which is fine.
                let _ = fs::remove_dir(parent).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case("1.2.0/client.jar", "1.2.0/client.jar")]
    #[case("./1.2.0//client.jar", "1.2.0/client.jar")]
    fn accepted_paths(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_relative_path(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("/etc/passwd")]
    #[case("../secrets.jar")]
    #[case("1.0/../../x.jar")]
    #[case("1.0\\client.jar")]
    #[case("C:/client.jar")]
    #[case("./")]
    fn rejected_paths(#[case] raw: &str) {
        assert_matches!(sanitize_relative_path(raw), Err(ServiceError::BadRequest(_)));
    }

    #[test]
    fn checksum_is_hex_sha256() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let rel = ArtifactStore::relative_path("1.0.0", "client.jar");

        store.write(&rel, b"jar-bytes").await.unwrap();
        assert_eq!(store.read(&rel).await.unwrap(), b"jar-bytes");

        store.remove(&rel).await.unwrap();
        assert_matches!(store.read(&rel).await, Err(ServiceError::NotFound(_)));
        assert!(!dir.path().join("1.0.0").exists());
    }
}
