//! Checks run on an uploaded client build before it is stored.

use crate::errors::ServiceError;
use std::io::Cursor;
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const MANIFEST: &str = "META-INF/MANIFEST.MF";

pub const ACCEPTED_CONTENT_TYPES: [&str; 4] = [
    "application/java-archive",
    "application/x-java-archive",
    "application/zip",
    "application/octet-stream",
];

fn reject(message: impl Into<String>) -> ServiceError {
    ServiceError::FileUpload(message.into())
}

/// A bare `.jar` file name with no directory parts.
pub fn validate_file_name(file_name: &str) -> Result<(), ServiceError> {
    let name = file_name.trim();
    if name.is_empty() {
        return Err(reject("file name is required"));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.contains('\0') {
        return Err(reject(format!("invalid file name: {}", name)));
    }
    if !name.to_ascii_lowercase().ends_with(".jar") || name.len() <= ".jar".len() {
        return Err(reject("only .jar files are accepted"));
    }
    Ok(())
}

pub fn validate_content_type(content_type: Option<&str>) -> Result<(), ServiceError> {
    let Some(raw) = content_type else {
        return Ok(());
    };
    let essence = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(reject(format!("unsupported content type: {}", raw)))
    }
}

/// Archive entry names must stay inside the archive root.
pub fn is_safe_entry_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('/') || name.contains('\\') {
        return false;
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return false;
    }
    !name.split('/').any(|segment| segment == "..")
}

/// Validates size, ZIP structure, manifest presence and entry names.
pub fn validate_archive(bytes: &[u8], max_bytes: usize) -> Result<(), ServiceError> {
    if bytes.is_empty() {
        return Err(reject("uploaded file is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(reject(format!(
            "uploaded file is {} bytes; the limit is {} bytes",
            bytes.len(),
            max_bytes
        )));
    }
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(reject("file is not a JAR archive"));
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| reject(format!("corrupt JAR archive: {}", e)))?;

    let mut has_manifest = false;
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| reject(format!("corrupt JAR entry: {}", e)))?;
        let name = entry.name();
        if !is_safe_entry_name(name) {
            return Err(reject(format!("unsafe entry in archive: {}", name)));
        }
        if name.eq_ignore_ascii_case(MANIFEST) {
            has_manifest = true;
        }
    }
    if !has_manifest {
        return Err(reject("JAR archive has no META-INF/MANIFEST.MF"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use zip::write::FileOptions;

    pub(crate) fn build_jar(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn accepts_a_minimal_jar() {
        let jar = build_jar(&[
            ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n"),
            ("app/Main.class", "cafebabe"),
        ]);
        assert!(validate_archive(&jar, 1024 * 1024).is_ok());
    }

    #[test]
    fn rejects_missing_manifest_and_bad_bytes() {
        let jar = build_jar(&[("app/Main.class", "cafebabe")]);
        assert_matches!(validate_archive(&jar, 1 << 20), Err(ServiceError::FileUpload(_)));
        assert_matches!(validate_archive(b"", 1 << 20), Err(ServiceError::FileUpload(_)));
        assert_matches!(validate_archive(b"not a zip", 1 << 20), Err(ServiceError::FileUpload(_)));
        assert_matches!(validate_archive(b"PK\x03\x04garbage", 1 << 20), Err(ServiceError::FileUpload(_)));
    }

    #[test]
    fn rejects_oversized_uploads() {
        let jar = build_jar(&[("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n")]);
        assert!(validate_archive(&jar, jar.len() - 1).is_err());
        assert!(validate_archive(&jar, jar.len()).is_ok());
    }

    #[test]
    fn rejects_traversal_entries() {
        let jar = build_jar(&[
            ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n"),
            ("../evil.sh", "rm -rf"),
        ]);
        assert!(validate_archive(&jar, 1 << 20).is_err());
    }

    #[test]
    fn entry_names() {
        assert!(is_safe_entry_name("com/app/Main.class"));
        assert!(!is_safe_entry_name("/etc/passwd"));
        assert!(!is_safe_entry_name("a/../../b"));
        assert!(!is_safe_entry_name("C:evil"));
        assert!(!is_safe_entry_name("dir\\file"));
    }

    #[test]
    fn file_names_and_types() {
        assert!(validate_file_name("client-1.2.jar").is_ok());
        assert!(validate_file_name("CLIENT.JAR").is_ok());
        assert!(validate_file_name("client.zip").is_err());
        assert!(validate_file_name("../client.jar").is_err());
        assert!(validate_file_name("dir/client.jar").is_err());
        assert!(validate_file_name(".jar").is_err());

        assert!(validate_content_type(None).is_ok());
        assert!(validate_content_type(Some("application/java-archive")).is_ok());
        assert!(validate_content_type(Some("application/zip; charset=binary")).is_ok());
        assert!(validate_content_type(Some("text/plain")).is_err());
    }
}
