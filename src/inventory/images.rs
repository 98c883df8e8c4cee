//! Companion images stored next to the inventory as `<root>/<key>.<ext>`.
//!
//! The public URL `<base>/media/<key>.jpeg` built by the lookup assumes a
//! static file server maps `/media` onto this directory.

use crate::config;
use crate::error::PipelineError;
use crate::pipeline::encode::decode_data_uri;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `IMAGES_PATH`.
    pub fn from_env() -> Result<Self, PipelineError> {
        config::images_path_from_env().map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{key}.{extension}"))
    }

    /// Write `bytes` as the image for `key`, replacing any previous file.
    ///
    /// Uses a temp file + rename so readers never see a partial image.
    pub async fn save(&self, key: &str, mime_type: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError> {
        let fail = |source: io::Error| PipelineError::ImageStoreFailed {
            key: key.to_string(),
            source,
        };
        if !is_safe_key(key) {
            return Err(fail(io::Error::new(
                io::ErrorKind::InvalidInput,
                "key is not a plain file name",
            )));
        }

        let path = self.path_for(key, extension_for(mime_type));
        tokio::fs::create_dir_all(&self.root).await.map_err(fail)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(fail)?;
        tokio::fs::rename(&tmp, &path).await.map_err(fail)?;
        debug!("Stored {} bytes for {key} at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Store a selected thumbnail given as a `data:` URI.
    pub async fn save_data_uri(&self, key: &str, uri: &str) -> Result<PathBuf, PipelineError> {
        let (mime, bytes) = decode_data_uri(uri).map_err(|detail| PipelineError::ImageStoreFailed {
            key: key.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidData, detail),
        })?;
        self.save(key, &mime, &bytes).await
    }
}

/// File extension for an image MIME type; unknown types use their subtype.
pub fn extension_for(mime_type: &str) -> &str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpeg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        other => other
            .split_once('/')
            .map(|(_, sub)| sub)
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin"),
    }
}

fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\'])
        && !key.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(extension_for("image/jpeg"), "jpeg");
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/heic"), "heic");
        assert_eq!(extension_for("application/x-weird+stuff"), "bin");
    }

    #[tokio::test]
    async fn save_writes_key_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("media"));
        let path = store.save("ZMPN-1", "image/jpeg", b"\xFF\xD8jpeg").await.unwrap();
        assert_eq!(path, dir.path().join("media/ZMPN-1.jpeg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\xFF\xD8jpeg");
    }

    #[tokio::test]
    async fn save_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let err = store.save("../escape", "image/png", b"x").await.unwrap_err();
        assert!(matches!(err, PipelineError::ImageStoreFailed { .. }));
    }

    #[tokio::test]
    async fn save_data_uri_decodes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let path = store
            .save_data_uri("ZMPN-2", "data:image/jpeg;base64,aGVsbG8=")
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }
}
