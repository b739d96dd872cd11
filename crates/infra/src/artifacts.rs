//! Filesystem storage for downloaded videos.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;
use vidgen_core::id::is_plain_file_name;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("invalid artifact name: {0:?}")]
    InvalidName(String),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Flat directory of artifacts addressed by file name.
///
/// Writes land in a temporary sibling first and are renamed into place, so a
/// reader never observes a partially written file under its final name.
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

    pub async fn ensure_root(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ArtifactError::io(&self.root, e))
    }

    /// Path for `file_name`, refusing anything that could escape the root.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf, ArtifactError> {
        if !is_plain_file_name(file_name) {
            return Err(ArtifactError::InvalidName(file_name.to_string()));
        }
        Ok(self.root.join(file_name))
    }

    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        let final_path = self.resolve(file_name)?;
        self.ensure_root().await?;

        let tmp_path = self
            .root
            .join(format!(".{file_name}.{}.tmp", Uuid::now_v7()));

        if let Err(e) = write_file(&tmp_path, bytes).await {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove temp artifact");
            }
            return Err(e);
        }

        fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| ArtifactError::io(&final_path, e))?;

        debug!(path = %final_path.display(), bytes = bytes.len(), "artifact stored");
        Ok(final_path)
    }

    /// Open an artifact for streaming; `Ok(None)` when it does not exist.
    pub async fn open(&self, file_name: &str) -> Result<Option<(fs::File, u64)>, ArtifactError> {
        let path = self.resolve(file_name)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ArtifactError::io(&path, e)),
        };
        let metadata = file
            .metadata()
            .await
            .map_err(|e| ArtifactError::io(&path, e))?;
        if !metadata.is_file() {
            return Ok(None);
        }
        Ok(Some((file, metadata.len())))
    }

    pub async fn exists(&self, file_name: &str) -> bool {
        match self.resolve(file_name) {
            Ok(path) => fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false),
            Err(_) => false,
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| ArtifactError::io(path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| ArtifactError::io(path, e))?;
    file.sync_all().await.map_err(|e| ArtifactError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn write_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("videos"));

        let path = store.write("abc123.mp4", b"fake mp4").await.unwrap();
        assert_eq!(path, dir.path().join("videos").join("abc123.mp4"));
        assert!(store.exists("abc123.mp4").await);

        let (mut file, len) = store.open("abc123.mp4").await.unwrap().unwrap();
        assert_eq!(len, 8);
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"fake mp4");
    }

    #[tokio::test]
    async fn no_temp_files_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.write("one.mp4", b"1").await.unwrap();
        store.write("one.mp4", b"22").await.unwrap();

        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["one.mp4".to_string()]);
        assert_eq!(store.open("one.mp4").await.unwrap().unwrap().1, 2);
    }

    #[tokio::test]
    async fn missing_artifact_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.open("nope.mp4").await.unwrap().is_none());
        assert!(!store.exists("nope.mp4").await);
    }

    #[tokio::test]
    async fn every_request_id_artifact_name_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        for raw in ["abc123", "a.b", "req_1-2"] {
            let id = vidgen_core::RequestId::parse(raw).unwrap();
            store.write(&id.artifact_file_name(), b"v").await.unwrap();
            assert!(store.exists(&id.artifact_file_name()).await);
        }
        assert!(vidgen_core::RequestId::parse(".hidden-id").is_err());
    }

    #[test]
    fn names_cannot_escape_the_root() {
        let store = ArtifactStore::new("/data/videos");
        for bad in ["", "../etc/passwd", "a/b.mp4", "a\\b.mp4", ".hidden", "x\0.mp4"] {
            assert!(
                matches!(store.resolve(bad), Err(ArtifactError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(
            store.resolve("abc123.mp4").unwrap(),
            PathBuf::from("/data/videos/abc123.mp4")
        );
    }
}
