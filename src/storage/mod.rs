//! Local artifact storage
//!
//! Artifacts live directly under the storage root, named by their cache key.
//! A file at a canonical path is always complete: jobs write into
//! `<root>/.staging/<job_id>/` and promote the result with a rename.

pub mod sweeper;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::task::CacheKey;

pub use sweeper::{RetentionSweeper, SweepStats, sweep_once};

pub const STAGING_DIR: &str = ".staging";

/// Extensions the tool may leave behind, probed in this order after the expected one
const KNOWN_EXTENSIONS: &[&str] = &["mp3", "m4a", "mp4", "webm"];

/// Suffixes of incomplete tool output
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no output found for {stem} in {dir}")]
    OutputNotFound { stem: String, dir: PathBuf },

    #[error("path outside storage root: {0}")]
    OutsideRoot(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::Io { source, .. } => source.kind() == ErrorKind::NotFound,
            StorageError::OutputNotFound { .. } => true,
            StorageError::OutsideRoot(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Artifact directory with staging and atomic promotion
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the root and staging directories
    pub async fn ensure(&self) -> Result<()> {
        let staging = self.staging_root();
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| StorageError::io(&staging, e))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Whether the artifact for `key` is already cached
    pub async fn exists(&self, key: &CacheKey) -> bool {
        fs::metadata(self.path_for(key))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Resets a cached artifact's mtime so its retention window restarts
    pub async fn touch(&self, key: &CacheKey) -> Result<PathBuf> {
        let path = self.path_for(key);
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .write(true)
                .open(&target)?
                .set_modified(SystemTime::now())
        })
        .await
        .map_err(|e| StorageError::io(&path, std::io::Error::other(e)))?
        .map_err(|e| StorageError::io(&path, e))?;
        Ok(path)
    }

    pub async fn create_staging(&self, job_id: &str) -> Result<PathBuf> {
        let dir = self.staging_root().join(job_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;
        Ok(dir)
    }

    /// Best-effort removal of a job's staging directory
    pub async fn discard_staging(&self, job_id: &str) {
        let dir = self.staging_root().join(job_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(path = %dir.display(), "Staging directory removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove staging directory"),
        }
    }

    /// Finds the file the tool actually produced.
    ///
    /// The tool-reported path wins when it exists inside `staging`. Otherwise
    /// `<stem>.<ext>` is probed for the expected extension and then each known
    /// extension, and finally any complete file starting with the stem.
    pub async fn resolve_output(
        &self,
        staging: &Path,
        key: &CacheKey,
        reported: Option<&Path>,
    ) -> Result<PathBuf> {
        if let Some(path) = reported {
            if path.starts_with(staging) && is_file(path).await {
                return Ok(path.to_path_buf());
            }
            debug!(path = %path.display(), "Reported output unusable, scanning staging");
        }

        let expected = std::iter::once(key.extension())
            .chain(KNOWN_EXTENSIONS.iter().copied().filter(|e| *e != key.extension()));
        for ext in expected {
            let candidate = staging.join(format!("{}.{}", key.stem(), ext));
            if is_file(&candidate).await {
                return Ok(candidate);
            }
        }

        let mut entries = fs::read_dir(staging)
            .await
            .map_err(|e| StorageError::io(staging, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(staging, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(key.stem())
                && !PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
                && is_file(&entry.path()).await
            {
                return Ok(entry.path());
            }
        }

        Err(StorageError::OutputNotFound {
            stem: key.stem().to_string(),
            dir: staging.to_path_buf(),
        })
    }

    /// Atomically moves a staged file to the canonical path for `key`
    pub async fn promote(&self, staged: &Path, key: &CacheKey) -> Result<PathBuf> {
        let target = self.path_for(key);
        fs::rename(staged, &target)
            .await
            .map_err(|e| StorageError::io(staged, e))?;
        debug!(from = %staged.display(), to = %target.display(), "Artifact promoted");
        Ok(target)
    }

    /// Opens a cached artifact for streaming, returning the handle and its length
    pub async fn open(&self, path: &Path) -> Result<(fs::File, u64)> {
        if !path.starts_with(&self.root) || path.starts_with(self.staging_root()) {
            return Err(StorageError::OutsideRoot(path.to_path_buf()));
        }
        let file = fs::File::open(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| StorageError::io(path, e))?
            .len();
        Ok((file, len))
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

/// Content type for an artifact, from its extension
pub fn content_type(path: &Path) -> mime::Mime {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp3") => "audio/mpeg".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("m4a") => "audio/mp4".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("mp4") => "video/mp4".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("webm") => "video/webm".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{MediaFormat, Quality};
    use tempfile::TempDir;

    fn audio_key() -> CacheKey {
        CacheKey::new("Test Clip", "AAAAAAAAAAA", Quality::Bitrate(192), MediaFormat::Audio)
    }

    async fn create_store() -> (ArtifactStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("uploads"));
        store.ensure().await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_prefers_reported_path() {
        let (store, _temp) = create_store().await;
        let staging = store.create_staging("job").await.unwrap();
        let reported = staging.join("something-else.mp3");
        fs::write(&reported, b"audio").await.unwrap();
        fs::write(staging.join("Test_Clip-AAAAAAAAAAA-192.mp3"), b"other")
            .await
            .unwrap();

        let resolved = store
            .resolve_output(&staging, &audio_key(), Some(&reported))
            .await
            .unwrap();
        assert_eq!(resolved, reported);
    }

    #[tokio::test]
    async fn test_falls_back_to_known_extension() {
        let (store, _temp) = create_store().await;
        let staging = store.create_staging("job").await.unwrap();
        let m4a = staging.join("Test_Clip-AAAAAAAAAAA-192.m4a");
        fs::write(&m4a, b"audio").await.unwrap();

        let missing = staging.join("gone.mp3");
        let resolved = store
            .resolve_output(&staging, &audio_key(), Some(&missing))
            .await
            .unwrap();
        assert_eq!(resolved, m4a);
    }

    #[tokio::test]
    async fn test_prefix_scan_skips_partial_files() {
        let (store, _temp) = create_store().await;
        let staging = store.create_staging("job").await.unwrap();
        fs::write(staging.join("Test_Clip-AAAAAAAAAAA-192.webm.part"), b"x")
            .await
            .unwrap();

        let err = store
            .resolve_output(&staging, &audio_key(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::OutputNotFound { .. }));

        let opus = staging.join("Test_Clip-AAAAAAAAAAA-192.opus");
        fs::write(&opus, b"audio").await.unwrap();
        let resolved = store.resolve_output(&staging, &audio_key(), None).await.unwrap();
        assert_eq!(resolved, opus);
    }

    #[tokio::test]
    async fn test_promote_and_open() {
        let (store, _temp) = create_store().await;
        let staging = store.create_staging("job").await.unwrap();
        let staged = staging.join("Test_Clip-AAAAAAAAAAA-192.m4a");
        fs::write(&staged, b"12345").await.unwrap();

        assert!(!store.exists(&audio_key()).await);
        let target = store.promote(&staged, &audio_key()).await.unwrap();
        assert_eq!(target, store.root().join("Test_Clip-AAAAAAAAAAA-192.mp3"));
        assert!(store.exists(&audio_key()).await);
        assert!(!staged.exists());

        let (_file, len) = store.open(&target).await.unwrap();
        assert_eq!(len, 5);

        store.discard_staging("job").await;
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_touch_restarts_retention_window() {
        let (store, _temp) = create_store().await;
        let path = store.path_for(&audio_key());
        let old = SystemTime::now() - std::time::Duration::from_secs(11 * 3600);
        let file = std::fs::File::create(&path).unwrap();
        file.set_modified(old).unwrap();
        drop(file);

        assert_eq!(store.touch(&audio_key()).await.unwrap(), path);
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert!(modified > old + std::time::Duration::from_secs(3600));

        fs::remove_file(&path).await.unwrap();
        assert!(store.touch(&audio_key()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_open_rejects_paths_outside_root() {
        let (store, temp) = create_store().await;
        let outside = temp.path().join("secret.txt");
        fs::write(&outside, b"x").await.unwrap();
        assert!(matches!(
            store.open(&outside).await,
            Err(StorageError::OutsideRoot(_))
        ));

        let missing = store.root().join("missing.mp3");
        assert!(store.open(&missing).await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("a.mp3")).essence_str(), "audio/mpeg");
        assert_eq!(content_type(Path::new("a.mp4")).essence_str(), "video/mp4");
        assert_eq!(content_type(Path::new("a.bin")), mime::APPLICATION_OCTET_STREAM);
    }
}
