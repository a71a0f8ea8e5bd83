use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

const PARTIAL_SUFFIX: &str = ".part";
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub storage_path: String,
    pub modified: Option<SystemTime>,
    /// Leftover of a write that never completed; never referenced by a record.
    pub partial: bool,
}

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Persists `bytes` under a freshly generated name and returns its storage path.
    async fn write(&self, original_name: &str, mime_type: &str, bytes: Vec<u8>)
        -> StorageResult<String>;

    async fn read(&self, storage_path: &str) -> StorageResult<Vec<u8>>;

    /// Returns `false` when nothing was stored at `storage_path`.
    async fn delete(&self, storage_path: &str) -> StorageResult<bool>;

    async fn exists(&self, storage_path: &str) -> StorageResult<bool>;

    /// Every stored file, including leftovers of interrupted writes.
    async fn list(&self) -> StorageResult<Vec<BlobEntry>>;

    fn absolute_path(&self, storage_path: &str) -> StorageResult<PathBuf>;
}

/// Blob store backed by a single directory on local disk.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await.map_err(|err| {
            warn!(root = %self.root.display(), error = %err, "failed to create blob store root");
            StorageError::from(err)
        })
    }

    fn resolve(&self, storage_path: &str) -> StorageResult<PathBuf> {
        validate_storage_path(storage_path)?;
        Ok(self.root.join(storage_path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn write(
        &self,
        original_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> StorageResult<String> {
        self.ensure_root().await?;

        let storage_path = generate_blob_name(original_name, mime_type);
        let final_path = self.root.join(&storage_path);
        let partial_path = self.root.join(format!("{storage_path}{PARTIAL_SUFFIX}"));
        debug!(storage_path = %storage_path, size = bytes.len(), "writing blob");

        if let Err(err) = write_file(&partial_path, &bytes).await {
            let _ = fs::remove_file(&partial_path).await;
            warn!(storage_path = %storage_path, error = %err, "blob write failed");
            return Err(err.into());
        }

        if let Err(err) = fs::rename(&partial_path, &final_path).await {
            let _ = fs::remove_file(&partial_path).await;
            warn!(storage_path = %storage_path, error = %err, "blob rename failed");
            return Err(err.into());
        }

        Ok(storage_path)
    }

    async fn read(&self, storage_path: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(storage_path)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, storage_path: &str) -> StorageResult<bool> {
        let path = self.resolve(storage_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(storage_path = %storage_path, "blob already absent");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, storage_path: &str) -> StorageResult<bool> {
        let path = self.resolve(storage_path)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn list(&self) -> StorageResult<Vec<BlobEntry>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut blobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            blobs.push(BlobEntry {
                partial: name.ends_with(PARTIAL_SUFFIX),
                storage_path: name,
                modified: metadata.modified().ok(),
            });
        }
        blobs.sort_by(|a, b| a.storage_path.cmp(&b.storage_path));
        Ok(blobs)
    }

    fn absolute_path(&self, storage_path: &str) -> StorageResult<PathBuf> {
        self.resolve(storage_path)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

/// Builds `<random token>[.ext]`; nothing from the caller's filename except a
/// short alphanumeric extension ever reaches the disk.
pub fn generate_blob_name(original_name: &str, mime_type: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    match blob_extension(original_name, mime_type) {
        Some(ext) => format!("{token}.{ext}"),
        None => token,
    }
}

fn blob_extension(original_name: &str, mime_type: &str) -> Option<String> {
    let from_name = original_name
        .rsplit(['/', '\\'])
        .next()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| is_safe_extension(ext));

    from_name
        .map(str::to_owned)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(mime_type)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
        })
        .map(|ext| ext.to_ascii_lowercase())
}

fn is_safe_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|ch| ch.is_ascii_alphanumeric())
}

fn validate_storage_path(storage_path: &str) -> StorageResult<()> {
    let invalid = || StorageError::InvalidPath(storage_path.to_string());
    if storage_path.is_empty() || storage_path.contains(['/', '\\']) {
        return Err(invalid());
    }
    let mut components = Path::new(storage_path).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}
