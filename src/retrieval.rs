use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::error::{DocumentError, DocumentResult, StorageError};
use crate::lifecycle::Requester;
use crate::repository::DocumentRepository;
use crate::storage::BlobStore;

/// Everything the HTTP layer needs to serve one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDocument {
    pub document_id: Uuid,
    pub absolute_path: PathBuf,
    pub storage_path: String,
    pub mime_type: String,
    pub original_name: String,
    pub size_bytes: i64,
}

pub struct RetrievalGateway {
    repository: Arc<dyn DocumentRepository>,
    blobs: Arc<dyn BlobStore>,
}

impl RetrievalGateway {
    pub fn new(repository: Arc<dyn DocumentRepository>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { repository, blobs }
    }

    pub async fn resolve(
        &self,
        document_id: Uuid,
        requester: &Requester,
    ) -> DocumentResult<ResolvedDocument> {
        let document = self
            .repository
            .find(document_id)
            .await
            .map_err(DocumentError::persistence)?
            .filter(|document| requester.can_access(document))
            .ok_or(DocumentError::NotFound)?;

        let absolute_path = self.blobs.absolute_path(&document.storage_path)?;
        if !self.blobs.exists(&document.storage_path).await? {
            warn!(
                document_id = %document_id,
                storage_path = %document.storage_path,
                "document record references a missing blob"
            );
            return Err(DocumentError::FileMissing);
        }

        Ok(ResolvedDocument {
            document_id,
            absolute_path,
            storage_path: document.storage_path,
            mime_type: document.mime_type,
            original_name: document.original_name,
            size_bytes: document.size_bytes,
        })
    }

    /// Reads the bytes behind a resolved document. The blob can vanish
    /// between `resolve` and this call, which is reported the same way.
    pub async fn read(&self, resolved: &ResolvedDocument) -> DocumentResult<Vec<u8>> {
        match self.blobs.read(&resolved.storage_path).await {
            Ok(bytes) => Ok(bytes),
            Err(StorageError::NotFound(_)) => Err(DocumentError::FileMissing),
            Err(err) => Err(err.into()),
        }
    }
}
