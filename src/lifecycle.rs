//! Document lifecycle: upload, review transitions, deletion and listing.
//!
//! Blob bytes and metadata rows live in two independent stores with no
//! shared transaction. Uploads write the blob first and compensate by
//! removing it when the row insert fails. Deletes remove the blob first and
//! the row second; if the row delete fails the record points at a missing
//! blob, which retrieval reports as [`DocumentError::FileMissing`] and a
//! retried delete finishes.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{NaiveDateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{DocumentError, DocumentResult};
use crate::models::{Document, DocumentStatus, NewDocument, ReviewUpdate, TransitionKind};
use crate::repository::{DocumentPage, DocumentRepository, ListQuery};
use crate::storage::BlobStore;
use crate::validation::{UploadCandidate, UploadValidator};

/// Who is asking, as vouched for by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: String,
    pub reviewer: bool,
}

impl Requester {
    pub fn owner(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            reviewer: false,
        }
    }

    pub fn reviewer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            reviewer: true,
        }
    }

    pub fn can_access(&self, document: &Document) -> bool {
        self.reviewer || document.is_owned_by(&self.user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub orphaned: Vec<String>,
    pub removed: usize,
    pub skipped_recent: usize,
    /// How many of `orphaned` are leftovers of interrupted uploads.
    pub partial: usize,
}

pub struct DocumentService {
    repository: Arc<dyn DocumentRepository>,
    blobs: Arc<dyn BlobStore>,
    validator: UploadValidator,
}

impl DocumentService {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        blobs: Arc<dyn BlobStore>,
        validator: UploadValidator,
    ) -> Self {
        Self {
            repository,
            blobs,
            validator,
        }
    }

    pub fn validator(&self) -> &UploadValidator {
        &self.validator
    }

    pub async fn upload(
        &self,
        owner_id: &str,
        candidate: UploadCandidate,
    ) -> DocumentResult<Document> {
        let upload = self.validator.validate(candidate)?;
        let size_bytes = upload.size_bytes() as i64;

        let storage_path = self
            .blobs
            .write(&upload.original_name, &upload.mime_type, upload.bytes)
            .await?;

        let new_document = NewDocument {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            storage_path: storage_path.clone(),
            original_name: upload.original_name,
            mime_type: upload.mime_type,
            size_bytes,
            category: upload.category,
            legacy_type: upload.legacy_type,
            display_name: upload.display_name,
            purpose: upload.purpose,
            status: DocumentStatus::Pending.as_str().to_string(),
            uploaded_at: Utc::now().naive_utc(),
        };

        match self.repository.create(new_document).await {
            Ok(document) => {
                info!(
                    document_id = %document.id,
                    owner_id = %document.owner_id,
                    storage_path = %document.storage_path,
                    size_bytes = document.size_bytes,
                    mime_type = %document.mime_type,
                    "document uploaded"
                );
                Ok(document)
            }
            Err(err) => {
                error!(
                    error = %err,
                    owner_id = %owner_id,
                    storage_path = %storage_path,
                    "failed to insert document record"
                );
                self.compensate_blob(&storage_path).await;
                Err(DocumentError::persistence(err))
            }
        }
    }

    async fn compensate_blob(&self, storage_path: &str) {
        match self.blobs.delete(storage_path).await {
            Ok(_) => warn!(storage_path = %storage_path, "removed blob of failed upload"),
            Err(err) => error!(
                error = %err,
                storage_path = %storage_path,
                "failed to remove blob of failed upload; blob is orphaned"
            ),
        }
    }

    pub async fn get(&self, document_id: Uuid, requester: &Requester) -> DocumentResult<Document> {
        let document = self.find(document_id).await?;
        if !requester.can_access(&document) {
            return Err(DocumentError::NotFound);
        }
        Ok(document)
    }

    pub async fn update_status(
        &self,
        document_id: Uuid,
        new_status: DocumentStatus,
        reviewer_id: &str,
        rejection_reason: Option<String>,
    ) -> DocumentResult<Document> {
        let document = self.find(document_id).await?;
        let current = current_status(&document)?;

        if current.transition_kind(new_status) != Some(TransitionKind::Review) {
            return Err(DocumentError::InvalidTransition {
                from: current,
                to: new_status,
            });
        }

        let rejection_reason = match new_status {
            DocumentStatus::Rejected => rejection_reason
                .map(|reason| reason.trim().to_string())
                .filter(|reason| !reason.is_empty())
                .map(Some),
            _ => Some(None),
        };

        let update = ReviewUpdate {
            status: new_status.as_str().to_string(),
            rejection_reason,
            reviewed_by: Some(reviewer_id.to_string()),
            reviewed_at: Some(review_timestamp(&document)),
        };

        let updated = self.apply(document_id, current, new_status, update).await?;
        info!(
            document_id = %document_id,
            reviewer_id = %reviewer_id,
            from = %current,
            to = %new_status,
            "document status updated"
        );
        Ok(updated)
    }

    /// Sends an approved or rejected document back to `pending`.
    pub async fn reopen(
        &self,
        document_id: Uuid,
        reviewer_id: &str,
        reason: Option<&str>,
    ) -> DocumentResult<Document> {
        let document = self.find(document_id).await?;
        let current = current_status(&document)?;

        if current.transition_kind(DocumentStatus::Pending) != Some(TransitionKind::Reopen) {
            return Err(DocumentError::InvalidTransition {
                from: current,
                to: DocumentStatus::Pending,
            });
        }

        let update = ReviewUpdate {
            status: DocumentStatus::Pending.as_str().to_string(),
            rejection_reason: Some(None),
            reviewed_by: Some(reviewer_id.to_string()),
            reviewed_at: Some(review_timestamp(&document)),
        };

        let updated = self
            .apply(document_id, current, DocumentStatus::Pending, update)
            .await?;
        info!(
            document_id = %document_id,
            reviewer_id = %reviewer_id,
            from = %current,
            reason = reason.unwrap_or_default(),
            "document reopened for review"
        );
        Ok(updated)
    }

    async fn apply(
        &self,
        document_id: Uuid,
        current: DocumentStatus,
        next: DocumentStatus,
        update: ReviewUpdate,
    ) -> DocumentResult<Document> {
        let updated = self
            .repository
            .apply_review(document_id, current, update)
            .await
            .map_err(DocumentError::persistence)?;

        match updated {
            Some(document) => Ok(document),
            None => {
                // Lost a race: the row was deleted or decided in between.
                let latest = self.find(document_id).await?;
                Err(DocumentError::InvalidTransition {
                    from: current_status(&latest)?,
                    to: next,
                })
            }
        }
    }

    pub async fn delete_document(
        &self,
        document_id: Uuid,
        requester: &Requester,
    ) -> DocumentResult<Uuid> {
        let document = self.get(document_id, requester).await?;

        let removed_blob = self.blobs.delete(&document.storage_path).await?;
        if !removed_blob {
            warn!(
                document_id = %document_id,
                storage_path = %document.storage_path,
                "blob already missing during delete"
            );
        }

        let removed_record = self
            .repository
            .delete(document_id)
            .await
            .map_err(DocumentError::persistence)?;
        if !removed_record {
            return Err(DocumentError::NotFound);
        }

        info!(
            document_id = %document_id,
            requester_id = %requester.user_id,
            "document deleted"
        );
        Ok(document_id)
    }

    pub async fn list_for_owner(&self, owner_id: &str) -> DocumentResult<Vec<Document>> {
        self.repository
            .list_for_owner(owner_id)
            .await
            .map_err(DocumentError::persistence)
    }

    pub async fn list_all(&self, query: ListQuery) -> DocumentResult<DocumentPage> {
        self.repository
            .list(query)
            .await
            .map_err(DocumentError::persistence)
    }

    /// Finds blobs that no record references, including partial files left
    /// by interrupted uploads. Blobs younger than `min_age` are left alone
    /// since their upload may still be writing or inserting its record.
    pub async fn reconcile_orphans(
        &self,
        min_age: Duration,
        apply: bool,
    ) -> DocumentResult<ReconcileReport> {
        let referenced: std::collections::HashSet<String> = self
            .repository
            .storage_paths()
            .await
            .map_err(DocumentError::persistence)?
            .into_iter()
            .collect();
        let blobs = self.blobs.list().await?;
        let now = SystemTime::now();

        let mut report = ReconcileReport {
            scanned: blobs.len(),
            ..ReconcileReport::default()
        };

        for blob in blobs {
            if !blob.partial && referenced.contains(&blob.storage_path) {
                continue;
            }
            let age = blob
                .modified
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < min_age {
                report.skipped_recent += 1;
                continue;
            }

            if apply {
                match self.blobs.delete(&blob.storage_path).await {
                    Ok(_) => {
                        info!(storage_path = %blob.storage_path, "removed orphaned blob");
                        report.removed += 1;
                    }
                    Err(err) => {
                        error!(
                            error = %err,
                            storage_path = %blob.storage_path,
                            "failed to remove orphaned blob"
                        );
                    }
                }
            }
            if blob.partial {
                report.partial += 1;
            }
            report.orphaned.push(blob.storage_path);
        }

        Ok(report)
    }

    async fn find(&self, document_id: Uuid) -> DocumentResult<Document> {
        self.repository
            .find(document_id)
            .await
            .map_err(DocumentError::persistence)?
            .ok_or(DocumentError::NotFound)
    }
}

fn current_status(document: &Document) -> DocumentResult<DocumentStatus> {
    document.parsed_status().map_err(DocumentError::persistence)
}

fn review_timestamp(document: &Document) -> NaiveDateTime {
    Utc::now().naive_utc().max(document.uploaded_at)
}
