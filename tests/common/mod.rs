use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use docdesk::auth::jwt::JwtService;
use docdesk::config::{parse_roles, AppConfig, DEFAULT_REVIEWER_ROLES};
use docdesk::db;
use docdesk::models::{Document, DocumentStatus, NewDocument, ReviewUpdate};
use docdesk::repository::{DocumentPage, DocumentRepository, ListQuery};
use docdesk::routes;
use docdesk::state::AppState;
use docdesk::storage::{BlobStore, LocalBlobStore};
use docdesk::validation::DEFAULT_MAX_UPLOAD_BYTES;
use http_body_util::BodyExt;
use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

/// In-memory record store mirroring the semantics of the PostgreSQL one.
#[derive(Default)]
pub struct FakeRepository {
    rows: Mutex<HashMap<Uuid, Document>>,
    fail_next_create: AtomicBool,
}

impl FakeRepository {
    #[allow(dead_code)]
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub async fn count(&self) -> usize {
        self.rows.lock().await.len()
    }
}

fn newest_first(rows: &mut [Document]) {
    rows.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl DocumentRepository for FakeRepository {
    async fn create(&self, document: NewDocument) -> Result<Document> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            bail!("simulated insert failure");
        }

        let mut rows = self.rows.lock().await;
        if rows.contains_key(&document.id) {
            bail!("duplicate document id {}", document.id);
        }
        if rows
            .values()
            .any(|row| row.storage_path == document.storage_path)
        {
            bail!("duplicate storage path {}", document.storage_path);
        }

        let row = Document {
            id: document.id,
            owner_id: document.owner_id,
            storage_path: document.storage_path,
            original_name: document.original_name,
            mime_type: document.mime_type,
            size_bytes: document.size_bytes,
            category: document.category,
            legacy_type: document.legacy_type,
            display_name: document.display_name,
            purpose: document.purpose,
            status: document.status,
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            uploaded_at: document.uploaded_at,
        };
        rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn apply_review(
        &self,
        id: Uuid,
        expected: DocumentStatus,
        update: ReviewUpdate,
    ) -> Result<Option<Document>> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.status != expected.as_str() {
            return Ok(None);
        }

        row.status = update.status;
        if let Some(reason) = update.rejection_reason {
            row.rejection_reason = reason;
        }
        if let Some(reviewer) = update.reviewed_by {
            row.reviewed_by = Some(reviewer);
        }
        if let Some(reviewed_at) = update.reviewed_at {
            row.reviewed_at = Some(reviewed_at);
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.rows.lock().await.remove(&id).is_some())
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Document>> {
        let mut rows: Vec<Document> = self
            .rows
            .lock()
            .await
            .values()
            .filter(|row| row.owner_id == owner_id)
            .cloned()
            .collect();
        newest_first(&mut rows);
        Ok(rows)
    }

    async fn list(&self, query: ListQuery) -> Result<DocumentPage> {
        let mut rows: Vec<Document> = self
            .rows
            .lock()
            .await
            .values()
            .filter(|row| {
                query
                    .status
                    .map_or(true, |status| row.status == status.as_str())
            })
            .cloned()
            .collect();
        newest_first(&mut rows);

        let total = rows.len() as i64;
        let items = rows
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .collect();
        Ok(DocumentPage { items, total })
    }

    async fn storage_paths(&self) -> Result<Vec<String>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .map(|row| row.storage_path.clone())
            .collect())
    }
}

pub fn test_config(upload_dir: &std::path::Path) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused@localhost/unused".to_string(),
        database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        jwt_expiry_minutes: 60,
        cors_allowed_origin: None,
        upload_dir: upload_dir.to_path_buf(),
        upload_max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        reviewer_roles: parse_roles(DEFAULT_REVIEWER_ROLES),
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    repository: Arc<FakeRepository>,
    blobs: Arc<LocalBlobStore>,
    _upload_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let upload_dir = tempfile::tempdir()?;
        let config = test_config(&upload_dir.path().join("documents"));

        let repository = Arc::new(FakeRepository::default());
        let blobs = Arc::new(LocalBlobStore::new(config.upload_dir.clone()));
        let jwt = JwtService::from_config(&config)?;
        let repository_for_state: Arc<dyn DocumentRepository> = repository.clone();
        let blobs_for_state: Arc<dyn BlobStore> = blobs.clone();
        let state = AppState::new(config, repository_for_state, blobs_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            repository,
            blobs,
            _upload_dir: upload_dir,
        })
    }

    #[allow(dead_code)]
    pub fn repository(&self) -> Arc<FakeRepository> {
        self.repository.clone()
    }

    #[allow(dead_code)]
    pub fn blobs(&self) -> Arc<LocalBlobStore> {
        self.blobs.clone()
    }

    #[allow(dead_code)]
    pub async fn blob_count(&self) -> Result<usize> {
        Ok(self.blobs.list().await?.len())
    }

    #[allow(dead_code)]
    pub fn token(&self, user_id: &str, role: &str) -> Result<String> {
        self.state.jwt.generate_token(user_id, user_id, role)
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, Body::empty(), None, token)
            .await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::DELETE, path, Body::empty(), None, token)
            .await
    }

    #[allow(dead_code)]
    pub async fn post(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::POST, path, Body::empty(), None, token)
            .await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(
            Method::PUT,
            path,
            Body::from(body),
            Some("application/json".to_string()),
            token,
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(
            Method::POST,
            path,
            Body::from(body),
            Some("application/json".to_string()),
            token,
        )
        .await
    }

    /// Posts a multipart upload; `fields` are sent as plain text parts.
    #[allow(dead_code)]
    pub async fn upload_document(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        fields: &[(&str, &str)],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");

        for (name, value) in fields {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        self.send(
            Method::POST,
            "/api/documents",
            Body::from(body),
            Some(format!("multipart/form-data; boundary={boundary}")),
            Some(token),
        )
        .await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Body,
        content_type: Option<String>,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub fn pdf_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.4\n".to_vec();
    bytes.extend((0..len.saturating_sub(bytes.len())).map(|i| (i % 251) as u8));
    bytes.truncate(len);
    bytes
}
