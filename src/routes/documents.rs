use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Document, DocumentStatus, UnknownStatus};
use crate::repository::{DocumentPage, ListQuery};
use crate::state::AppState;
use crate::validation::UploadCandidate;

const PREVIEW_CACHE_CONTROL: &str = "private, max-age=300";
const TEXT_FIELDS: &[&str] = &[
    "display_name",
    "name",
    "purpose",
    "category",
    "type",
    "document_type",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// `Content-Disposition` with an ASCII `filename` fallback and the exact
/// UTF-8 name in `filename*`.
pub fn content_disposition(disposition: Disposition, filename: &str) -> String {
    if filename.is_empty() {
        return disposition.as_str().to_string();
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_ascii_control() || !ch.is_ascii() => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(filename, percent_encoding::NON_ALPHANUMERIC);
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition.as_str(),
        sanitized,
        encoded
    )
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub document_id: Uuid,
    pub owner_id: String,
    pub storage_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub category: String,
    pub legacy_type: Option<String>,
    pub display_name: String,
    pub purpose: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub uploaded_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            document_id: doc.id,
            owner_id: doc.owner_id,
            storage_path: doc.storage_path,
            original_name: doc.original_name,
            mime_type: doc.mime_type,
            size_bytes: doc.size_bytes,
            category: doc.category,
            legacy_type: doc.legacy_type,
            display_name: doc.display_name,
            purpose: doc.purpose,
            status: doc.status,
            rejection_reason: doc.rejection_reason,
            reviewed_by: doc.reviewed_by,
            reviewed_at: doc.reviewed_at.map(format_timestamp),
            uploaded_at: format_timestamp(doc.uploaded_at),
        }
    }
}

#[derive(Serialize)]
pub struct DocumentPageResponse {
    pub documents: Vec<DocumentResponse>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl DocumentPageResponse {
    fn new(page: DocumentPage, query: &ListQuery) -> Self {
        let total_pages = (page.total + query.page_size - 1) / query.page_size;
        Self {
            documents: page.items.into_iter().map(DocumentResponse::from).collect(),
            page: query.page,
            page_size: query.page_size,
            total: page.total,
            total_pages,
        }
    }
}

#[derive(Serialize)]
pub struct DeleteDocumentResponse {
    pub document_id: Uuid,
}

#[derive(Deserialize)]
pub struct DocumentListQuery {
    pub page: Option<i64>,
    #[serde(alias = "pageSize")]
    pub page_size: Option<i64>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ReopenRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let mut candidate = UploadCandidate::default();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                candidate.original_name = field.file_name().map(|n| n.to_string());
                candidate.mime_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                candidate.bytes = Some(data.to_vec());
            }
            Some(text_field) if TEXT_FIELDS.contains(&text_field) => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid {text_field} field: {err}"))
                })?;
                let slot = match text_field {
                    "display_name" | "name" => &mut candidate.display_name,
                    "purpose" => &mut candidate.purpose,
                    "category" => &mut candidate.category,
                    _ => &mut candidate.legacy_type,
                };
                *slot = Some(value);
            }
            _ => {}
        }
    }

    let original_name = candidate.original_name.clone().unwrap_or_default();
    let document = state
        .documents
        .upload(&user.user_id, candidate)
        .await
        .map_err(|err| {
            error!(error = %err, original_name = %original_name, "document upload failed");
            AppError::from(err)
        })?;

    Ok((StatusCode::CREATED, Json(document.into())))
}

pub async fn list_my_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let documents = state.documents.list_for_owner(&user.user_id).await?;
    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

pub async fn list_all_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentPageResponse>> {
    user.require_reviewer()?;

    let status = params
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::parse::<DocumentStatus>)
        .transpose()
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    let query = ListQuery::new(params.page, params.page_size, status);
    let page = state.documents.list_all(query.clone()).await?;
    Ok(Json(DocumentPageResponse::new(page, &query)))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentResponse>> {
    let document = state
        .documents
        .get(document_id, &user.requester())
        .await?;
    Ok(Json(document.into()))
}

pub async fn update_document_status(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<DocumentResponse>> {
    user.require_reviewer()?;

    let status: DocumentStatus = payload
        .status
        .parse()
        .map_err(|err: UnknownStatus| AppError::bad_request(err.to_string()))?;

    let document = state
        .documents
        .update_status(document_id, status, &user.user_id, payload.rejection_reason)
        .await?;
    Ok(Json(document.into()))
}

pub async fn reopen_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    payload: Option<Json<ReopenRequest>>,
) -> AppResult<Json<DocumentResponse>> {
    user.require_reviewer()?;

    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let document = state
        .documents
        .reopen(document_id, &user.user_id, payload.reason.as_deref())
        .await?;
    Ok(Json(document.into()))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DeleteDocumentResponse>> {
    let document_id = state
        .documents
        .delete_document(document_id, &user.requester())
        .await?;
    Ok(Json(DeleteDocumentResponse { document_id }))
}

pub async fn preview_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Response> {
    serve_document(&state, document_id, &user, Disposition::Inline).await
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Response> {
    serve_document(&state, document_id, &user, Disposition::Attachment).await
}

async fn serve_document(
    state: &AppState,
    document_id: Uuid,
    user: &AuthenticatedUser,
    disposition: Disposition,
) -> AppResult<Response> {
    let resolved = state
        .retrieval
        .resolve(document_id, &user.requester())
        .await?;
    let bytes = state.retrieval.read(&resolved).await?;

    info!(
        document_id = %document_id,
        user_id = %user.user_id,
        disposition = disposition.as_str(),
        size = bytes.len(),
        "serving document"
    );

    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header_value(&resolved.mime_type)?);
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&content_disposition(disposition, &resolved.original_name))?,
    );
    match disposition {
        Disposition::Inline => {
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(PREVIEW_CACHE_CONTROL),
            );
        }
        Disposition::Attachment => {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }
    }
    Ok(response)
}

fn header_value(value: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(AppError::internal)
}

fn format_timestamp(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}
