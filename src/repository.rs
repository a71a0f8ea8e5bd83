use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{Document, DocumentStatus, NewDocument, ReviewUpdate};
use crate::schema::documents;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: i64,
    pub page_size: i64,
    pub status: Option<DocumentStatus>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            status: None,
        }
    }
}

impl ListQuery {
    /// Clamps out-of-range paging input instead of rejecting it.
    pub fn new(page: Option<i64>, page_size: Option<i64>, status: Option<DocumentStatus>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            status,
        }
    }

    /// Saturates for absurd page numbers; such pages are simply empty.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub items: Vec<Document>,
    pub total: i64,
}

/// Record store for document metadata. Every list is newest-first.
#[async_trait]
pub trait DocumentRepository: Send + Sync + 'static {
    async fn create(&self, document: NewDocument) -> Result<Document>;

    async fn find(&self, id: Uuid) -> Result<Option<Document>>;

    /// Applies `update` only while the row still has status `expected`;
    /// `None` means the row is gone or was decided concurrently.
    async fn apply_review(
        &self,
        id: Uuid,
        expected: DocumentStatus,
        update: ReviewUpdate,
    ) -> Result<Option<Document>>;

    /// Returns `false` when no row matched.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Document>>;

    async fn list(&self, query: ListQuery) -> Result<DocumentPage>;

    async fn storage_paths(&self) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            f(&mut conn).context("document query failed")
        })
        .await
        .context("database task panicked")?
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn create(&self, document: NewDocument) -> Result<Document> {
        self.with_conn(move |conn| {
            diesel::insert_into(documents::table)
                .values(&document)
                .get_result::<Document>(conn)
        })
        .await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Document>> {
        self.with_conn(move |conn| {
            documents::table
                .find(id)
                .first::<Document>(conn)
                .optional()
        })
        .await
    }

    async fn apply_review(
        &self,
        id: Uuid,
        expected: DocumentStatus,
        update: ReviewUpdate,
    ) -> Result<Option<Document>> {
        self.with_conn(move |conn| {
            diesel::update(
                documents::table
                    .find(id)
                    .filter(documents::status.eq(expected.as_str())),
            )
            .set(&update)
            .get_result::<Document>(conn)
            .optional()
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = self
            .with_conn(move |conn| diesel::delete(documents::table.find(id)).execute(conn))
            .await?;
        Ok(deleted > 0)
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Document>> {
        let owner_id = owner_id.to_string();
        self.with_conn(move |conn| {
            documents::table
                .filter(documents::owner_id.eq(owner_id))
                .order((documents::uploaded_at.desc(), documents::id.desc()))
                .load::<Document>(conn)
        })
        .await
    }

    async fn list(&self, query: ListQuery) -> Result<DocumentPage> {
        self.with_conn(move |conn| {
            let mut items_query = documents::table.into_boxed();
            let mut count_query = documents::table.into_boxed();

            if let Some(status) = query.status {
                items_query = items_query.filter(documents::status.eq(status.as_str()));
                count_query = count_query.filter(documents::status.eq(status.as_str()));
            }

            let total: i64 = count_query.count().get_result(conn)?;
            let items: Vec<Document> = items_query
                .order((documents::uploaded_at.desc(), documents::id.desc()))
                .offset(query.offset())
                .limit(query.page_size)
                .load(conn)?;

            Ok(DocumentPage { items, total })
        })
        .await
    }

    async fn storage_paths(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            documents::table
                .select(documents::storage_path)
                .load::<String>(conn)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::{ListQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

    #[test]
    fn offset_is_page_minus_one_times_size() {
        let query = ListQuery::new(Some(3), Some(10), None);
        assert_eq!(query.offset(), 20);
        assert_eq!(query.page_size, 10);
    }

    #[test]
    fn clamps_paging_input() {
        let query = ListQuery::new(Some(0), Some(10_000), None);
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, MAX_PAGE_SIZE);
        assert_eq!(query.offset(), 0);

        let defaults = ListQuery::new(None, None, None);
        assert_eq!(defaults.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let query = ListQuery::new(Some(i64::MAX), Some(20), None);
        assert_eq!(query.page, i64::MAX);
        assert_eq!(query.offset(), i64::MAX);

        let query = ListQuery::new(Some(i64::MAX / 20 + 2), Some(MAX_PAGE_SIZE), None);
        assert_eq!(query.offset(), i64::MAX);
    }
}
