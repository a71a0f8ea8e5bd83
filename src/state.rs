use std::sync::Arc;

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    lifecycle::DocumentService,
    repository::DocumentRepository,
    retrieval::RetrievalGateway,
    storage::BlobStore,
    validation::UploadValidator,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub documents: Arc<DocumentService>,
    pub retrieval: Arc<RetrievalGateway>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repository: Arc<dyn DocumentRepository>,
        blobs: Arc<dyn BlobStore>,
        jwt: JwtService,
    ) -> Self {
        let validator = UploadValidator::new(config.upload_max_bytes);
        let documents = DocumentService::new(repository.clone(), blobs.clone(), validator);
        let retrieval = RetrievalGateway::new(repository, blobs);
        Self {
            config: Arc::new(config),
            documents: Arc::new(documents),
            retrieval: Arc::new(retrieval),
            jwt,
        }
    }
}
