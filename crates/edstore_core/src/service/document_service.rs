//! Handler-facing document use-case service.
//!
//! # Responsibility
//! - Expose the repository operations to the handler layer.
//! - Retry operations that lost a lock or busy race, as configured.
//!
//! # Invariants
//! - Only results whose write conflict is retryable are retried; stale
//!   requests, reference failures and unknown failures return immediately.
//! - Ownership checks and reads are never retried.

use crate::config::RetryConfig;
use crate::model::outcome::{
    DeleteResult, GetResult, OwnershipResult, RepositoryOutcome, UpdateResult, UpsertResult,
};
use crate::model::request::{
    DeleteRequest, GetRequest, OwnershipRequest, UpdateRequest, UpsertRequest,
};
use crate::repo::document_repo::DocumentRepository;
use log::info;

/// Use-case service wrapper over a document repository.
pub struct DocumentService<R: DocumentRepository> {
    repo: R,
    retry: RetryConfig,
}

impl<R: DocumentRepository> DocumentService<R> {
    /// Creates a service that never retries.
    pub fn new(repo: R) -> Self {
        Self::with_retry(repo, RetryConfig::no_retry())
    }

    pub fn with_retry(repo: R, retry: RetryConfig) -> Self {
        Self { repo, retry }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn upsert_document(&self, request: &UpsertRequest) -> UpsertResult {
        self.with_conflict_retry("document_upsert", &request.trace_id, || {
            self.repo.upsert_document(request)
        })
    }

    pub fn update_document_by_id(&self, request: &UpdateRequest) -> UpdateResult {
        self.with_conflict_retry("document_update", &request.trace_id, || {
            self.repo.update_document_by_id(request)
        })
    }

    pub fn delete_document_by_id(&self, request: &DeleteRequest) -> DeleteResult {
        self.with_conflict_retry("document_delete", &request.trace_id, || {
            self.repo.delete_document_by_id(request)
        })
    }

    pub fn get_document_by_id(&self, request: &GetRequest) -> GetResult {
        self.repo.get_document_by_id(request)
    }

    pub fn reject_by_ownership_security(&self, request: &OwnershipRequest) -> OwnershipResult {
        self.repo.reject_by_ownership_security(request)
    }

    fn with_conflict_retry<T, F>(&self, event: &str, trace_id: &str, mut attempt: F) -> T
    where
        T: RepositoryOutcome,
        F: FnMut() -> T,
    {
        let mut result = attempt();
        let mut retries = 0;
        while result.is_retryable() && retries < self.retry.max_conflict_retries {
            retries += 1;
            let delay = self.retry.delay_for(retries);
            info!(
                "event={} module=service status=retry trace_id={} attempt={} response={} delay_ms={}",
                event,
                trace_id,
                retries,
                result.response_tag(),
                delay.as_millis()
            );
            std::thread::sleep(delay);
            result = attempt();
        }
        result
    }
}
