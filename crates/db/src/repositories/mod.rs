use async_trait::async_trait;
use thiserror::Error;

use casebot_core::domain::case::CaseNumber;
use casebot_core::domain::registration::{Guid, NewRegistration, RegistrationEntry};
use casebot_core::domain::tracking::TrackedCase;

pub mod memory;
pub mod registration;
pub mod tracked_case;

pub use memory::{InMemoryRegistrationRepository, InMemoryTrackedCaseRepository};
pub use registration::SqlRegistrationRepository;
pub use tracked_case::SqlTrackedCaseRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unknown collection `{0}`")]
    UnknownCollection(String),
}

/// Append-only registration log. Every write gets a store-assigned `sequence` that is
/// strictly greater than any sequence already handed out, across all writers.
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    async fn write(
        &self,
        collection: &str,
        registration: NewRegistration,
    ) -> Result<Guid, RepositoryError>;

    /// Entries for one update cycle of a case, earliest sequence first.
    async fn query(
        &self,
        case_number: &CaseNumber,
        update_time: &str,
    ) -> Result<Vec<RegistrationEntry>, RepositoryError>;

    /// Every entry for a case across all update cycles, earliest sequence first.
    async fn list_for_case(
        &self,
        case_number: &CaseNumber,
    ) -> Result<Vec<RegistrationEntry>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<RegistrationEntry>, RepositoryError>;

    /// Removes every entry for the case and returns how many were removed.
    async fn delete_all(&self, case_number: &CaseNumber) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait TrackedCaseRepository: Send + Sync {
    /// Returns `false` when the channel already tracks the case.
    async fn track(&self, tracked: TrackedCase) -> Result<bool, RepositoryError>;

    /// Returns `false` when there was nothing to remove.
    async fn untrack(
        &self,
        case_number: &CaseNumber,
        channel_id: &str,
    ) -> Result<bool, RepositoryError>;

    async fn list_for_channel(&self, channel_id: &str)
        -> Result<Vec<TrackedCase>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<TrackedCase>, RepositoryError>;

    async fn channels_for_case(
        &self,
        case_number: &CaseNumber,
    ) -> Result<Vec<TrackedCase>, RepositoryError>;
}

pub(crate) fn ensure_cases_collection(collection: &str) -> Result<(), RepositoryError> {
    if collection == casebot_core::domain::registration::CASES_COLLECTION {
        Ok(())
    } else {
        Err(RepositoryError::UnknownCollection(collection.to_string()))
    }
}
