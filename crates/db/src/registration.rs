//! First-writer-wins registration of observed case events.
//!
//! Writers never coordinate with each other. Each one appends a [`RegistrationEntry`]
//! carrying a fresh [`Guid`], then reads the update cycle back and checks whether its own
//! guid holds the lowest store-assigned sequence. Only that writer notifies anyone.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use casebot_core::domain::case::{CaseNumber, CaseRecord, ResourceName};
use casebot_core::domain::registration::{
    canonical_cases, select_first_in, FirstInSelection, Guid, NewRegistration, RegistrationEntry,
    CASES_COLLECTION,
};
use casebot_core::errors::ApplicationError;
use casebot_core::retry::RetryPolicy;

use crate::repositories::{RegistrationRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum FirstInError {
    #[error("no registration is visible yet for case {case_number} at update time {update_time}")]
    NotFound { case_number: CaseNumber, update_time: String },
    #[error("registrations {guids:?} share the winning sequence {sequence} for case {case_number}")]
    StoreInconsistency { case_number: CaseNumber, sequence: i64, guids: Vec<Guid> },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl FirstInError {
    /// `NotFound` means "not visible yet"; a failed store read may also succeed later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Repository(RepositoryError::Database(_)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate { winner: Guid },
    Unresolved,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotifyDecision {
    Notify,
    Skip(SkipReason),
}

impl NotifyDecision {
    pub fn should_notify(&self) -> bool {
        matches!(self, Self::Notify)
    }
}

#[derive(Clone)]
pub struct RegistrationGuard {
    repository: Arc<dyn RegistrationRepository>,
}

impl RegistrationGuard {
    pub fn new(repository: Arc<dyn RegistrationRepository>) -> Self {
        Self { repository }
    }

    /// Appends one entry for `record` under a freshly generated guid. Existing entries are
    /// never touched.
    pub async fn register(&self, record: CaseRecord) -> Result<Guid, RepositoryError> {
        let registration = NewRegistration::new(record);
        let case_number = registration.case_number().clone();
        let update_time = registration.update_time().to_string();

        let guid = self.repository.write(CASES_COLLECTION, registration).await?;
        debug!(
            event_name = "registration.written",
            case_number = %case_number,
            update_time = %update_time,
            guid = %guid,
            "case registration written"
        );
        Ok(guid)
    }
}

#[derive(Clone)]
pub struct FirstInResolver {
    repository: Arc<dyn RegistrationRepository>,
    retry: RetryPolicy,
}

impl FirstInResolver {
    pub fn new(repository: Arc<dyn RegistrationRepository>) -> Self {
        Self { repository, retry: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The entry with the lowest sequence among those sharing `(case_number, update_time)`.
    pub async fn resolve_first_in(
        &self,
        case_number: &CaseNumber,
        update_time: &str,
    ) -> Result<RegistrationEntry, FirstInError> {
        let entries = self.repository.query(case_number, update_time).await?;

        match select_first_in(entries) {
            FirstInSelection::Winner(entry) => Ok(entry),
            FirstInSelection::Empty => Err(FirstInError::NotFound {
                case_number: case_number.clone(),
                update_time: update_time.to_string(),
            }),
            FirstInSelection::Tied { sequence, guids } => {
                Err(FirstInError::StoreInconsistency {
                    case_number: case_number.clone(),
                    sequence,
                    guids,
                })
            }
        }
    }

    pub async fn is_first(
        &self,
        case_number: &CaseNumber,
        update_time: &str,
        guid: &Guid,
    ) -> Result<bool, FirstInError> {
        let winner = self.resolve_first_in(case_number, update_time).await?;
        Ok(winner.guid == *guid)
    }

    /// Like [`Self::resolve_first_in`], retrying while the registration is not yet visible.
    pub async fn resolve_with_retry(
        &self,
        case_number: &CaseNumber,
        update_time: &str,
    ) -> Result<RegistrationEntry, FirstInError> {
        self.retry
            .run("first_in.resolve", FirstInError::is_retriable, || {
                self.resolve_first_in(case_number, update_time)
            })
            .await
    }

    /// Whether the holder of `guid` owns the notification for this update cycle. Any
    /// failure to resolve a winner yields a skip.
    pub async fn decide(
        &self,
        case_number: &CaseNumber,
        update_time: &str,
        guid: &Guid,
    ) -> NotifyDecision {
        match self.resolve_with_retry(case_number, update_time).await {
            Ok(winner) if winner.guid == *guid => NotifyDecision::Notify,
            Ok(winner) => {
                info!(
                    event_name = "first_in.duplicate_skipped",
                    case_number = %case_number,
                    update_time = %update_time,
                    guid = %guid,
                    winner = %winner.guid,
                    "another writer registered this update first"
                );
                NotifyDecision::Skip(SkipReason::Duplicate { winner: winner.guid })
            }
            Err(error) => {
                warn!(
                    event_name = "first_in.unresolved",
                    case_number = %case_number,
                    update_time = %update_time,
                    guid = %guid,
                    error = %error,
                    "could not resolve first-in registration; skipping notification"
                );
                NotifyDecision::Skip(SkipReason::Unresolved)
            }
        }
    }
}

/// Read side of the registration log for callers that only know a case number.
#[derive(Clone)]
pub struct CaseDirectory {
    repository: Arc<dyn RegistrationRepository>,
}

impl CaseDirectory {
    pub fn new(repository: Arc<dyn RegistrationRepository>) -> Self {
        Self { repository }
    }

    /// First-in record of the most recent update cycle for the case.
    pub async fn canonical_record(
        &self,
        case_number: &CaseNumber,
    ) -> Result<Option<CaseRecord>, RepositoryError> {
        let entries = self.repository.list_for_case(case_number).await?;
        Ok(canonical_cases(entries).pop().map(|entry| entry.record))
    }

    pub async fn canonical_cases(&self) -> Result<Vec<RegistrationEntry>, RepositoryError> {
        Ok(canonical_cases(self.repository.list_all().await?))
    }

    pub async fn resource_name(
        &self,
        case_number: &CaseNumber,
    ) -> Result<ResourceName, ApplicationError> {
        match self.canonical_record(case_number).await {
            Ok(Some(record)) => Ok(record.resource_name),
            Ok(None) => Err(ApplicationError::CaseNotFound(case_number.to_string())),
            Err(error) => Err(ApplicationError::Persistence(error.to_string())),
        }
    }

    pub async fn forget(&self, case_number: &CaseNumber) -> Result<u64, RepositoryError> {
        let removed = self.repository.delete_all(case_number).await?;
        info!(
            event_name = "registration.deleted",
            case_number = %case_number,
            removed,
            "case registrations deleted"
        );
        Ok(removed)
    }
}
