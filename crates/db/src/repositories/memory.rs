use std::collections::HashMap;

use tokio::sync::{Mutex, RwLock};

use casebot_core::domain::case::CaseNumber;
use casebot_core::domain::registration::{Guid, NewRegistration, RegistrationEntry};
use casebot_core::domain::tracking::TrackedCase;
use chrono::Utc;

use super::{
    ensure_cases_collection, RegistrationRepository, RepositoryError, TrackedCaseRepository,
};

#[derive(Default)]
struct RegistrationLog {
    next_sequence: i64,
    entries: Vec<RegistrationEntry>,
}

/// Registration log held in process memory. Sequence assignment and append happen under
/// one lock, so the log order is the total write order.
#[derive(Default)]
pub struct InMemoryRegistrationRepository {
    log: Mutex<RegistrationLog>,
}

impl InMemoryRegistrationRepository {
    pub async fn len(&self) -> usize {
        self.log.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl RegistrationRepository for InMemoryRegistrationRepository {
    async fn write(
        &self,
        collection: &str,
        registration: NewRegistration,
    ) -> Result<Guid, RepositoryError> {
        ensure_cases_collection(collection)?;
        let mut log = self.log.lock().await;
        log.next_sequence += 1;
        let entry = RegistrationEntry {
            guid: registration.guid.clone(),
            case_number: registration.record.case_number.clone(),
            update_time: registration.record.update_time.clone(),
            sequence: log.next_sequence,
            recorded_at: Utc::now(),
            record: registration.record,
        };
        log.entries.push(entry);
        Ok(registration.guid)
    }

    async fn query(
        &self,
        case_number: &CaseNumber,
        update_time: &str,
    ) -> Result<Vec<RegistrationEntry>, RepositoryError> {
        let log = self.log.lock().await;
        Ok(log
            .entries
            .iter()
            .filter(|entry| entry.case_number == *case_number && entry.update_time == update_time)
            .cloned()
            .collect())
    }

    async fn list_for_case(
        &self,
        case_number: &CaseNumber,
    ) -> Result<Vec<RegistrationEntry>, RepositoryError> {
        let log = self.log.lock().await;
        Ok(log.entries.iter().filter(|entry| entry.case_number == *case_number).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<RegistrationEntry>, RepositoryError> {
        Ok(self.log.lock().await.entries.clone())
    }

    async fn delete_all(&self, case_number: &CaseNumber) -> Result<u64, RepositoryError> {
        let mut log = self.log.lock().await;
        let before = log.entries.len();
        log.entries.retain(|entry| entry.case_number != *case_number);
        Ok((before - log.entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryTrackedCaseRepository {
    tracked: RwLock<HashMap<(String, String), TrackedCase>>,
}

#[async_trait::async_trait]
impl TrackedCaseRepository for InMemoryTrackedCaseRepository {
    async fn track(&self, tracked: TrackedCase) -> Result<bool, RepositoryError> {
        let mut cases = self.tracked.write().await;
        let key = (tracked.case_number.0.clone(), tracked.channel_id.clone());
        if cases.contains_key(&key) {
            return Ok(false);
        }
        cases.insert(key, tracked);
        Ok(true)
    }

    async fn untrack(
        &self,
        case_number: &CaseNumber,
        channel_id: &str,
    ) -> Result<bool, RepositoryError> {
        let mut cases = self.tracked.write().await;
        Ok(cases.remove(&(case_number.0.clone(), channel_id.to_string())).is_some())
    }

    async fn list_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<TrackedCase>, RepositoryError> {
        let cases = self.tracked.read().await;
        let mut listed = cases
            .values()
            .filter(|tracked| tracked.channel_id == channel_id)
            .cloned()
            .collect::<Vec<_>>();
        listed.sort_by(|left, right| {
            (left.tracked_at, &left.case_number).cmp(&(right.tracked_at, &right.case_number))
        });
        Ok(listed)
    }

    async fn list_all(&self) -> Result<Vec<TrackedCase>, RepositoryError> {
        let cases = self.tracked.read().await;
        let mut listed = cases.values().cloned().collect::<Vec<_>>();
        listed.sort_by(|left, right| {
            (&left.channel_name, &left.case_number).cmp(&(&right.channel_name, &right.case_number))
        });
        Ok(listed)
    }

    async fn channels_for_case(
        &self,
        case_number: &CaseNumber,
    ) -> Result<Vec<TrackedCase>, RepositoryError> {
        let cases = self.tracked.read().await;
        let mut listed = cases
            .values()
            .filter(|tracked| tracked.case_number == *case_number)
            .cloned()
            .collect::<Vec<_>>();
        listed.sort_by(|left, right| {
            (left.tracked_at, &left.channel_id).cmp(&(right.tracked_at, &right.channel_id))
        });
        Ok(listed)
    }
}
