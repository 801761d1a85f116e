use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use casebot_core::domain::case::{CaseNumber, CaseRecord};
use casebot_core::domain::registration::{Guid, NewRegistration, RegistrationEntry};

use super::{ensure_cases_collection, RegistrationRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT sequence, guid, case_number, update_time, record_json, recorded_at
     FROM case_registration";

/// SQLite-backed registration log. `sequence` is an `AUTOINCREMENT` rowid, so values are
/// never reused even after `delete_all`.
pub struct SqlRegistrationRepository {
    pool: DbPool,
}

impl SqlRegistrationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RegistrationRepository for SqlRegistrationRepository {
    async fn write(
        &self,
        collection: &str,
        registration: NewRegistration,
    ) -> Result<Guid, RepositoryError> {
        ensure_cases_collection(collection)?;
        let record_json = serde_json::to_string(&registration.record)
            .map_err(|error| RepositoryError::Decode(format!("encode case record: {error}")))?;
        let recorded_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        sqlx::query(
            "INSERT INTO case_registration (
                collection,
                guid,
                case_number,
                update_time,
                record_json,
                recorded_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(collection)
        .bind(registration.guid.as_str())
        .bind(registration.case_number().as_str())
        .bind(registration.update_time())
        .bind(record_json)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(registration.guid)
    }

    async fn query(
        &self,
        case_number: &CaseNumber,
        update_time: &str,
    ) -> Result<Vec<RegistrationEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS}
             WHERE case_number = ? AND update_time = ?
             ORDER BY sequence ASC"
        ))
        .bind(case_number.as_str())
        .bind(update_time)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn list_for_case(
        &self,
        case_number: &CaseNumber,
    ) -> Result<Vec<RegistrationEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS}
             WHERE case_number = ?
             ORDER BY sequence ASC"
        ))
        .bind(case_number.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<RegistrationEntry>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY sequence ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn delete_all(&self, case_number: &CaseNumber) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM case_registration WHERE case_number = ?")
            .bind(case_number.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn entry_from_row(row: SqliteRow) -> Result<RegistrationEntry, RepositoryError> {
    let record_json: String = row.try_get("record_json")?;
    let record = serde_json::from_str::<CaseRecord>(&record_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid case record in `record_json`: {error}"))
    })?;

    Ok(RegistrationEntry {
        guid: Guid(row.try_get("guid")?),
        case_number: CaseNumber(row.try_get("case_number")?),
        update_time: row.try_get("update_time")?,
        sequence: row.try_get("sequence")?,
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
        record,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use casebot_core::domain::case::CaseNumber;
    use casebot_core::domain::registration::{NewRegistration, CASES_COLLECTION};

    use super::SqlRegistrationRepository;
    use crate::migrations;
    use crate::repositories::{RegistrationRepository, RepositoryError};
    use crate::test_support::record;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_registration_repo_round_trips_record_and_orders_by_sequence() {
        let pool = setup_pool().await;
        let repo = SqlRegistrationRepository::new(pool.clone());

        let first = NewRegistration::new(record("12345", "2021-07-12T18:00:00Z"));
        let second = NewRegistration::new(record("12345", "2021-07-12T18:00:00Z"));
        let first_guid = repo.write(CASES_COLLECTION, first.clone()).await.expect("write first");
        let second_guid =
            repo.write(CASES_COLLECTION, second.clone()).await.expect("write second");

        let entries = repo
            .query(&CaseNumber("12345".to_string()), "2021-07-12T18:00:00Z")
            .await
            .expect("query cycle");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].guid, first_guid);
        assert_eq!(entries[1].guid, second_guid);
        assert!(entries[0].sequence < entries[1].sequence);
        assert_eq!(entries[0].record, first.record);

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_registration_repo_scopes_queries_by_update_time() {
        let pool = setup_pool().await;
        let repo = SqlRegistrationRepository::new(pool.clone());
        let case_number = CaseNumber("12345".to_string());

        repo.write(CASES_COLLECTION, NewRegistration::new(record("12345", "T1")))
            .await
            .expect("write T1");
        repo.write(CASES_COLLECTION, NewRegistration::new(record("12345", "T2")))
            .await
            .expect("write T2");
        repo.write(CASES_COLLECTION, NewRegistration::new(record("67890", "T1")))
            .await
            .expect("write other case");

        assert_eq!(repo.query(&case_number, "T1").await.expect("query T1").len(), 1);
        assert_eq!(repo.list_for_case(&case_number).await.expect("list case").len(), 2);
        assert_eq!(repo.list_all().await.expect("list all").len(), 3);

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_registration_repo_delete_all_removes_only_that_case() {
        let pool = setup_pool().await;
        let repo = SqlRegistrationRepository::new(pool.clone());
        let case_number = CaseNumber("12345".to_string());

        for update_time in ["T1", "T1", "T2"] {
            repo.write(CASES_COLLECTION, NewRegistration::new(record("12345", update_time)))
                .await
                .expect("write");
        }
        repo.write(CASES_COLLECTION, NewRegistration::new(record("67890", "T1")))
            .await
            .expect("write other case");

        assert_eq!(repo.delete_all(&case_number).await.expect("delete"), 3);
        assert!(repo.list_for_case(&case_number).await.expect("list case").is_empty());
        assert_eq!(repo.list_all().await.expect("list all").len(), 1);
        assert_eq!(repo.delete_all(&case_number).await.expect("delete again"), 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn sql_registration_repo_rejects_unknown_collection() {
        let pool = setup_pool().await;
        let repo = SqlRegistrationRepository::new(pool.clone());

        let error = repo
            .write("channels", NewRegistration::new(record("12345", "T1")))
            .await
            .expect_err("unknown collection");
        assert!(matches!(error, RepositoryError::UnknownCollection(ref name) if name == "channels"));

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
