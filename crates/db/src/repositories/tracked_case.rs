use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use casebot_core::domain::case::CaseNumber;
use casebot_core::domain::tracking::TrackedCase;

use super::{RepositoryError, TrackedCaseRepository};
use crate::DbPool;

pub struct SqlTrackedCaseRepository {
    pool: DbPool,
}

impl SqlTrackedCaseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TrackedCaseRepository for SqlTrackedCaseRepository {
    async fn track(&self, tracked: TrackedCase) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO tracked_case (case_number, channel_id, channel_name, tracked_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(case_number, channel_id) DO NOTHING",
        )
        .bind(tracked.case_number.as_str())
        .bind(&tracked.channel_id)
        .bind(&tracked.channel_name)
        .bind(tracked.tracked_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn untrack(
        &self,
        case_number: &CaseNumber,
        channel_id: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM tracked_case WHERE case_number = ? AND channel_id = ?")
            .bind(case_number.as_str())
            .bind(channel_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<TrackedCase>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT case_number, channel_id, channel_name, tracked_at
             FROM tracked_case
             WHERE channel_id = ?
             ORDER BY tracked_at ASC, case_number ASC",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(tracked_case_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<TrackedCase>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT case_number, channel_id, channel_name, tracked_at
             FROM tracked_case
             ORDER BY channel_name ASC, case_number ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(tracked_case_from_row).collect()
    }

    async fn channels_for_case(
        &self,
        case_number: &CaseNumber,
    ) -> Result<Vec<TrackedCase>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT case_number, channel_id, channel_name, tracked_at
             FROM tracked_case
             WHERE case_number = ?
             ORDER BY tracked_at ASC, channel_id ASC",
        )
        .bind(case_number.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(tracked_case_from_row).collect()
    }
}

fn tracked_case_from_row(row: SqliteRow) -> Result<TrackedCase, RepositoryError> {
    let tracked_at: String = row.try_get("tracked_at")?;
    let tracked_at = DateTime::parse_from_rfc3339(&tracked_at)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!(
                "invalid timestamp in `tracked_at`: `{tracked_at}` ({error})"
            ))
        })?;

    Ok(TrackedCase {
        case_number: CaseNumber(row.try_get("case_number")?),
        channel_id: row.try_get("channel_id")?,
        channel_name: row.try_get("channel_name")?,
        tracked_at,
    })
}
