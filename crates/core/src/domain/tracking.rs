use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::case::CaseNumber;

/// A Slack channel that wants update notifications for a case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedCase {
    pub case_number: CaseNumber,
    pub channel_id: String,
    pub channel_name: String,
    pub tracked_at: DateTime<Utc>,
}

impl TrackedCase {
    pub fn new(
        case_number: CaseNumber,
        channel_id: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            case_number,
            channel_id: channel_id.into(),
            channel_name: channel_name.into(),
            tracked_at: Utc::now(),
        }
    }
}
