use async_trait::async_trait;
use thiserror::Error;

use casebot_core::domain::case::{CasePriority, CaseRecord, EscalationReason, ResourceName};
use casebot_core::errors::ApplicationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TicketingError {
    #[error("support api request failed: {0}")]
    Transport(String),
    #[error("support api returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("support api response could not be decoded: {0}")]
    Decode(String),
}

impl TicketingError {
    /// Connection failures, timeouts, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<TicketingError> for ApplicationError {
    fn from(error: TicketingError) -> Self {
        Self::Integration(error.to_string())
    }
}

/// Fields accepted when opening a new case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCase {
    pub display_name: String,
    pub description: String,
    pub classification_id: String,
    pub priority: CasePriority,
    pub time_zone: Option<String>,
    pub subscriber_emails: Vec<String>,
    pub test_case: bool,
}

/// Case operations of the external ticketing service, addressed by resource name.
#[async_trait]
pub trait TicketingApi: Send + Sync {
    /// Every case under `parent` (`projects/<id>` or `organizations/<id>`), with comments.
    async fn list_cases(&self, parent: &str) -> Result<Vec<CaseRecord>, TicketingError>;

    async fn get_case(&self, name: &ResourceName) -> Result<CaseRecord, TicketingError>;

    async fn create_case(
        &self,
        parent: &str,
        request: &NewCase,
    ) -> Result<CaseRecord, TicketingError>;

    async fn close_case(&self, name: &ResourceName) -> Result<(), TicketingError>;

    async fn escalate_case(
        &self,
        name: &ResourceName,
        reason: EscalationReason,
        justification: &str,
    ) -> Result<(), TicketingError>;

    async fn add_comment(&self, name: &ResourceName, body: &str) -> Result<(), TicketingError>;

    async fn change_priority(
        &self,
        name: &ResourceName,
        priority: CasePriority,
    ) -> Result<(), TicketingError>;

    async fn subscribe_emails(
        &self,
        name: &ResourceName,
        emails: &[String],
    ) -> Result<(), TicketingError>;
}
