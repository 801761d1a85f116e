use async_trait::async_trait;
use tokio::sync::Mutex;

use casebot_core::domain::case::{
    CaseNumber, CasePriority, CaseRecord, CaseState, EscalationReason, ResourceName,
};

use crate::api::{NewCase, TicketingApi, TicketingError};

pub(crate) fn record(case_number: &str, update_time: &str) -> CaseRecord {
    CaseRecord {
        case_number: CaseNumber(case_number.to_string()),
        resource_name: ResourceName::parse(&format!("projects/100/cases/{case_number}"))
            .expect("resource name"),
        title: "Disk latency".to_string(),
        description: "p99 write latency above 2s".to_string(),
        escalated: false,
        creator: "Slackbot Admin".to_string(),
        create_time: "2021-07-12T17:55:11Z".to_string(),
        update_time: update_time.to_string(),
        priority: CasePriority::P2,
        state: CaseState::New,
        comments: Vec::new(),
    }
}

/// Ticketing API double: serves `cases` from memory and records every mutating call.
#[derive(Default)]
pub(crate) struct FakeTicketing {
    pub(crate) cases: Mutex<Vec<CaseRecord>>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) fail_with: Option<TicketingError>,
}

impl FakeTicketing {
    pub(crate) fn with_cases(cases: Vec<CaseRecord>) -> Self {
        Self { cases: Mutex::new(cases), ..Self::default() }
    }

    pub(crate) fn failing(error: TicketingError) -> Self {
        Self { fail_with: Some(error), ..Self::default() }
    }

    pub(crate) async fn set_cases(&self, cases: Vec<CaseRecord>) {
        *self.cases.lock().await = cases;
    }

    pub(crate) async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record_call(&self, call: String) -> Result<(), TicketingError> {
        self.calls.lock().await.push(call);
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TicketingApi for FakeTicketing {
    async fn list_cases(&self, _parent: &str) -> Result<Vec<CaseRecord>, TicketingError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        Ok(self.cases.lock().await.clone())
    }

    async fn get_case(&self, name: &ResourceName) -> Result<CaseRecord, TicketingError> {
        self.cases
            .lock()
            .await
            .iter()
            .find(|case| case.resource_name == *name)
            .cloned()
            .ok_or_else(|| TicketingError::Api { status: 404, message: name.to_string() })
    }

    async fn create_case(
        &self,
        parent: &str,
        request: &NewCase,
    ) -> Result<CaseRecord, TicketingError> {
        self.record_call(format!("create {parent} {}", request.display_name)).await?;
        let mut created = record("900", "2021-07-13T09:00:00Z");
        created.title = request.display_name.clone();
        created.description = request.description.clone();
        created.priority = request.priority;
        self.cases.lock().await.push(created.clone());
        Ok(created)
    }

    async fn close_case(&self, name: &ResourceName) -> Result<(), TicketingError> {
        self.record_call(format!("close {name}")).await
    }

    async fn escalate_case(
        &self,
        name: &ResourceName,
        reason: EscalationReason,
        justification: &str,
    ) -> Result<(), TicketingError> {
        self.record_call(format!("escalate {name} {} {justification}", reason.as_str())).await
    }

    async fn add_comment(&self, name: &ResourceName, body: &str) -> Result<(), TicketingError> {
        self.record_call(format!("comment {name} {body}")).await
    }

    async fn change_priority(
        &self,
        name: &ResourceName,
        priority: CasePriority,
    ) -> Result<(), TicketingError> {
        self.record_call(format!("priority {name} {priority}")).await
    }

    async fn subscribe_emails(
        &self,
        name: &ResourceName,
        emails: &[String],
    ) -> Result<(), TicketingError> {
        self.record_call(format!("subscribe {name} {}", emails.join(","))).await
    }
}
