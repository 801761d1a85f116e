//! REST client for the Cloud Support `v2beta` API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use casebot_core::config::SupportConfig;
use casebot_core::domain::case::{
    CaseComment, CasePriority, CaseRecord, CaseState, EscalationReason, ResourceName,
};
use casebot_core::errors::DomainError;
use casebot_core::retry::RetryPolicy;

use crate::api::{NewCase, TicketingApi, TicketingError};

const API_VERSION: &str = "v2beta";
const RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct CloudSupportClient {
    http: reqwest::Client,
    base_url: String,
    access_token: SecretString,
    retry: RetryPolicy,
}

impl CloudSupportClient {
    pub fn new(http: reqwest::Client, base_url: &str, access_token: SecretString) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            retry: RetryPolicy::new(3, RETRY_DELAY),
        }
    }

    pub fn from_config(config: &SupportConfig) -> Result<Self, TicketingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| TicketingError::Transport(error.to_string()))?;
        Ok(Self::new(http, &config.base_url, config.access_token.clone())
            .with_retry_policy(RetryPolicy::new(config.max_attempts, RETRY_DELAY)))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{API_VERSION}/{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path)).bearer_auth(self.access_token.expose_secret())
    }

    async fn send_json<T, F>(&self, operation: &str, build: F) -> Result<T, TicketingError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        self.retry.run(operation, TicketingError::is_transient, || send_once(build())).await
    }

    async fn list_comments(&self, name: &str) -> Result<Vec<CaseComment>, TicketingError> {
        let mut comments = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let path = format!("{name}/comments");
            let token = page_token.clone();
            let page: CommentPage = self
                .send_json("support.list_comments", || {
                    let request = self.request(Method::GET, &path);
                    match &token {
                        Some(token) => request.query(&[("pageToken", token)]),
                        None => request,
                    }
                })
                .await?;

            comments.extend(page.comments.into_iter().map(WireComment::into_comment));
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        comments.sort_by(|left, right| left.create_time.cmp(&right.create_time));
        Ok(comments)
    }

    /// The name is validated before its comments are fetched.
    async fn with_comments(&self, case: WireCase) -> Result<CaseRecord, TicketingError> {
        let resource_name = case.resource_name()?;
        let comments = self.list_comments(resource_name.as_str()).await?;
        case.into_record(comments)
    }
}

async fn send_once<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, TicketingError> {
    let response =
        request.send().await.map_err(|error| TicketingError::Transport(error.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(TicketingError::Api { status: status.as_u16(), message });
    }

    response.json::<T>().await.map_err(|error| TicketingError::Decode(error.to_string()))
}

#[async_trait]
impl TicketingApi for CloudSupportClient {
    async fn list_cases(&self, parent: &str) -> Result<Vec<CaseRecord>, TicketingError> {
        let mut wire_cases = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let path = format!("{parent}/cases");
            let token = page_token.clone();
            let page: CasePage = self
                .send_json("support.list_cases", || {
                    let request = self.request(Method::GET, &path);
                    match &token {
                        Some(token) => request.query(&[("pageToken", token)]),
                        None => request,
                    }
                })
                .await?;

            wire_cases.extend(page.cases);
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(
            event_name = "support.cases_listed",
            parent,
            count = wire_cases.len(),
            "listed cases"
        );

        // A case that cannot be loaded is skipped; the rest of the listing still counts.
        let mut cases = Vec::with_capacity(wire_cases.len());
        for case in wire_cases {
            let name = case.name.clone();
            match self.with_comments(case).await {
                Ok(record) => cases.push(record),
                Err(error) => warn!(
                    event_name = "support.case_skipped",
                    parent,
                    case = %name,
                    error = %error,
                    "skipping case that could not be loaded"
                ),
            }
        }
        Ok(cases)
    }

    async fn get_case(&self, name: &ResourceName) -> Result<CaseRecord, TicketingError> {
        let case: WireCase = self
            .send_json("support.get_case", || self.request(Method::GET, name.as_str()))
            .await?;
        self.with_comments(case).await
    }

    async fn create_case(
        &self,
        parent: &str,
        request: &NewCase,
    ) -> Result<CaseRecord, TicketingError> {
        let mut body = json!({
            "displayName": request.display_name,
            "description": request.description,
            "classification": { "id": request.classification_id },
            "priority": request.priority.as_str(),
            "testCase": request.test_case,
        });
        if let Some(time_zone) = &request.time_zone {
            body["timeZone"] = json!(time_zone);
        }
        if !request.subscriber_emails.is_empty() {
            body["subscriberEmailAddresses"] = json!(request.subscriber_emails);
        }

        let path = format!("{parent}/cases");
        let case: WireCase = self
            .send_json("support.create_case", || {
                self.request(Method::POST, &path).json(&body)
            })
            .await?;
        case.into_record(Vec::new())
    }

    async fn close_case(&self, name: &ResourceName) -> Result<(), TicketingError> {
        let path = format!("{name}:close");
        let _: Value = self
            .send_json("support.close_case", || self.request(Method::POST, &path).json(&json!({})))
            .await?;
        Ok(())
    }

    async fn escalate_case(
        &self,
        name: &ResourceName,
        reason: EscalationReason,
        justification: &str,
    ) -> Result<(), TicketingError> {
        let path = format!("{name}:escalate");
        let body = json!({
            "escalation": { "reason": reason.as_str(), "justification": justification }
        });
        let _: Value = self
            .send_json("support.escalate_case", || self.request(Method::POST, &path).json(&body))
            .await?;
        Ok(())
    }

    async fn add_comment(&self, name: &ResourceName, body: &str) -> Result<(), TicketingError> {
        let path = format!("{name}/comments");
        let payload = json!({ "body": body });
        let _: Value = self
            .send_json("support.add_comment", || self.request(Method::POST, &path).json(&payload))
            .await?;
        Ok(())
    }

    async fn change_priority(
        &self,
        name: &ResourceName,
        priority: CasePriority,
    ) -> Result<(), TicketingError> {
        let payload = json!({ "priority": priority.as_str() });
        let _: Value = self
            .send_json("support.change_priority", || {
                self.request(Method::PATCH, name.as_str())
                    .query(&[("updateMask", "priority")])
                    .json(&payload)
            })
            .await?;
        Ok(())
    }

    async fn subscribe_emails(
        &self,
        name: &ResourceName,
        emails: &[String],
    ) -> Result<(), TicketingError> {
        let payload = json!({ "subscriberEmailAddresses": emails });
        let _: Value = self
            .send_json("support.subscribe_emails", || {
                self.request(Method::PATCH, name.as_str())
                    .query(&[("updateMask", "subscriberEmailAddresses")])
                    .json(&payload)
            })
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CasePage {
    #[serde(default)]
    cases: Vec<WireCase>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentPage {
    #[serde(default)]
    comments: Vec<WireComment>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireActor {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    google_support: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCase {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    escalated: bool,
    #[serde(default)]
    creator: WireActor,
    #[serde(default)]
    create_time: String,
    #[serde(default)]
    update_time: String,
    priority: Option<String>,
    state: Option<String>,
}

fn decode(error: DomainError) -> TicketingError {
    TicketingError::Decode(error.to_string())
}

impl WireCase {
    fn resource_name(&self) -> Result<ResourceName, TicketingError> {
        ResourceName::parse(&self.name).map_err(decode)
    }

    fn into_record(self, comments: Vec<CaseComment>) -> Result<CaseRecord, TicketingError> {
        let resource_name = self.resource_name()?;
        let priority = match self.priority.as_deref() {
            Some(value) => CasePriority::parse(value).map_err(decode)?,
            None => CasePriority::P4,
        };
        let state = match self.state.as_deref() {
            Some(value) => CaseState::parse(value).map_err(decode)?,
            None => CaseState::Unspecified,
        };

        Ok(CaseRecord {
            case_number: resource_name.case_number(),
            resource_name,
            title: self.display_name,
            description: self.description,
            escalated: self.escalated,
            creator: self.creator.display_name,
            create_time: self.create_time,
            update_time: self.update_time,
            priority,
            state,
            comments,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    #[serde(default)]
    name: String,
    #[serde(default)]
    create_time: String,
    #[serde(default)]
    creator: WireActor,
    #[serde(default)]
    body: String,
}

impl WireComment {
    fn into_comment(self) -> CaseComment {
        CaseComment {
            name: self.name,
            create_time: self.create_time,
            creator: self.creator.display_name,
            google_support: self.creator.google_support,
            body: self.body,
        }
    }
}
