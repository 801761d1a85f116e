use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseNumber(pub String);

impl CaseNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentScope {
    Projects,
    Organizations,
}

impl ParentScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Organizations => "organizations",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "projects" => Some(Self::Projects),
            "organizations" => Some(Self::Organizations),
            _ => None,
        }
    }
}

/// Fully-qualified case path: `{projects|organizations}/{num}/cases/{case}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(scope: ParentScope, parent_id: &str, case_number: &CaseNumber) -> Self {
        Self(format!("{}/{parent_id}/cases/{case_number}", scope.as_str()))
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let segments = value.trim().split('/').collect::<Vec<_>>();
        let valid = segments.len() == 4
            && ParentScope::parse(segments[0]).is_some()
            && !segments[1].is_empty()
            && segments[2] == "cases"
            && !segments[3].is_empty();

        if valid {
            Ok(Self(segments.join("/")))
        } else {
            Err(DomainError::InvalidResourceName(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `{projects|organizations}/{num}` prefix that owns the case.
    pub fn parent(&self) -> &str {
        match self.0.find("/cases/") {
            Some(index) => &self.0[..index],
            None => &self.0,
        }
    }

    pub fn case_number(&self) -> CaseNumber {
        CaseNumber(self.0.rsplit('/').next().unwrap_or_default().to_string())
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceName> for String {
    fn from(value: ResourceName) -> Self {
        value.0
    }
}

/// Validates a parent path such as `organizations/1234`.
pub fn parse_parent(value: &str) -> Result<(ParentScope, String), DomainError> {
    let mut parts = value.trim().split('/');
    match (parts.next().and_then(ParentScope::parse), parts.next(), parts.next()) {
        (Some(scope), Some(id), None) if !id.is_empty() => Ok((scope, id.to_string())),
        _ => Err(DomainError::InvalidParent(value.to_string())),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CasePriority {
    P0,
    P1,
    P2,
    P3,
    P4,
}

impl CasePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
            Self::P4 => "P4",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "P0" => Ok(Self::P0),
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            "P3" => Ok(Self::P3),
            "P4" => Ok(Self::P4),
            _ => Err(DomainError::InvalidPriority(value.to_string())),
        }
    }
}

impl fmt::Display for CasePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle owned by the ticketing API; mirrored here, never transitioned locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseState {
    #[serde(rename = "STATE_UNSPECIFIED")]
    Unspecified,
    New,
    Assigned,
    InProgressGoogleSupport,
    ActionRequired,
    SolutionProvided,
    Closed,
}

impl CaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "STATE_UNSPECIFIED",
            Self::New => "NEW",
            Self::Assigned => "ASSIGNED",
            Self::InProgressGoogleSupport => "IN_PROGRESS_GOOGLE_SUPPORT",
            Self::ActionRequired => "ACTION_REQUIRED",
            Self::SolutionProvided => "SOLUTION_PROVIDED",
            Self::Closed => "CLOSED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "STATE_UNSPECIFIED" => Ok(Self::Unspecified),
            "NEW" => Ok(Self::New),
            "ASSIGNED" => Ok(Self::Assigned),
            "IN_PROGRESS_GOOGLE_SUPPORT" => Ok(Self::InProgressGoogleSupport),
            "ACTION_REQUIRED" => Ok(Self::ActionRequired),
            "SOLUTION_PROVIDED" => Ok(Self::SolutionProvided),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(DomainError::InvalidState(value.to_string())),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationReason {
    ResolutionTime,
    TechnicalExpertise,
    BusinessImpact,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolutionTime => "RESOLUTION_TIME",
            Self::TechnicalExpertise => "TECHNICAL_EXPERTISE",
            Self::BusinessImpact => "BUSINESS_IMPACT",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "RESOLUTION_TIME" => Ok(Self::ResolutionTime),
            "TECHNICAL_EXPERTISE" => Ok(Self::TechnicalExpertise),
            "BUSINESS_IMPACT" => Ok(Self::BusinessImpact),
            _ => Err(DomainError::InvalidEscalationReason(value.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseComment {
    pub name: String,
    pub create_time: String,
    pub creator: String,
    pub google_support: bool,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_number: CaseNumber,
    pub resource_name: ResourceName,
    pub title: String,
    pub description: String,
    pub escalated: bool,
    pub creator: String,
    pub create_time: String,
    pub update_time: String,
    pub priority: CasePriority,
    pub state: CaseState,
    pub comments: Vec<CaseComment>,
}

#[cfg(test)]
mod tests {
    use super::{
        parse_parent, CaseNumber, CasePriority, CaseState, EscalationReason, ParentScope,
        ResourceName,
    };
    use crate::errors::DomainError;

    #[test]
    fn resource_name_accepts_project_and_organization_paths() {
        let project = ResourceName::parse("projects/12345/cases/67890").expect("project path");
        assert_eq!(project.parent(), "projects/12345");
        assert_eq!(project.case_number(), CaseNumber("67890".to_string()));

        let org = ResourceName::parse("organizations/42/cases/7").expect("org path");
        assert_eq!(org.parent(), "organizations/42");
        assert_eq!(org.case_number().as_str(), "7");
    }

    #[test]
    fn resource_name_rejects_malformed_paths() {
        let malformed = [
            "",
            "projects/1/cases",
            "folders/1/cases/2",
            "projects//cases/2",
            "projects/1/tickets/2",
        ];
        for raw in malformed {
            let error = ResourceName::parse(raw).expect_err("malformed path should fail");
            assert!(matches!(error, DomainError::InvalidResourceName(_)), "{raw}");
        }
    }

    #[test]
    fn resource_name_builds_from_parts() {
        let name =
            ResourceName::new(ParentScope::Organizations, "99", &CaseNumber("123".to_string()));
        assert_eq!(name.as_str(), "organizations/99/cases/123");
    }

    #[test]
    fn resource_name_deserialization_validates() {
        let parsed: Result<ResourceName, _> = serde_json::from_str("\"projects/1/cases/2\"");
        assert!(parsed.is_ok());

        let rejected: Result<ResourceName, _> = serde_json::from_str("\"cases/2\"");
        assert!(rejected.is_err());
    }

    #[test]
    fn parent_parsing_requires_scope_and_id() {
        assert_eq!(
            parse_parent("organizations/1234").expect("valid parent"),
            (ParentScope::Organizations, "1234".to_string())
        );
        assert!(parse_parent("organizations/").is_err());
        assert!(parse_parent("projects/1/cases/2").is_err());
    }

    #[test]
    fn priority_and_state_parse_api_encodings() {
        assert_eq!(CasePriority::parse("p3").expect("p3"), CasePriority::P3);
        assert!(CasePriority::parse("P5").is_err());
        assert_eq!(
            CaseState::parse("IN_PROGRESS_GOOGLE_SUPPORT").expect("state"),
            CaseState::InProgressGoogleSupport
        );
        assert!(CaseState::Closed.is_closed());
        assert_eq!(
            serde_json::to_string(&CaseState::Unspecified).expect("serialize"),
            "\"STATE_UNSPECIFIED\""
        );
    }

    #[test]
    fn escalation_reason_accepts_dashed_input() {
        assert_eq!(
            EscalationReason::parse("business-impact").expect("reason"),
            EscalationReason::BusinessImpact
        );
        assert!(EscalationReason::parse("impatience").is_err());
    }
}
