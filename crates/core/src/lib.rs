pub mod config;
pub mod domain;
pub mod errors;
pub mod retry;

pub use domain::case::{
    CaseComment, CaseNumber, CasePriority, CaseRecord, CaseState, EscalationReason, ParentScope,
    ResourceName,
};
pub use domain::registration::{
    canonical_cases, select_first_in, FirstInSelection, Guid, NewRegistration, RegistrationEntry,
    CASES_COLLECTION,
};
pub use domain::tracking::TrackedCase;
pub use domain::updates::{detect_updates, CaseUpdate};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use retry::RetryPolicy;
