//! Cloud Support integration: the ticketing API seam, the REST client behind it, the
//! user-facing case actions and the case update poller.

pub mod actions;
pub mod api;
pub mod client;
pub mod poller;

#[cfg(test)]
pub(crate) mod test_support;

pub use actions::{ActionContext, ActionOutcome, CaseActions};
pub use api::{NewCase, TicketingApi, TicketingError};
pub use client::CloudSupportClient;
pub use poller::{CaseUpdatePoller, PollError, PollSummary};
