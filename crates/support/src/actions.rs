//! User-initiated case actions.
//!
//! Every API-backed action acknowledges the request ephemerally, resolves the case's
//! resource name from the registration log and reports the outcome back to the user who
//! asked. Replies are best-effort: a failed post is logged and never changes the outcome.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use casebot_core::domain::case::{CaseNumber, CasePriority, EscalationReason, ResourceName};
use casebot_core::domain::tracking::TrackedCase;
use casebot_core::errors::ApplicationError;
use casebot_db::repositories::TrackedCaseRepository;
use casebot_db::{CaseDirectory, RegistrationGuard};
use casebot_slack::messages;
use casebot_slack::{ChatNotifier, MessageTemplate};

use crate::api::{NewCase, TicketingApi, TicketingError};

const SIGNATURE_SUFFIX: &str = "via Google Cloud Support Slack bot";

/// Who asked, and where to answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionContext {
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    /// Carried into every log line for the request.
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    CaseNotFound,
    /// The request was refused before reaching the ticketing API.
    Rejected,
    Failed,
}

pub struct CaseActions {
    api: Arc<dyn TicketingApi>,
    notifier: Arc<dyn ChatNotifier>,
    directory: CaseDirectory,
    guard: RegistrationGuard,
    tracked: Arc<dyn TrackedCaseRepository>,
    parent: String,
}

impl CaseActions {
    pub fn new(
        api: Arc<dyn TicketingApi>,
        notifier: Arc<dyn ChatNotifier>,
        directory: CaseDirectory,
        guard: RegistrationGuard,
        tracked: Arc<dyn TrackedCaseRepository>,
        parent: impl Into<String>,
    ) -> Self {
        Self { api, notifier, directory, guard, tracked, parent: parent.into() }
    }

    pub async fn close(&self, context: &ActionContext, case_number: &CaseNumber) -> ActionOutcome {
        let api = &self.api;
        self.run_case_action(
            context,
            case_number,
            "close",
            format!("You closed case {case_number}"),
            "Your case may not have closed. Please try again later.",
            |name| async move { api.close_case(&name).await },
        )
        .await
    }

    pub async fn escalate(
        &self,
        context: &ActionContext,
        case_number: &CaseNumber,
        reason: EscalationReason,
        justification: &str,
    ) -> ActionOutcome {
        let api = &self.api;
        let signed = sign(justification, &context.user_name);
        self.run_case_action(
            context,
            case_number,
            "escalate",
            format!("You have escalated case {case_number}"),
            "Your attempt to escalate may have failed. Please contact your account team or \
             try again later.",
            |name| async move { api.escalate_case(&name, reason, &signed).await },
        )
        .await
    }

    pub async fn comment(
        &self,
        context: &ActionContext,
        case_number: &CaseNumber,
        body: &str,
    ) -> ActionOutcome {
        let api = &self.api;
        let signed = sign(body, &context.user_name);
        self.run_case_action(
            context,
            case_number,
            "comment",
            format!("Your comment has been added to case {case_number}"),
            "Your comment may not have posted. Please try again later.",
            |name| async move { api.add_comment(&name, &signed).await },
        )
        .await
    }

    /// Only P1 through P4 can be requested; P0 is reserved for the support side.
    pub async fn change_priority(
        &self,
        context: &ActionContext,
        case_number: &CaseNumber,
        priority: CasePriority,
    ) -> ActionOutcome {
        if priority == CasePriority::P0 {
            self.reply(
                context,
                MessageTemplate::text("Case priority can only be changed to P1, P2, P3 or P4."),
            )
            .await;
            return ActionOutcome::Rejected;
        }

        let api = &self.api;
        self.run_case_action(
            context,
            case_number,
            "change_priority",
            format!("You have changed the priority of case {case_number} to {priority}"),
            "Your attempt to change the case priority may have failed. Please try again later.",
            |name| async move { api.change_priority(&name, priority).await },
        )
        .await
    }

    pub async fn subscribe(
        &self,
        context: &ActionContext,
        case_number: &CaseNumber,
        emails: &[String],
    ) -> ActionOutcome {
        if emails.is_empty() {
            self.reply(context, MessageTemplate::text("Provide at least one email address."))
                .await;
            return ActionOutcome::Rejected;
        }

        let api = &self.api;
        self.run_case_action(
            context,
            case_number,
            "subscribe",
            format!("You have subscribed {} to case {case_number}", emails.join(", ")),
            "Your attempt to subscribe emails may have failed. Please try again later.",
            |name| async move { api.subscribe_emails(&name, emails).await },
        )
        .await
    }

    /// Opens a case under the configured parent and registers it, so later actions can
    /// address it before the poller has seen it.
    pub async fn create(&self, context: &ActionContext, request: &NewCase) -> Option<CaseNumber> {
        self.reply(context, messages::processing()).await;

        let created = match self.api.create_case(&self.parent, request).await {
            Ok(created) => created,
            Err(error) => {
                self.log_failure("create", None, context, &error);
                self.reply(
                    context,
                    MessageTemplate::text(
                        "Your case may not have been created. Please try again later.",
                    ),
                )
                .await;
                return None;
            }
        };

        let case_number = created.case_number.clone();
        if let Err(error) = self.guard.register(created).await {
            warn!(
                event_name = "case_action.registration_failed",
                case_number = %case_number,
                error = %error,
                "created case could not be registered; the poller will pick it up"
            );
        }

        info!(
            event_name = "case_action.completed",
            action = "create",
            case_number = %case_number,
            user_id = %context.user_id,
            correlation_id = %context.correlation_id,
            "case action completed"
        );
        self.reply(context, MessageTemplate::text(format!("You have created case {case_number}")))
            .await;
        Some(case_number)
    }

    pub async fn track(&self, context: &ActionContext, case_number: &CaseNumber) -> ActionOutcome {
        match self.directory.resource_name(case_number).await {
            Ok(_) => {}
            Err(ApplicationError::CaseNotFound(_)) => {
                self.reply(context, messages::case_not_found(case_number)).await;
                return ActionOutcome::CaseNotFound;
            }
            Err(error) => {
                let surfaced = error.into_interface(context.correlation_id.clone());
                self.log_failure("track", Some(case_number), context, &surfaced);
                self.reply(context, MessageTemplate::text(surfaced.user_message())).await;
                return ActionOutcome::Failed;
            }
        }

        let tracked = TrackedCase::new(
            case_number.clone(),
            context.channel_id.clone(),
            context.channel_name.clone(),
        );
        match self.tracked.track(tracked).await {
            Ok(true) => {
                info!(
                    event_name = "tracking.started",
                    case_number = %case_number,
                    channel_id = %context.channel_id,
                    "channel now tracks case"
                );
                self.reply(context, messages::tracking_started(case_number, &context.channel_name))
                    .await;
                ActionOutcome::Completed
            }
            Ok(false) => {
                self.reply(context, messages::already_tracking(case_number, &context.channel_name))
                    .await;
                ActionOutcome::Completed
            }
            Err(error) => {
                self.log_failure("track", Some(case_number), context, &error);
                self.reply(context, tracking_unavailable()).await;
                ActionOutcome::Failed
            }
        }
    }

    pub async fn untrack(
        &self,
        context: &ActionContext,
        case_number: &CaseNumber,
    ) -> ActionOutcome {
        match self.tracked.untrack(case_number, &context.channel_id).await {
            Ok(true) => {
                info!(
                    event_name = "tracking.stopped",
                    case_number = %case_number,
                    channel_id = %context.channel_id,
                    "channel stopped tracking case"
                );
                self.reply(context, messages::tracking_stopped(case_number, &context.channel_name))
                    .await;
                ActionOutcome::Completed
            }
            Ok(false) => {
                self.reply(context, messages::not_tracking(case_number, &context.channel_name))
                    .await;
                ActionOutcome::Completed
            }
            Err(error) => {
                self.log_failure("untrack", Some(case_number), context, &error);
                self.reply(context, tracking_unavailable()).await;
                ActionOutcome::Failed
            }
        }
    }

    pub async fn list_tracked(&self, context: &ActionContext) -> ActionOutcome {
        match self.tracked.list_for_channel(&context.channel_id).await {
            Ok(tracked) => {
                self.reply(context, messages::tracked_cases(&context.channel_name, &tracked))
                    .await;
                ActionOutcome::Completed
            }
            Err(error) => {
                self.log_failure("list_tracked", None, context, &error);
                self.reply(context, tracking_unavailable()).await;
                ActionOutcome::Failed
            }
        }
    }

    /// Posts the situation report to the whole channel.
    pub async fn sitrep(&self, context: &ActionContext) -> ActionOutcome {
        let cases = match self.directory.canonical_cases().await {
            Ok(entries) => entries.into_iter().map(|entry| entry.record).collect::<Vec<_>>(),
            Err(error) => {
                self.log_failure("sitrep", None, context, &error);
                self.reply(
                    context,
                    MessageTemplate::text("The sitrep could not be built. Please try again later."),
                )
                .await;
                return ActionOutcome::Failed;
            }
        };

        match self.notifier.post_message(&context.channel_id, &messages::sitrep(&cases)).await {
            Ok(()) => ActionOutcome::Completed,
            Err(error) => {
                self.log_failure("sitrep", None, context, &error);
                ActionOutcome::Failed
            }
        }
    }

    async fn run_case_action<F, Fut>(
        &self,
        context: &ActionContext,
        case_number: &CaseNumber,
        action: &'static str,
        success: String,
        failure: &str,
        call: F,
    ) -> ActionOutcome
    where
        F: FnOnce(ResourceName) -> Fut,
        Fut: Future<Output = Result<(), TicketingError>>,
    {
        self.reply(context, messages::processing()).await;

        let name = match self.directory.resource_name(case_number).await {
            Ok(name) => name,
            Err(ApplicationError::CaseNotFound(_)) => {
                self.reply(context, messages::case_not_found(case_number)).await;
                return ActionOutcome::CaseNotFound;
            }
            Err(error) => {
                let surfaced = error.into_interface(context.correlation_id.clone());
                self.log_failure(action, Some(case_number), context, &surfaced);
                self.reply(context, MessageTemplate::text(failure)).await;
                return ActionOutcome::Failed;
            }
        };

        match call(name).await {
            Ok(()) => {
                info!(
                    event_name = "case_action.completed",
                    action,
                    case_number = %case_number,
                    user_id = %context.user_id,
                    correlation_id = %context.correlation_id,
                    "case action completed"
                );
                self.reply(context, MessageTemplate::text(success)).await;
                ActionOutcome::Completed
            }
            Err(error) => {
                self.log_failure(action, Some(case_number), context, &error);
                self.reply(context, MessageTemplate::text(failure)).await;
                ActionOutcome::Failed
            }
        }
    }

    async fn reply(&self, context: &ActionContext, message: MessageTemplate) {
        if let Err(error) =
            self.notifier.post_ephemeral(&context.channel_id, &context.user_id, &message).await
        {
            warn!(
                event_name = "case_action.reply_failed",
                channel_id = %context.channel_id,
                user_id = %context.user_id,
                error = %error,
                "could not deliver ephemeral reply"
            );
        }
    }

    fn log_failure(
        &self,
        action: &'static str,
        case_number: Option<&CaseNumber>,
        context: &ActionContext,
        error: &dyn std::fmt::Display,
    ) {
        warn!(
            event_name = "case_action.failed",
            action,
            case_number = case_number.map(CaseNumber::as_str).unwrap_or("-"),
            user_id = %context.user_id,
            correlation_id = %context.correlation_id,
            error = %error,
            "case action failed"
        );
    }
}

fn sign(text: &str, user_name: &str) -> String {
    format!("{text}\n *Sent by {user_name} {SIGNATURE_SUFFIX}")
}

fn tracking_unavailable() -> MessageTemplate {
    MessageTemplate::text("Case tracking could not be updated. Please try again later.")
}
