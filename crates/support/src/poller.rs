//! Periodic diff of the ticketing API against the registration log.
//!
//! Any number of pollers may watch the same parent. Each one registers what it observed
//! and only the first-in writer of an update cycle posts to the tracking channels.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use casebot_core::domain::case::{CaseNumber, CaseRecord};
use casebot_core::domain::tracking::TrackedCase;
use casebot_core::domain::updates::{detect_updates, CaseUpdate};
use casebot_db::repositories::{RepositoryError, TrackedCaseRepository};
use casebot_db::{CaseDirectory, FirstInResolver, NotifyDecision, RegistrationGuard};
use casebot_slack::messages;
use casebot_slack::ChatNotifier;

use crate::api::{TicketingApi, TicketingError};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("listing cases failed: {0}")]
    Ticketing(#[from] TicketingError),
    #[error("loading stored case snapshots failed: {0}")]
    Repository(#[from] RepositoryError),
}

/// Counters for one pass over the parent's cases.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub observed: usize,
    pub unchanged: usize,
    pub registered: usize,
    pub notifications_sent: usize,
    pub skipped: usize,
    pub closed: usize,
    pub failures: usize,
}

pub struct CaseUpdatePoller {
    api: Arc<dyn TicketingApi>,
    notifier: Arc<dyn ChatNotifier>,
    guard: RegistrationGuard,
    resolver: FirstInResolver,
    directory: CaseDirectory,
    tracked: Arc<dyn TrackedCaseRepository>,
    parent: String,
}

impl CaseUpdatePoller {
    pub fn new(
        api: Arc<dyn TicketingApi>,
        notifier: Arc<dyn ChatNotifier>,
        guard: RegistrationGuard,
        resolver: FirstInResolver,
        directory: CaseDirectory,
        tracked: Arc<dyn TrackedCaseRepository>,
        parent: impl Into<String>,
    ) -> Self {
        Self { api, notifier, guard, resolver, directory, tracked, parent: parent.into() }
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// One polling pass. Only listing cases and loading snapshots abort the pass; per-case
    /// failures are logged and counted.
    pub async fn tick(&self) -> Result<PollSummary, PollError> {
        let observed = self.api.list_cases(&self.parent).await?;
        let mut snapshots = self
            .directory
            .canonical_cases()
            .await?
            .into_iter()
            .map(|entry| (entry.case_number, entry.record))
            .collect::<HashMap<_, _>>();

        let mut summary = PollSummary { observed: observed.len(), ..PollSummary::default() };
        for current in observed {
            let previous = snapshots.remove(&current.case_number);
            self.process(previous, current, &mut summary).await;
        }

        debug!(
            event_name = "poller.tick_completed",
            parent = %self.parent,
            observed = summary.observed,
            registered = summary.registered,
            notifications_sent = summary.notifications_sent,
            failures = summary.failures,
            "poll pass completed"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        previous: Option<CaseRecord>,
        current: CaseRecord,
        summary: &mut PollSummary,
    ) {
        let updates = match &previous {
            Some(previous) if previous.update_time == current.update_time => {
                summary.unchanged += 1;
                return;
            }
            Some(previous) => detect_updates(previous, &current),
            // Closed before it was ever seen; nothing to announce or keep.
            None if current.state.is_closed() => {
                summary.unchanged += 1;
                return;
            }
            None => Vec::new(),
        };

        let case_number = current.case_number.clone();
        let update_time = current.update_time.clone();
        let guid = match self.guard.register(current.clone()).await {
            Ok(guid) => guid,
            Err(error) => {
                summary.failures += 1;
                warn!(
                    event_name = "poller.registration_failed",
                    case_number = %case_number,
                    error = %error,
                    "could not register observed case"
                );
                return;
            }
        };
        summary.registered += 1;

        if updates.is_empty() {
            return;
        }

        match self.resolver.decide(&case_number, &update_time, &guid).await {
            NotifyDecision::Notify => {}
            NotifyDecision::Skip(_) => {
                summary.skipped += 1;
                return;
            }
        }

        let channels = match self.tracked.channels_for_case(&case_number).await {
            Ok(channels) => channels,
            Err(error) => {
                summary.failures += 1;
                warn!(
                    event_name = "poller.channels_unavailable",
                    case_number = %case_number,
                    error = %error,
                    "could not load tracking channels"
                );
                Vec::new()
            }
        };

        for update in &updates {
            let notice = messages::case_update_notice(&current, update);
            for channel in &channels {
                match self.notifier.post_message(&channel.channel_id, &notice).await {
                    Ok(()) => summary.notifications_sent += 1,
                    Err(error) => {
                        summary.failures += 1;
                        warn!(
                            event_name = "poller.notify_failed",
                            case_number = %case_number,
                            channel_id = %channel.channel_id,
                            update = update.kind(),
                            error = %error,
                            "could not post case update"
                        );
                    }
                }
            }
        }

        if updates.contains(&CaseUpdate::Closed) {
            self.retire(&case_number, &channels, summary).await;
        }
    }

    /// Drops every tracking row and then every registration for a case that has closed.
    async fn retire(
        &self,
        case_number: &CaseNumber,
        channels: &[TrackedCase],
        summary: &mut PollSummary,
    ) {
        summary.closed += 1;
        for channel in channels {
            if let Err(error) = self.tracked.untrack(case_number, &channel.channel_id).await {
                summary.failures += 1;
                warn!(
                    event_name = "poller.untrack_failed",
                    case_number = %case_number,
                    channel_id = %channel.channel_id,
                    error = %error,
                    "could not stop tracking closed case"
                );
            }
        }

        // Registrations go last. A late writer that lands after `forget` wins its cycle
        // but finds no channel left to notify.
        if let Err(error) = self.directory.forget(case_number).await {
            summary.failures += 1;
            warn!(
                event_name = "poller.forget_failed",
                case_number = %case_number,
                error = %error,
                "could not delete registrations for closed case"
            );
        }

        info!(
            event_name = "poller.case_retired",
            case_number = %case_number,
            channels = channels.len(),
            "closed case retired"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use casebot_core::domain::case::{CaseComment, CaseNumber, CaseRecord, CaseState};
    use casebot_core::domain::registration::{Guid, NewRegistration, RegistrationEntry};
    use casebot_core::domain::tracking::TrackedCase;
    use casebot_core::retry::RetryPolicy;
    use casebot_db::repositories::{
        InMemoryRegistrationRepository, InMemoryTrackedCaseRepository, RegistrationRepository,
        RepositoryError, TrackedCaseRepository,
    };
    use casebot_db::{CaseDirectory, FirstInResolver, RegistrationGuard};
    use casebot_slack::{ChatNotifier, RecordingNotifier};
    use tokio::sync::Notify;

    use super::{CaseUpdatePoller, PollError};
    use crate::api::{TicketingApi, TicketingError};
    use crate::test_support::{record, FakeTicketing};

    struct Shared {
        api: Arc<FakeTicketing>,
        notifier: Arc<RecordingNotifier>,
        registrations: Arc<InMemoryRegistrationRepository>,
        tracked: Arc<InMemoryTrackedCaseRepository>,
    }

    impl Shared {
        fn new(api: FakeTicketing) -> Self {
            Self {
                api: Arc::new(api),
                notifier: Arc::new(RecordingNotifier::default()),
                registrations: Arc::new(InMemoryRegistrationRepository::default()),
                tracked: Arc::new(InMemoryTrackedCaseRepository::default()),
            }
        }

        fn poller(&self) -> CaseUpdatePoller {
            self.poller_over(self.registrations.clone())
        }

        fn poller_over(&self, log: Arc<dyn RegistrationRepository>) -> CaseUpdatePoller {
            let api: Arc<dyn TicketingApi> = self.api.clone();
            let notifier: Arc<dyn ChatNotifier> = self.notifier.clone();
            let tracked: Arc<dyn TrackedCaseRepository> = self.tracked.clone();
            CaseUpdatePoller::new(
                api,
                notifier,
                RegistrationGuard::new(log.clone()),
                FirstInResolver::new(log.clone()).with_retry_policy(RetryPolicy::immediate(3)),
                CaseDirectory::new(log),
                tracked,
                "projects/100",
            )
        }

        async fn track(&self, case_number: &str, channel_id: &str) {
            self.tracked
                .track(TrackedCase::new(CaseNumber(case_number.to_string()), channel_id, "ops"))
                .await
                .expect("track");
        }
    }

    /// Registration log that lets a test order one poller's store calls against another's.
    struct Choreographed {
        inner: Arc<InMemoryRegistrationRepository>,
        hold_writes: Option<(Arc<Notify>, Arc<Notify>)>,
        after_delete: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl Choreographed {
        fn new(inner: Arc<InMemoryRegistrationRepository>) -> Self {
            Self { inner, hold_writes: None, after_delete: None }
        }
    }

    #[async_trait]
    impl RegistrationRepository for Choreographed {
        async fn write(
            &self,
            collection: &str,
            registration: NewRegistration,
        ) -> Result<Guid, RepositoryError> {
            if let Some((entered, release)) = &self.hold_writes {
                entered.notify_one();
                release.notified().await;
            }
            self.inner.write(collection, registration).await
        }

        async fn query(
            &self,
            case_number: &CaseNumber,
            update_time: &str,
        ) -> Result<Vec<RegistrationEntry>, RepositoryError> {
            self.inner.query(case_number, update_time).await
        }

        async fn list_for_case(
            &self,
            case_number: &CaseNumber,
        ) -> Result<Vec<RegistrationEntry>, RepositoryError> {
            self.inner.list_for_case(case_number).await
        }

        async fn list_all(&self) -> Result<Vec<RegistrationEntry>, RepositoryError> {
            self.inner.list_all().await
        }

        async fn delete_all(&self, case_number: &CaseNumber) -> Result<u64, RepositoryError> {
            let deleted = self.inner.delete_all(case_number).await?;
            if let Some((release, finished)) = &self.after_delete {
                release.notify_one();
                finished.notified().await;
            }
            Ok(deleted)
        }
    }

    fn commented(case_number: &str, update_time: &str) -> CaseRecord {
        let mut case = record(case_number, update_time);
        case.comments.push(CaseComment {
            name: format!("projects/100/cases/{case_number}/comments/1"),
            create_time: update_time.to_string(),
            creator: "Support Engineer".to_string(),
            google_support: true,
            body: "We are looking into it.".to_string(),
        });
        case
    }

    #[tokio::test]
    async fn first_sighting_is_registered_silently() {
        let shared = Shared::new(FakeTicketing::with_cases(vec![record("111", "T1")]));
        shared.track("111", "C01").await;

        let summary = shared.poller().tick().await.expect("tick");

        assert_eq!(summary.observed, 1);
        assert_eq!(summary.registered, 1);
        assert_eq!(summary.notifications_sent, 0);
        assert!(shared.notifier.posted().await.is_empty());
    }

    #[tokio::test]
    async fn unchanged_case_is_not_registered_again() {
        let shared = Shared::new(FakeTicketing::with_cases(vec![record("111", "T1")]));
        let poller = shared.poller();

        poller.tick().await.expect("first tick");
        let summary = poller.tick().await.expect("second tick");

        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.registered, 0);
        assert_eq!(shared.registrations.len().await, 1);
    }

    #[tokio::test]
    async fn new_comment_is_posted_to_every_tracking_channel() {
        let shared = Shared::new(FakeTicketing::with_cases(vec![record("111", "T1")]));
        shared.track("111", "C01").await;
        shared.track("111", "C02").await;
        let poller = shared.poller();
        poller.tick().await.expect("first tick");

        shared.api.set_cases(vec![commented("111", "T2")]).await;
        let summary = poller.tick().await.expect("second tick");

        assert_eq!(summary.notifications_sent, 2);
        let posted = shared.notifier.posted().await;
        let mut channels = posted.iter().map(|post| post.channel_id.as_str()).collect::<Vec<_>>();
        channels.sort_unstable();
        assert_eq!(channels, vec!["C01", "C02"]);
        assert_eq!(
            posted[0].text,
            "Case 111 has a new comment from Support Engineer:\nWe are looking into it."
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_pollers_announce_an_update_once() {
        let shared = Shared::new(FakeTicketing::with_cases(vec![record("111", "T1")]));
        shared.track("111", "C01").await;
        shared.poller().tick().await.expect("seed tick");
        shared.api.set_cases(vec![commented("111", "T2")]).await;

        let pollers = (0..4).map(|_| shared.poller()).collect::<Vec<_>>();
        let mut handles = Vec::new();
        for poller in pollers {
            handles.push(tokio::spawn(async move { poller.tick().await }));
        }
        for handle in handles {
            handle.await.expect("join").expect("tick");
        }

        assert_eq!(shared.notifier.posted().await.len(), 1);
    }

    #[tokio::test]
    async fn closed_case_is_announced_then_forgotten() {
        let shared = Shared::new(FakeTicketing::with_cases(vec![record("111", "T1")]));
        shared.track("111", "C01").await;
        let poller = shared.poller();
        poller.tick().await.expect("first tick");

        let mut closed = record("111", "T2");
        closed.state = CaseState::Closed;
        shared.api.set_cases(vec![closed]).await;
        let summary = poller.tick().await.expect("closing tick");

        assert_eq!(summary.closed, 1);
        assert_eq!(shared.notifier.texts().await, vec!["Case 111 has been closed"]);
        assert!(shared.registrations.is_empty().await);
        assert!(shared.tracked.list_all().await.expect("list").is_empty());

        let after = poller.tick().await.expect("tick after close");
        assert_eq!(after.registered, 0);
        assert!(shared.registrations.is_empty().await);
    }

    #[tokio::test]
    async fn late_writer_after_retirement_does_not_repeat_close_notice() {
        let shared = Shared::new(FakeTicketing::with_cases(vec![record("111", "T1")]));
        shared.track("111", "C01").await;
        shared.poller().tick().await.expect("seed tick");

        let mut closed = record("111", "T2");
        closed.state = CaseState::Closed;
        shared.api.set_cases(vec![closed]).await;

        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let late_finished = Arc::new(Notify::new());

        // The late poller has read the open snapshot and is stuck before its write.
        let late = shared.poller_over(Arc::new(Choreographed {
            hold_writes: Some((entered.clone(), release.clone())),
            ..Choreographed::new(shared.registrations.clone())
        }));
        let late_task = {
            let late_finished = late_finished.clone();
            tokio::spawn(async move {
                let summary = late.tick().await;
                late_finished.notify_one();
                summary
            })
        };
        entered.notified().await;

        // The winner releases the late write right after deleting registrations and
        // waits for that poller to finish before returning from the delete.
        let winner = shared.poller_over(Arc::new(Choreographed {
            after_delete: Some((release, late_finished)),
            ..Choreographed::new(shared.registrations.clone())
        }));
        let winner_task = tokio::spawn(async move { winner.tick().await });

        let late_summary = late_task.await.expect("join late").expect("late tick");
        let winner_summary = winner_task.await.expect("join winner").expect("winner tick");

        assert_eq!(winner_summary.notifications_sent, 1);
        assert_eq!(late_summary.notifications_sent, 0);
        assert_eq!(shared.notifier.texts().await, vec!["Case 111 has been closed"]);
        assert!(shared.tracked.list_all().await.expect("list").is_empty());
        assert!(shared.registrations.is_empty().await);
    }

    #[tokio::test]
    async fn listing_failure_aborts_the_pass() {
        let shared = Shared::new(FakeTicketing::failing(TicketingError::Transport(
            "connection refused".to_string(),
        )));

        let error = shared.poller().tick().await.expect_err("listing fails");
        assert!(matches!(error, PollError::Ticketing(TicketingError::Transport(_))));
    }
}
