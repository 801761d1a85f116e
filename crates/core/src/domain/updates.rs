use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::case::{CasePriority, CaseRecord};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseUpdate {
    Comment { author: String, body: String },
    Priority { from: CasePriority, to: CasePriority },
    Escalated,
    Deescalated,
    Closed,
}

impl CaseUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Comment { .. } => "comment",
            Self::Priority { .. } => "priority",
            Self::Escalated => "escalated",
            Self::Deescalated => "de-escalated",
            Self::Closed => "closed",
        }
    }
}

/// Differences between the stored snapshot and the freshly observed case, in the order
/// they should be announced. Closing is always last.
pub fn detect_updates(previous: &CaseRecord, current: &CaseRecord) -> Vec<CaseUpdate> {
    let mut updates = Vec::new();

    let seen = previous.comments.iter().map(|comment| comment.name.as_str()).collect::<HashSet<_>>();
    updates.extend(
        current.comments.iter().filter(|comment| !seen.contains(comment.name.as_str())).map(
            |comment| CaseUpdate::Comment {
                author: comment.creator.clone(),
                body: comment.body.clone(),
            },
        ),
    );

    if previous.priority != current.priority {
        updates.push(CaseUpdate::Priority { from: previous.priority, to: current.priority });
    }

    match (previous.escalated, current.escalated) {
        (false, true) => updates.push(CaseUpdate::Escalated),
        (true, false) => updates.push(CaseUpdate::Deescalated),
        _ => {}
    }

    if current.state.is_closed() && !previous.state.is_closed() {
        updates.push(CaseUpdate::Closed);
    }

    updates
}

#[cfg(test)]
mod tests {
    use super::{detect_updates, CaseUpdate};
    use crate::domain::case::{CaseComment, CasePriority, CaseState};
    use crate::domain::registration::tests::record;

    fn comment(name: &str, body: &str) -> CaseComment {
        CaseComment {
            name: name.to_string(),
            create_time: "2021-07-12T21:34:19Z".to_string(),
            creator: "Support Engineer".to_string(),
            google_support: true,
            body: body.to_string(),
        }
    }

    #[test]
    fn unchanged_case_has_no_updates() {
        let snapshot = record("1", "T1", "title");
        assert!(detect_updates(&snapshot, &snapshot.clone()).is_empty());
    }

    #[test]
    fn reports_only_new_comments() {
        let mut previous = record("1", "T1", "title");
        previous.comments.push(comment("c/1", "first"));
        let mut current = previous.clone();
        current.comments.push(comment("c/2", "second"));

        assert_eq!(
            detect_updates(&previous, &current),
            vec![CaseUpdate::Comment {
                author: "Support Engineer".to_string(),
                body: "second".to_string()
            }]
        );
    }

    #[test]
    fn reports_priority_escalation_and_close_in_order() {
        let previous = record("1", "T1", "title");
        let mut current = previous.clone();
        current.priority = CasePriority::P2;
        current.escalated = true;
        current.state = CaseState::Closed;

        let kinds =
            detect_updates(&previous, &current).iter().map(CaseUpdate::kind).collect::<Vec<_>>();
        assert_eq!(kinds, vec!["priority", "escalated", "closed"]);
    }

    #[test]
    fn reports_de_escalation() {
        let mut previous = record("1", "T1", "title");
        previous.escalated = true;
        let mut current = previous.clone();
        current.escalated = false;

        assert_eq!(detect_updates(&previous, &current), vec![CaseUpdate::Deescalated]);
    }
}
