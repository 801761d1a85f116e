use casebot_core::domain::case::{CaseNumber, CasePriority, CaseRecord};
use casebot_core::domain::tracking::TrackedCase;
use casebot_core::domain::updates::CaseUpdate;

use crate::blocks::{MessageBuilder, MessageTemplate};

pub const PROCESSING: &str = "Your request is processing ...";

const SITREP_HEADER: &str = "This is the current state of Google Cloud Support cases:\n\n\
     case,priority,title,escalated,create_time,last_updated,state,case_creator";

pub fn processing() -> MessageTemplate {
    MessageTemplate::text(PROCESSING)
}

pub fn case_not_found(case_number: &CaseNumber) -> MessageTemplate {
    MessageTemplate::text(format!(
        "Case {case_number} could not be found in your org. If this case was recently created, \
         please give the bot a minute to pick it up. Otherwise, double check the case number."
    ))
}

pub fn case_update_notice(record: &CaseRecord, update: &CaseUpdate) -> MessageTemplate {
    let case_number = &record.case_number;
    let headline = match update {
        CaseUpdate::Comment { author, body } => {
            format!("Case {case_number} has a new comment from {author}:\n{body}")
        }
        CaseUpdate::Priority { from, to } => {
            format!("The priority of case {case_number} has been changed from {from} to {to}")
        }
        CaseUpdate::Escalated => format!("Case {case_number} has been escalated"),
        CaseUpdate::Deescalated => format!("Case {case_number} has been de-escalated"),
        CaseUpdate::Closed => format!("Case {case_number} has been closed"),
    };

    MessageBuilder::new(headline.clone())
        .section(format!("case.update.{}.v1", update.kind()), |section| {
            section.mrkdwn(headline);
        })
        .context("case.update.context.v1", |context| {
            context
                .mrkdwn(format!("*{}*", record.title))
                .plain(format!("{} | {}", record.priority, record.state));
        })
        .build()
}

pub fn tracking_started(case_number: &CaseNumber, channel_name: &str) -> MessageTemplate {
    MessageTemplate::text(format!(
        "Updates for case {case_number} will be posted to #{channel_name}"
    ))
}

pub fn already_tracking(case_number: &CaseNumber, channel_name: &str) -> MessageTemplate {
    MessageTemplate::text(format!("Case {case_number} is already tracked in #{channel_name}"))
}

pub fn tracking_stopped(case_number: &CaseNumber, channel_name: &str) -> MessageTemplate {
    MessageTemplate::text(format!(
        "Updates for case {case_number} will no longer be posted to #{channel_name}"
    ))
}

pub fn not_tracking(case_number: &CaseNumber, channel_name: &str) -> MessageTemplate {
    MessageTemplate::text(format!("Case {case_number} is not tracked in #{channel_name}"))
}

pub fn tracked_cases(channel_name: &str, tracked: &[TrackedCase]) -> MessageTemplate {
    if tracked.is_empty() {
        return MessageTemplate::text(format!("No cases are tracked in #{channel_name}"));
    }

    let lines = tracked
        .iter()
        .map(|tracked| format!("- {}", tracked.case_number))
        .collect::<Vec<_>>()
        .join("\n");
    MessageTemplate::text(format!("Cases tracked in #{channel_name}:\n{lines}"))
}

/// Plain-text situation report over the canonical cases. Priority counts cover P1..P4;
/// a P0 line appears only when a P0 case exists.
pub fn sitrep_report(cases: &[CaseRecord]) -> String {
    let mut report = String::from(SITREP_HEADER);
    let mut counts = [0_usize; 5];
    let mut escalated = 0_usize;

    for case in cases {
        let slot = match case.priority {
            CasePriority::P0 => 0,
            CasePriority::P1 => 1,
            CasePriority::P2 => 2,
            CasePriority::P3 => 3,
            CasePriority::P4 => 4,
        };
        counts[slot] += 1;
        if case.escalated {
            escalated += 1;
        }

        report.push_str(&format!(
            "\n{},{},{},{},{},{},{},{}",
            case.case_number,
            case.priority,
            case.title,
            case.escalated,
            case.create_time,
            case.update_time,
            case.state,
            case.creator
        ));
    }

    report.push_str("\n\n");
    if counts[0] > 0 {
        report.push_str(&format!("\n{} P0 cases are open", counts[0]));
    }
    for (index, count) in counts.iter().enumerate().skip(1) {
        report.push_str(&format!("\n{count} P{index} cases are open"));
    }
    report.push_str(&format!("\nTotal cases open: {}", cases.len()));
    report.push_str(&format!("\nEscalated cases: {escalated}"));
    report
}

pub fn sitrep(cases: &[CaseRecord]) -> MessageTemplate {
    MessageTemplate::text(sitrep_report(cases))
}
