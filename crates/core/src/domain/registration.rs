use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::case::{CaseNumber, CaseRecord};

/// Collection that holds every registration written by the guard.
pub const CASES_COLLECTION: &str = "cases";

/// Token identifying one write attempt. Hyphenated v4 UUID, 36 characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(pub String);

impl Guid {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload handed to the store; the store assigns `sequence` and `recorded_at`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRegistration {
    pub guid: Guid,
    pub record: CaseRecord,
}

impl NewRegistration {
    pub fn new(record: CaseRecord) -> Self {
        Self { guid: Guid::generate(), record }
    }

    pub fn case_number(&self) -> &CaseNumber {
        &self.record.case_number
    }

    pub fn update_time(&self) -> &str {
        &self.record.update_time
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationEntry {
    pub guid: Guid,
    pub case_number: CaseNumber,
    pub update_time: String,
    /// Store-assigned insertion position. Strictly increasing across all writers.
    pub sequence: i64,
    pub recorded_at: DateTime<Utc>,
    pub record: CaseRecord,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FirstInSelection {
    Empty,
    Winner(RegistrationEntry),
    /// More than one entry claims the lowest sequence.
    Tied { sequence: i64, guids: Vec<Guid> },
}

/// Picks the entry with the lowest store sequence. Never consults `recorded_at`.
pub fn select_first_in(entries: Vec<RegistrationEntry>) -> FirstInSelection {
    let Some(lowest) = entries.iter().map(|entry| entry.sequence).min() else {
        return FirstInSelection::Empty;
    };

    let mut leaders =
        entries.into_iter().filter(|entry| entry.sequence == lowest).collect::<Vec<_>>();
    if leaders.len() > 1 {
        return FirstInSelection::Tied {
            sequence: lowest,
            guids: leaders.into_iter().map(|entry| entry.guid).collect(),
        };
    }

    match leaders.pop() {
        Some(winner) => FirstInSelection::Winner(winner),
        None => FirstInSelection::Empty,
    }
}

/// Canonical view of every case in the log: for each case number, the first-in entry of
/// its most recently registered update cycle. Tied cycles are left out.
pub fn canonical_cases(entries: Vec<RegistrationEntry>) -> Vec<RegistrationEntry> {
    let mut latest_cycle: BTreeMap<CaseNumber, (i64, String)> = BTreeMap::new();
    for entry in &entries {
        let slot = latest_cycle
            .entry(entry.case_number.clone())
            .or_insert_with(|| (entry.sequence, entry.update_time.clone()));
        if entry.sequence > slot.0 {
            *slot = (entry.sequence, entry.update_time.clone());
        }
    }

    let mut cycles: BTreeMap<CaseNumber, Vec<RegistrationEntry>> = BTreeMap::new();
    for entry in entries {
        let in_latest = latest_cycle
            .get(&entry.case_number)
            .is_some_and(|(_, update_time)| *update_time == entry.update_time);
        if in_latest {
            cycles.entry(entry.case_number.clone()).or_default().push(entry);
        }
    }

    let mut canonical = cycles
        .into_values()
        .filter_map(|cycle| match select_first_in(cycle) {
            FirstInSelection::Winner(entry) => Some(entry),
            _ => None,
        })
        .collect::<Vec<_>>();
    canonical.sort_by_key(|entry| entry.sequence);
    canonical
}
