//! Persistent record types shared by the Postgres and in-memory stores.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One of the three daily shift lanes.
///
/// Stored as lowercase text; the variant order is the canonical sort order
/// used by every schedule projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    Morning,
    Afternoon,
    Night,
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::Morning, Shift::Afternoon, Shift::Night];

    pub fn as_str(self) -> &'static str {
        match self {
            Shift::Morning => "morning",
            Shift::Afternoon => "afternoon",
            Shift::Night => "night",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Some(Shift::Morning),
            "afternoon" => Some(Shift::Afternoon),
            "night" => Some(Shift::Night),
            _ => None,
        }
    }

    /// Position in the day, 1-based, for ORDER BY clauses.
    pub fn sort_order(self) -> i32 {
        match self {
            Shift::Morning => 1,
            Shift::Afternoon => 2,
            Shift::Night => 3,
        }
    }
}

impl std::fmt::Display for Shift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker account. Never hard-deleted; deactivation flips `active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub phone: String,
    pub default_shift: Shift,
    pub is_manager: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for onboarding a new worker. The PIN arrives pre-hashed.
#[derive(Debug, Clone)]
pub struct NewWorker {
    pub name: String,
    pub role: String,
    pub phone: String,
    pub pin_hash: String,
    pub default_shift: Shift,
    pub is_manager: bool,
}

/// Partial update for a worker. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct WorkerUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub pin_hash: Option<String>,
    pub default_shift: Option<Shift>,
    pub is_manager: Option<bool>,
    pub active: Option<bool>,
}

impl WorkerUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.role.is_none()
            && self.phone.is_none()
            && self.pin_hash.is_none()
            && self.default_shift.is_none()
            && self.is_manager.is_none()
            && self.active.is_none()
    }
}

/// An assignment row joined with its worker's name and completion state.
///
/// `protocol_title` is filled in by the schedule projections from the
/// catalog; the store returns it as the raw slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub id: i64,
    pub worker_id: i64,
    pub worker_name: String,
    pub protocol_slug: String,
    pub protocol_title: String,
    pub date: NaiveDate,
    pub shift: Shift,
    pub notes: Option<String>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A shift lane definition (times, localized names, grid position).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftDefinition {
    pub id: i64,
    pub key: String,
    pub display_name_he: String,
    pub display_name_en: String,
    pub start_time: String,
    pub end_time: String,
    pub sort_order: i32,
    pub active: bool,
}

/// Fields for creating a shift definition.
#[derive(Debug, Clone)]
pub struct NewShiftDefinition {
    pub key: String,
    pub display_name_he: String,
    pub display_name_en: String,
    pub start_time: String,
    pub end_time: String,
    pub sort_order: i32,
}

/// Partial update for a shift definition, keyed by `key`.
#[derive(Debug, Clone, Default)]
pub struct ShiftDefinitionUpdate {
    pub display_name_he: Option<String>,
    pub display_name_en: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub sort_order: Option<i32>,
    pub active: Option<bool>,
}
