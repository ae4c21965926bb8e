//! Read-side projections over the schedule store.
//!
//! The store returns flat joined rows; these builders shape them into the
//! dense week grid and status listings the API and chat prompt consume.
//! Protocol titles come from the catalog, falling back to the raw slug for
//! protocols that have left the catalog since assignment.

use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::{Language, ProtocolCatalog};
use crate::db::{AssignmentRow, Database, Shift};
use crate::error::DatabaseError;
use crate::week::{week_dates, DAY_NAMES};

/// One assignment as shown in the week grid.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: i64,
    pub worker_id: i64,
    pub worker_name: String,
    pub protocol_slug: String,
    pub protocol_title: String,
    pub notes: Option<String>,
    pub completed: bool,
}

/// One shift lane of one day. Present even when empty.
#[derive(Debug, Clone, Serialize)]
pub struct ShiftSlot {
    pub shift: Shift,
    pub entries: Vec<ScheduleEntry>,
}

/// One day of the week grid, with all three shift lanes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub day_name: &'static str,
    pub shifts: Vec<ShiftSlot>,
}

/// A full Sunday-anchored week: 7 days x 3 shifts, dense.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSchedule {
    pub week_start: NaiveDate,
    pub days: Vec<DaySchedule>,
}

/// One row of the completion status listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub assignment_id: i64,
    pub date: NaiveDate,
    pub day_name: &'static str,
    pub shift: Shift,
    pub worker_id: i64,
    pub worker_name: String,
    pub protocol_slug: String,
    pub protocol_title: String,
    pub notes: Option<String>,
    pub completed: bool,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn day_name_of(date: NaiveDate, dates: &[NaiveDate; 7]) -> &'static str {
    dates
        .iter()
        .position(|d| *d == date)
        .map(|i| DAY_NAMES[i])
        .unwrap_or("")
}

fn with_title(mut row: AssignmentRow, titles: &std::collections::HashMap<String, String>) -> AssignmentRow {
    row.protocol_title = titles
        .get(&row.protocol_slug)
        .cloned()
        .unwrap_or_else(|| row.protocol_slug.clone());
    row
}

/// Build the dense week grid for the week containing `sunday`.
pub async fn week_schedule(
    db: &dyn Database,
    catalog: &dyn ProtocolCatalog,
    sunday: NaiveDate,
    lang: Language,
) -> Result<WeekSchedule, DatabaseError> {
    let titles = catalog.title_map(lang);
    let rows = db.week_assignments(sunday).await?;
    let dates = week_dates(sunday);

    let mut days: Vec<DaySchedule> = dates
        .iter()
        .enumerate()
        .map(|(i, date)| DaySchedule {
            date: *date,
            day_name: DAY_NAMES[i],
            shifts: Shift::ALL
                .iter()
                .map(|shift| ShiftSlot {
                    shift: *shift,
                    entries: Vec::new(),
                })
                .collect(),
        })
        .collect();

    for row in rows {
        let row = with_title(row, &titles);
        let Some(day) = days.iter_mut().find(|d| d.date == row.date) else {
            continue;
        };
        let Some(slot) = day.shifts.iter_mut().find(|s| s.shift == row.shift) else {
            continue;
        };
        slot.entries.push(ScheduleEntry {
            id: row.id,
            worker_id: row.worker_id,
            worker_name: row.worker_name,
            protocol_slug: row.protocol_slug,
            protocol_title: row.protocol_title,
            notes: row.notes,
            completed: row.completed,
        });
    }

    Ok(WeekSchedule {
        week_start: sunday,
        days,
    })
}

/// Completion status for a week, optionally filtered to one worker.
///
/// Ordered by date, then shift, then worker name; the store's week
/// ordering already guarantees this.
pub async fn task_status_list(
    db: &dyn Database,
    catalog: &dyn ProtocolCatalog,
    sunday: NaiveDate,
    worker_id: Option<i64>,
    lang: Language,
) -> Result<Vec<TaskStatus>, DatabaseError> {
    let titles = catalog.title_map(lang);
    let dates = week_dates(sunday);
    let rows = db.week_assignments(sunday).await?;

    Ok(rows
        .into_iter()
        .filter(|row| worker_id.is_none_or(|id| row.worker_id == id))
        .map(|row| {
            let row = with_title(row, &titles);
            TaskStatus {
                assignment_id: row.id,
                date: row.date,
                day_name: day_name_of(row.date, &dates),
                shift: row.shift,
                worker_id: row.worker_id,
                worker_name: row.worker_name,
                protocol_slug: row.protocol_slug,
                protocol_title: row.protocol_title,
                notes: row.notes,
                completed: row.completed,
                completed_at: row.completed_at,
            }
        })
        .collect())
}

/// One worker's tasks for a single date, titles resolved.
pub async fn worker_tasks(
    db: &dyn Database,
    catalog: &dyn ProtocolCatalog,
    worker_id: i64,
    date: NaiveDate,
    lang: Language,
) -> Result<Vec<AssignmentRow>, DatabaseError> {
    let titles = catalog.title_map(lang);
    let rows = db.worker_assignments_for_date(worker_id, date).await?;
    Ok(rows.into_iter().map(|row| with_title(row, &titles)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_catalog;
    use crate::db::memory::MemoryStore;
    use crate::week::parse_date;
    use pretty_assertions::assert_eq;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[tokio::test]
    async fn week_grid_is_dense_even_when_empty() {
        let store = MemoryStore::new();
        let catalog = test_catalog();

        let grid = week_schedule(&store, &catalog, d("2026-02-08"), Language::He)
            .await
            .unwrap();

        assert_eq!(grid.days.len(), 7);
        assert_eq!(grid.days[0].day_name, "Sunday");
        assert_eq!(grid.days[6].day_name, "Saturday");
        for day in &grid.days {
            assert_eq!(day.shifts.len(), 3);
            assert_eq!(day.shifts[0].shift, Shift::Morning);
            assert_eq!(day.shifts[2].shift, Shift::Night);
            assert!(day.shifts.iter().all(|s| s.entries.is_empty()));
        }
    }

    #[tokio::test]
    async fn assignments_land_in_their_slot_with_catalog_titles() {
        let store = MemoryStore::new();
        let catalog = test_catalog();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;

        store
            .assign(udi.id, "oxygen-check", d("2026-02-10"), Shift::Night, Some("tank 3"))
            .await
            .unwrap();
        store
            .assign(udi.id, "not-in-catalog", d("2026-02-10"), Shift::Night, None)
            .await
            .unwrap();

        let grid = week_schedule(&store, &catalog, d("2026-02-08"), Language::He)
            .await
            .unwrap();

        let tuesday = &grid.days[2];
        assert_eq!(tuesday.date, d("2026-02-10"));
        let night = &tuesday.shifts[2];
        assert_eq!(night.entries.len(), 2);
        let oxygen = night
            .entries
            .iter()
            .find(|e| e.protocol_slug == "oxygen-check")
            .unwrap();
        assert_eq!(oxygen.protocol_title, "Oxygen Check");
        assert_eq!(oxygen.notes.as_deref(), Some("tank 3"));
        // Unknown slug falls back to the slug itself
        let other = night
            .entries
            .iter()
            .find(|e| e.protocol_slug == "not-in-catalog")
            .unwrap();
        assert_eq!(other.protocol_title, "not-in-catalog");
    }

    #[tokio::test]
    async fn status_list_filters_by_worker() {
        let store = MemoryStore::new();
        let catalog = test_catalog();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;
        let roie = store.seed_worker("Roie Lavi", "Biologist", "0500000002", Shift::Night).await;

        store.assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, None).await.unwrap();
        let id = store
            .assign(roie.id, "daily-clean", d("2026-02-09"), Shift::Night, None)
            .await
            .unwrap();
        store.toggle_complete(id, roie.id).await.unwrap();

        let all = task_status_list(&store, &catalog, d("2026-02-08"), None, Language::He)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].day_name, "Sunday");
        assert!(!all[0].completed);
        assert_eq!(all[1].day_name, "Monday");
        assert!(all[1].completed);
        assert!(all[1].completed_at.is_some());

        let only_roie =
            task_status_list(&store, &catalog, d("2026-02-08"), Some(roie.id), Language::He)
                .await
                .unwrap();
        assert_eq!(only_roie.len(), 1);
        assert_eq!(only_roie[0].worker_name, "Roie Lavi");
    }

    #[tokio::test]
    async fn worker_tasks_resolve_titles_and_scope_to_date() {
        let store = MemoryStore::new();
        let catalog = test_catalog();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;

        store.assign(udi.id, "feed-fattening", d("2026-02-08"), Shift::Morning, None).await.unwrap();
        store.assign(udi.id, "oxygen-check", d("2026-02-09"), Shift::Morning, None).await.unwrap();

        let tasks = worker_tasks(&store, &catalog, udi.id, d("2026-02-08"), Language::He)
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].protocol_title, "Feeding - Fattening Tanks");
    }
}
