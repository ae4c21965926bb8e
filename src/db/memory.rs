//! In-memory `Database` implementation for tests.
//!
//! Mirrors the Postgres store's semantics exactly: four-tuple upsert with
//! notes merge, destructive week copy, dense ordering rules, and the
//! delete-else-insert completion toggle.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::db::types::{
    AssignmentRow, NewShiftDefinition, NewWorker, Shift, ShiftDefinition, ShiftDefinitionUpdate,
    Worker, WorkerUpdate,
};
use crate::db::Database;
use crate::error::DatabaseError;
use crate::week::week_dates;

#[derive(Debug, Clone)]
struct StoredAssignment {
    id: i64,
    worker_id: i64,
    protocol_slug: String,
    date: NaiveDate,
    shift: Shift,
    notes: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredCompletion {
    assignment_id: i64,
    completed_by: i64,
    completed_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    workers: Vec<Worker>,
    pins: Vec<(i64, String)>,
    assignments: Vec<StoredAssignment>,
    completions: Vec<StoredCompletion>,
    shift_definitions: Vec<ShiftDefinition>,
    next_worker_id: i64,
    next_assignment_id: i64,
    next_shift_id: i64,
}

/// In-memory store. A `Mutex` around the whole state stands in for the
/// row-level constraints Postgres provides.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut inner = Inner {
            next_worker_id: 1,
            next_assignment_id: 1,
            next_shift_id: 1,
            ..Default::default()
        };
        for (i, (key, he, en, start, end)) in [
            ("morning", "בוקר", "Morning", "06:00", "14:00"),
            ("afternoon", "צהריים", "Afternoon", "14:00", "22:00"),
            ("night", "לילה", "Night", "22:00", "06:00"),
        ]
        .into_iter()
        .enumerate()
        {
            inner.shift_definitions.push(ShiftDefinition {
                id: inner.next_shift_id,
                key: key.to_string(),
                display_name_he: he.to_string(),
                display_name_en: en.to_string(),
                start_time: start.to_string(),
                end_time: end.to_string(),
                sort_order: i as i32 + 1,
                active: true,
            });
            inner.next_shift_id += 1;
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Seed a worker directly, bypassing PIN hashing. Test convenience.
    pub async fn seed_worker(&self, name: &str, role: &str, phone: &str, shift: Shift) -> Worker {
        self.create_worker(NewWorker {
            name: name.to_string(),
            role: role.to_string(),
            phone: phone.to_string(),
            pin_hash: "test-hash".to_string(),
            default_shift: shift,
            is_manager: false,
        })
        .await
        .unwrap()
    }

    /// Total assignment row count, for verifying that failed tool calls
    /// leave storage untouched.
    pub fn assignment_count(&self) -> usize {
        self.inner.lock().unwrap().assignments.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_row(a: &StoredAssignment, inner: &Inner) -> AssignmentRow {
    let worker_name = inner
        .workers
        .iter()
        .find(|w| w.id == a.worker_id)
        .map(|w| w.name.clone())
        .unwrap_or_default();
    let completion = inner
        .completions
        .iter()
        .find(|c| c.assignment_id == a.id);
    AssignmentRow {
        id: a.id,
        worker_id: a.worker_id,
        worker_name,
        protocol_slug: a.protocol_slug.clone(),
        protocol_title: a.protocol_slug.clone(),
        date: a.date,
        shift: a.shift,
        notes: a.notes.clone(),
        completed: completion.is_some(),
        completed_at: completion.map(|c| c.completed_at),
    }
}

#[async_trait]
impl Database for MemoryStore {
    async fn list_workers(&self) -> Result<Vec<Worker>, DatabaseError> {
        let inner = self.lock();
        let mut workers: Vec<_> = inner.workers.iter().filter(|w| w.active).cloned().collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workers)
    }

    async fn list_all_workers(&self) -> Result<Vec<Worker>, DatabaseError> {
        let inner = self.lock();
        let mut workers = inner.workers.clone();
        workers.sort_by(|a, b| b.active.cmp(&a.active).then_with(|| a.name.cmp(&b.name)));
        Ok(workers)
    }

    async fn get_worker(&self, id: i64) -> Result<Option<Worker>, DatabaseError> {
        Ok(self.lock().workers.iter().find(|w| w.id == id).cloned())
    }

    async fn get_worker_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<(Worker, String)>, DatabaseError> {
        let inner = self.lock();
        let worker = inner
            .workers
            .iter()
            .find(|w| w.phone == phone && w.active)
            .cloned();
        Ok(worker.map(|w| {
            let pin = inner
                .pins
                .iter()
                .find(|(id, _)| *id == w.id)
                .map(|(_, p)| p.clone())
                .unwrap_or_default();
            (w, pin)
        }))
    }

    async fn create_worker(&self, new: NewWorker) -> Result<Worker, DatabaseError> {
        let mut inner = self.lock();
        if inner.workers.iter().any(|w| w.phone == new.phone) {
            return Err(DatabaseError::UniqueViolation("phone".to_string()));
        }
        let worker = Worker {
            id: inner.next_worker_id,
            name: new.name,
            role: new.role,
            phone: new.phone,
            default_shift: new.default_shift,
            is_manager: new.is_manager,
            active: true,
            created_at: Utc::now(),
        };
        inner.next_worker_id += 1;
        inner.pins.push((worker.id, new.pin_hash));
        inner.workers.push(worker.clone());
        Ok(worker)
    }

    async fn update_worker(
        &self,
        id: i64,
        update: WorkerUpdate,
    ) -> Result<Option<Worker>, DatabaseError> {
        let mut inner = self.lock();
        if let Some(phone) = &update.phone {
            if inner.workers.iter().any(|w| w.id != id && &w.phone == phone) {
                return Err(DatabaseError::UniqueViolation("phone".to_string()));
            }
        }
        if let Some(pin_hash) = update.pin_hash.clone() {
            if let Some(entry) = inner.pins.iter_mut().find(|(wid, _)| *wid == id) {
                entry.1 = pin_hash;
            }
        }
        let Some(worker) = inner.workers.iter_mut().find(|w| w.id == id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            worker.name = name;
        }
        if let Some(role) = update.role {
            worker.role = role;
        }
        if let Some(phone) = update.phone {
            worker.phone = phone;
        }
        if let Some(shift) = update.default_shift {
            worker.default_shift = shift;
        }
        if let Some(is_manager) = update.is_manager {
            worker.is_manager = is_manager;
        }
        if let Some(active) = update.active {
            worker.active = active;
        }
        Ok(Some(worker.clone()))
    }

    async fn assign(
        &self,
        worker_id: i64,
        protocol_slug: &str,
        date: NaiveDate,
        shift: Shift,
        notes: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let mut inner = self.lock();
        if !inner.workers.iter().any(|w| w.id == worker_id) {
            // Same shape as the FK violation the real store surfaces.
            return Err(DatabaseError::Pool(format!(
                "foreign key violation: worker {worker_id}"
            )));
        }
        let notes = notes.filter(|n| !n.is_empty()).map(str::to_string);
        if let Some(existing) = inner.assignments.iter_mut().find(|a| {
            a.worker_id == worker_id
                && a.protocol_slug == protocol_slug
                && a.date == date
                && a.shift == shift
        }) {
            if notes.is_some() {
                existing.notes = notes;
            }
            return Ok(existing.id);
        }
        let id = inner.next_assignment_id;
        inner.next_assignment_id += 1;
        inner.assignments.push(StoredAssignment {
            id,
            worker_id,
            protocol_slug: protocol_slug.to_string(),
            date,
            shift,
            notes,
        });
        Ok(id)
    }

    async fn remove(
        &self,
        worker_id: i64,
        protocol_slug: &str,
        date: NaiveDate,
        shift: Shift,
    ) -> Result<bool, DatabaseError> {
        let mut inner = self.lock();
        let before = inner.assignments.len();
        let mut removed_ids = Vec::new();
        inner.assignments.retain(|a| {
            let matched = a.worker_id == worker_id
                && a.protocol_slug == protocol_slug
                && a.date == date
                && a.shift == shift;
            if matched {
                removed_ids.push(a.id);
            }
            !matched
        });
        inner
            .completions
            .retain(|c| !removed_ids.contains(&c.assignment_id));
        Ok(inner.assignments.len() < before)
    }

    async fn clear_day(
        &self,
        date: NaiveDate,
        shift: Option<Shift>,
    ) -> Result<u64, DatabaseError> {
        let mut inner = self.lock();
        let before = inner.assignments.len();
        let mut removed_ids = Vec::new();
        inner.assignments.retain(|a| {
            let matched = a.date == date && shift.is_none_or(|s| a.shift == s);
            if matched {
                removed_ids.push(a.id);
            }
            !matched
        });
        inner
            .completions
            .retain(|c| !removed_ids.contains(&c.assignment_id));
        Ok((before - inner.assignments.len()) as u64)
    }

    async fn copy_week(
        &self,
        source_sunday: NaiveDate,
        target_sunday: NaiveDate,
    ) -> Result<u64, DatabaseError> {
        let source_dates = week_dates(source_sunday);
        let target_dates = week_dates(target_sunday);

        let mut inner = self.lock();

        let mut removed_ids = Vec::new();
        inner.assignments.retain(|a| {
            let in_target = a.date >= target_dates[0] && a.date <= target_dates[6];
            if in_target {
                removed_ids.push(a.id);
            }
            !in_target
        });
        inner
            .completions
            .retain(|c| !removed_ids.contains(&c.assignment_id));

        let mut copied = 0u64;
        for (source, target) in source_dates.iter().zip(target_dates.iter()) {
            let day_rows: Vec<StoredAssignment> = inner
                .assignments
                .iter()
                .filter(|a| a.date == *source)
                .cloned()
                .collect();
            for row in day_rows {
                let duplicate = inner.assignments.iter().any(|a| {
                    a.worker_id == row.worker_id
                        && a.protocol_slug == row.protocol_slug
                        && a.date == *target
                        && a.shift == row.shift
                });
                if duplicate {
                    continue;
                }
                let id = inner.next_assignment_id;
                inner.next_assignment_id += 1;
                inner.assignments.push(StoredAssignment {
                    id,
                    worker_id: row.worker_id,
                    protocol_slug: row.protocol_slug,
                    date: *target,
                    shift: row.shift,
                    notes: row.notes,
                });
                copied += 1;
            }
        }
        Ok(copied)
    }

    async fn week_assignments(
        &self,
        sunday: NaiveDate,
    ) -> Result<Vec<AssignmentRow>, DatabaseError> {
        let dates = week_dates(sunday);
        let inner = self.lock();
        let mut rows: Vec<AssignmentRow> = inner
            .assignments
            .iter()
            .filter(|a| a.date >= dates[0] && a.date <= dates[6])
            .map(|a| to_row(a, &inner))
            .collect();
        rows.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.shift.sort_order().cmp(&b.shift.sort_order()))
                .then_with(|| a.worker_name.cmp(&b.worker_name))
        });
        Ok(rows)
    }

    async fn worker_assignments_for_date(
        &self,
        worker_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<AssignmentRow>, DatabaseError> {
        let inner = self.lock();
        let mut rows: Vec<AssignmentRow> = inner
            .assignments
            .iter()
            .filter(|a| a.worker_id == worker_id && a.date == date)
            .map(|a| to_row(a, &inner))
            .collect();
        rows.sort_by(|a, b| {
            a.shift
                .sort_order()
                .cmp(&b.shift.sort_order())
                .then_with(|| a.protocol_slug.cmp(&b.protocol_slug))
        });
        Ok(rows)
    }

    async fn toggle_complete(
        &self,
        assignment_id: i64,
        acting_worker: i64,
    ) -> Result<bool, DatabaseError> {
        let mut inner = self.lock();
        let before = inner.completions.len();
        inner.completions.retain(|c| c.assignment_id != assignment_id);
        if inner.completions.len() < before {
            return Ok(false);
        }
        if !inner.assignments.iter().any(|a| a.id == assignment_id) {
            return Err(DatabaseError::NotFound);
        }
        inner.completions.push(StoredCompletion {
            assignment_id,
            completed_by: acting_worker,
            completed_at: Utc::now(),
        });
        Ok(true)
    }

    async fn list_shift_definitions(&self) -> Result<Vec<ShiftDefinition>, DatabaseError> {
        let inner = self.lock();
        let mut defs = inner.shift_definitions.clone();
        defs.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.key.cmp(&b.key)));
        Ok(defs)
    }

    async fn create_shift_definition(
        &self,
        new: NewShiftDefinition,
    ) -> Result<ShiftDefinition, DatabaseError> {
        let mut inner = self.lock();
        if inner.shift_definitions.iter().any(|d| d.key == new.key) {
            return Err(DatabaseError::UniqueViolation("shift key".to_string()));
        }
        let def = ShiftDefinition {
            id: inner.next_shift_id,
            key: new.key,
            display_name_he: new.display_name_he,
            display_name_en: new.display_name_en,
            start_time: new.start_time,
            end_time: new.end_time,
            sort_order: new.sort_order,
            active: true,
        };
        inner.next_shift_id += 1;
        inner.shift_definitions.push(def.clone());
        Ok(def)
    }

    async fn update_shift_definition(
        &self,
        key: &str,
        update: ShiftDefinitionUpdate,
    ) -> Result<Option<ShiftDefinition>, DatabaseError> {
        let mut inner = self.lock();
        let Some(def) = inner.shift_definitions.iter_mut().find(|d| d.key == key) else {
            return Ok(None);
        };
        if let Some(he) = update.display_name_he {
            def.display_name_he = he;
        }
        if let Some(en) = update.display_name_en {
            def.display_name_en = en;
        }
        if let Some(start) = update.start_time {
            def.start_time = start;
        }
        if let Some(end) = update.end_time {
            def.end_time = end;
        }
        if let Some(order) = update.sort_order {
            def.sort_order = order;
        }
        if let Some(active) = update.active {
            def.active = active;
        }
        Ok(Some(def.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::week::parse_date;
    use pretty_assertions::assert_eq;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[tokio::test]
    async fn assign_twice_merges_notes_into_one_row() {
        let store = MemoryStore::new();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;

        let first = store
            .assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, Some("check tank 3"))
            .await
            .unwrap();
        let second = store
            .assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, Some("tank 5 too"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.assignment_count(), 1);
        let rows = store.week_assignments(d("2026-02-08")).await.unwrap();
        assert_eq!(rows[0].notes.as_deref(), Some("tank 5 too"));
    }

    #[tokio::test]
    async fn reassign_without_notes_keeps_existing_notes() {
        let store = MemoryStore::new();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;

        store
            .assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, Some("original"))
            .await
            .unwrap();
        store
            .assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, None)
            .await
            .unwrap();
        store
            .assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, Some(""))
            .await
            .unwrap();

        let rows = store.week_assignments(d("2026-02-08")).await.unwrap();
        assert_eq!(rows[0].notes.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn remove_unassigned_tuple_reports_not_removed() {
        let store = MemoryStore::new();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;

        let removed = store
            .remove(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning)
            .await
            .unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn clear_day_scoped_to_shift_leaves_other_shifts() {
        let store = MemoryStore::new();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;

        store.assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, None).await.unwrap();
        store.assign(udi.id, "daily-clean", d("2026-02-08"), Shift::Morning, None).await.unwrap();
        store.assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Night, None).await.unwrap();

        let cleared = store.clear_day(d("2026-02-08"), Some(Shift::Morning)).await.unwrap();
        assert_eq!(cleared, 2);

        let rows = store.week_assignments(d("2026-02-08")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].shift, Shift::Night);
    }

    #[tokio::test]
    async fn copy_week_is_idempotent_under_repetition() {
        let store = MemoryStore::new();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;
        let roie = store.seed_worker("Roie Lavi", "Biologist", "0500000002", Shift::Morning).await;

        store.assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, None).await.unwrap();
        store.assign(roie.id, "feed-fattening", d("2026-02-10"), Shift::Night, Some("double feed")).await.unwrap();

        let first = store.copy_week(d("2026-02-08"), d("2026-02-15")).await.unwrap();
        assert_eq!(first, 2);
        let after_first = store.week_assignments(d("2026-02-15")).await.unwrap();

        let second = store.copy_week(d("2026-02-08"), d("2026-02-15")).await.unwrap();
        assert_eq!(second, 2);
        let after_second = store.week_assignments(d("2026-02-15")).await.unwrap();

        let key =
            |r: &AssignmentRow| (r.worker_id, r.protocol_slug.clone(), r.date, r.shift, r.notes.clone());
        assert_eq!(
            after_first.iter().map(key).collect::<Vec<_>>(),
            after_second.iter().map(key).collect::<Vec<_>>()
        );
        // Dates shifted by exactly one week
        assert_eq!(after_second[0].date, d("2026-02-15"));
        assert_eq!(after_second[1].date, d("2026-02-17"));
        assert_eq!(after_second[1].notes.as_deref(), Some("double feed"));
    }

    #[tokio::test]
    async fn copy_week_overwrites_target_week() {
        let store = MemoryStore::new();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;

        store.assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, None).await.unwrap();
        store.assign(udi.id, "daily-clean", d("2026-02-16"), Shift::Night, None).await.unwrap();

        store.copy_week(d("2026-02-08"), d("2026-02-15")).await.unwrap();

        let target = store.week_assignments(d("2026-02-15")).await.unwrap();
        assert_eq!(target.len(), 1);
        assert_eq!(target[0].protocol_slug, "oxygen-check");
    }

    #[tokio::test]
    async fn toggle_complete_round_trips() {
        let store = MemoryStore::new();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;
        let id = store
            .assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, None)
            .await
            .unwrap();

        assert!(store.toggle_complete(id, udi.id).await.unwrap());
        let rows = store.week_assignments(d("2026-02-08")).await.unwrap();
        assert!(rows[0].completed);
        assert!(rows[0].completed_at.is_some());
        assert_eq!(store.inner.lock().unwrap().completions[0].completed_by, udi.id);

        assert!(!store.toggle_complete(id, udi.id).await.unwrap());
        let rows = store.week_assignments(d("2026-02-08")).await.unwrap();
        assert!(!rows[0].completed);
    }

    #[tokio::test]
    async fn completion_does_not_outlive_assignment() {
        let store = MemoryStore::new();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;
        let id = store
            .assign(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning, None)
            .await
            .unwrap();
        store.toggle_complete(id, udi.id).await.unwrap();

        store.remove(udi.id, "oxygen-check", d("2026-02-08"), Shift::Morning).await.unwrap();
        assert!(store.inner.lock().unwrap().completions.is_empty());
    }

    #[tokio::test]
    async fn duplicate_phone_is_a_unique_violation() {
        let store = MemoryStore::new();
        store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;
        let err = store
            .create_worker(NewWorker {
                name: "Other".to_string(),
                role: "Tech".to_string(),
                phone: "0500000001".to_string(),
                pin_hash: "h".to_string(),
                default_shift: Shift::Night,
                is_manager: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn deactivation_hides_from_active_list_only() {
        let store = MemoryStore::new();
        let udi = store.seed_worker("Udi Bril", "Shift Lead", "0500000001", Shift::Morning).await;
        store
            .update_worker(
                udi.id,
                WorkerUpdate {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(store.list_workers().await.unwrap().is_empty());
        let all = store.list_all_workers().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].active);
    }

    #[tokio::test]
    async fn duplicate_shift_key_rejected() {
        let store = MemoryStore::new();
        let err = store
            .create_shift_definition(NewShiftDefinition {
                key: "morning".to_string(),
                display_name_he: "x".to_string(),
                display_name_en: "x".to_string(),
                start_time: "05:00".to_string(),
                end_time: "13:00".to_string(),
                sort_order: 9,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation(_)));
    }
}
