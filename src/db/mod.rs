//! Database abstraction layer.

mod store;
mod types;

#[cfg(test)]
pub mod memory;

pub use store::Store;
pub use types::{
    AssignmentRow, NewShiftDefinition, NewWorker, Shift, ShiftDefinition, ShiftDefinitionUpdate,
    Worker, WorkerUpdate,
};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::DatabaseError;

/// Persistence operations for workers, assignments, and shift definitions.
#[async_trait]
pub trait Database: Send + Sync {
    // --- Workers ---

    /// Active workers, ordered by name.
    async fn list_workers(&self) -> Result<Vec<Worker>, DatabaseError>;

    /// All workers including deactivated ones, active first then by name.
    async fn list_all_workers(&self) -> Result<Vec<Worker>, DatabaseError>;

    async fn get_worker(&self, id: i64) -> Result<Option<Worker>, DatabaseError>;

    /// Worker plus stored PIN hash, for login verification.
    async fn get_worker_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<(Worker, String)>, DatabaseError>;

    /// Onboard a worker. A duplicate phone yields `UniqueViolation`.
    async fn create_worker(&self, new: NewWorker) -> Result<Worker, DatabaseError>;

    /// Apply only the supplied fields. Returns `None` when the id is unknown.
    async fn update_worker(
        &self,
        id: i64,
        update: WorkerUpdate,
    ) -> Result<Option<Worker>, DatabaseError>;

    // --- Assignments ---

    /// Upsert on the (worker, protocol, date, shift) natural key.
    ///
    /// An existing row keeps its notes unless `notes` is non-empty, which
    /// overwrites. Returns the assignment id.
    async fn assign(
        &self,
        worker_id: i64,
        protocol_slug: &str,
        date: NaiveDate,
        shift: Shift,
        notes: Option<&str>,
    ) -> Result<i64, DatabaseError>;

    /// Delete at most one row; `false` when nothing matched.
    async fn remove(
        &self,
        worker_id: i64,
        protocol_slug: &str,
        date: NaiveDate,
        shift: Shift,
    ) -> Result<bool, DatabaseError>;

    /// Delete all assignments for a date, optionally one shift only.
    async fn clear_day(&self, date: NaiveDate, shift: Option<Shift>)
        -> Result<u64, DatabaseError>;

    /// Replace the target week with the source week's assignments,
    /// dates shifted by the week offset. Returns count copied.
    async fn copy_week(
        &self,
        source_sunday: NaiveDate,
        target_sunday: NaiveDate,
    ) -> Result<u64, DatabaseError>;

    /// Joined assignment rows for the 7-day window starting at `sunday`,
    /// ordered by date, shift order, worker name.
    async fn week_assignments(&self, sunday: NaiveDate)
        -> Result<Vec<AssignmentRow>, DatabaseError>;

    /// One worker's assignments for a date, ordered by shift then slug.
    async fn worker_assignments_for_date(
        &self,
        worker_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<AssignmentRow>, DatabaseError>;

    // --- Completions ---

    /// Toggle an assignment's completion as `acting_worker`.
    ///
    /// Returns the new state: `true` when a completion was recorded,
    /// `false` when one was removed. Atomic delete-else-insert; no
    /// check-then-act window.
    async fn toggle_complete(
        &self,
        assignment_id: i64,
        acting_worker: i64,
    ) -> Result<bool, DatabaseError>;

    // --- Shift definitions ---

    async fn list_shift_definitions(&self) -> Result<Vec<ShiftDefinition>, DatabaseError>;

    /// A duplicate key yields `UniqueViolation`.
    async fn create_shift_definition(
        &self,
        new: NewShiftDefinition,
    ) -> Result<ShiftDefinition, DatabaseError>;

    async fn update_shift_definition(
        &self,
        key: &str,
        update: ShiftDefinitionUpdate,
    ) -> Result<Option<ShiftDefinition>, DatabaseError>;
}
