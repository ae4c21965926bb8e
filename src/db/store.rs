//! PostgreSQL store for the schedule.
//!
//! All invariants that matter under concurrency live in the schema: the
//! four-tuple UNIQUE constraint on assignments makes concurrent assigns of
//! the same slot resolve to a notes merge, and the UNIQUE assignment_id on
//! completions makes the toggle a single atomic delete-else-insert.

use async_trait::async_trait;
use chrono::NaiveDate;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use crate::config::DatabaseConfig;
use crate::db::types::{
    AssignmentRow, NewShiftDefinition, NewWorker, Shift, ShiftDefinition, ShiftDefinitionUpdate,
    Worker, WorkerUpdate,
};
use crate::db::Database;
use crate::error::DatabaseError;
use crate::week::week_dates;

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// Database store backed by PostgreSQL.
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Create a new store and verify connectivity.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        // Test connection
        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    /// Run embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut conn = self.pool.get().await?;
        let client = &mut **conn;
        let report = embedded::migrations::runner()
            .run_async(client)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        for migration in report.applied_migrations() {
            tracing::info!(migration = %migration, "Applied migration");
        }
        Ok(())
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }
}

fn worker_from_row(row: &Row) -> Result<Worker, DatabaseError> {
    let shift_str: String = row.get("default_shift");
    let default_shift = Shift::parse(&shift_str).ok_or_else(|| {
        DatabaseError::Migration(format!("unknown shift key in workers table: {shift_str}"))
    })?;
    Ok(Worker {
        id: row.get("id"),
        name: row.get("name"),
        role: row.get("role"),
        phone: row.get("phone"),
        default_shift,
        is_manager: row.get("is_manager"),
        active: row.get("active"),
        created_at: row.get("created_at"),
    })
}

fn assignment_from_row(row: &Row) -> Result<AssignmentRow, DatabaseError> {
    let shift_str: String = row.get("shift");
    let shift = Shift::parse(&shift_str).ok_or_else(|| {
        DatabaseError::Migration(format!("unknown shift key in assignments table: {shift_str}"))
    })?;
    let completed_at: Option<chrono::DateTime<chrono::Utc>> = row.get("completed_at");
    let slug: String = row.get("protocol_slug");
    Ok(AssignmentRow {
        id: row.get("id"),
        worker_id: row.get("worker_id"),
        worker_name: row.get("worker_name"),
        protocol_title: slug.clone(),
        protocol_slug: slug,
        date: row.get("date"),
        shift,
        notes: row.get("notes"),
        completed: completed_at.is_some(),
        completed_at,
    })
}

fn shift_definition_from_row(row: &Row) -> ShiftDefinition {
    ShiftDefinition {
        id: row.get("id"),
        key: row.get("key"),
        display_name_he: row.get("display_name_he"),
        display_name_en: row.get("display_name_en"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        sort_order: row.get("sort_order"),
        active: row.get("active"),
    }
}

/// Map a 23505 into the typed variant so callers can report conflicts.
fn map_unique(err: tokio_postgres::Error, what: &str) -> DatabaseError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        DatabaseError::UniqueViolation(what.to_string())
    } else {
        DatabaseError::Query(err)
    }
}

const WORKER_COLUMNS: &str =
    "id, name, role, phone, default_shift, is_manager, active, created_at";

const ASSIGNMENT_SELECT: &str = r#"
    SELECT sa.id, sa.worker_id, w.name AS worker_name, sa.protocol_slug,
           sa.date, sa.shift, sa.notes, tc.completed_at
    FROM schedule_assignments sa
    JOIN workers w ON w.id = sa.worker_id
    LEFT JOIN task_completions tc ON tc.assignment_id = sa.id
"#;

#[async_trait]
impl Database for Store {
    // ==================== Workers ====================

    async fn list_workers(&self) -> Result<Vec<Worker>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                format!("SELECT {WORKER_COLUMNS} FROM workers WHERE active = TRUE ORDER BY name")
                    .as_str(),
                &[],
            )
            .await?;
        rows.iter().map(worker_from_row).collect()
    }

    async fn list_all_workers(&self) -> Result<Vec<Worker>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                format!("SELECT {WORKER_COLUMNS} FROM workers ORDER BY active DESC, name").as_str(),
                &[],
            )
            .await?;
        rows.iter().map(worker_from_row).collect()
    }

    async fn get_worker(&self, id: i64) -> Result<Option<Worker>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = $1").as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(worker_from_row).transpose()
    }

    async fn get_worker_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<(Worker, String)>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                format!(
                    "SELECT {WORKER_COLUMNS}, pin FROM workers \
                     WHERE phone = $1 AND active = TRUE LIMIT 1"
                )
                .as_str(),
                &[&phone],
            )
            .await?;
        match row {
            Some(row) => {
                let pin_hash: String = row.get("pin");
                Ok(Some((worker_from_row(&row)?, pin_hash)))
            }
            None => Ok(None),
        }
    }

    async fn create_worker(&self, new: NewWorker) -> Result<Worker, DatabaseError> {
        let conn = self.conn().await?;
        let shift = new.default_shift.as_str();
        let row = conn
            .query_one(
                format!(
                    "INSERT INTO workers (name, role, phone, pin, default_shift, is_manager) \
                     VALUES ($1, $2, $3, $4, $5, $6) \
                     RETURNING {WORKER_COLUMNS}"
                )
                .as_str(),
                &[
                    &new.name,
                    &new.role,
                    &new.phone,
                    &new.pin_hash,
                    &shift,
                    &new.is_manager,
                ],
            )
            .await
            .map_err(|e| map_unique(e, "phone"))?;
        worker_from_row(&row)
    }

    async fn update_worker(
        &self,
        id: i64,
        update: WorkerUpdate,
    ) -> Result<Option<Worker>, DatabaseError> {
        let conn = self.conn().await?;
        let shift = update.default_shift.map(Shift::as_str);
        let row = conn
            .query_opt(
                format!(
                    "UPDATE workers SET \
                         name = COALESCE($2, name), \
                         role = COALESCE($3, role), \
                         phone = COALESCE($4, phone), \
                         pin = COALESCE($5, pin), \
                         default_shift = COALESCE($6, default_shift), \
                         is_manager = COALESCE($7, is_manager), \
                         active = COALESCE($8, active) \
                     WHERE id = $1 \
                     RETURNING {WORKER_COLUMNS}"
                )
                .as_str(),
                &[
                    &id,
                    &update.name,
                    &update.role,
                    &update.phone,
                    &update.pin_hash,
                    &shift,
                    &update.is_manager,
                    &update.active,
                ],
            )
            .await
            .map_err(|e| map_unique(e, "phone"))?;
        row.as_ref().map(worker_from_row).transpose()
    }

    // ==================== Assignments ====================

    async fn assign(
        &self,
        worker_id: i64,
        protocol_slug: &str,
        date: NaiveDate,
        shift: Shift,
        notes: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let conn = self.conn().await?;
        let shift_key = shift.as_str();
        // NULLIF treats an empty notes string like "not supplied", so a
        // bare re-assign never wipes existing notes.
        let row = conn
            .query_one(
                "INSERT INTO schedule_assignments (worker_id, protocol_slug, date, shift, notes) \
                 VALUES ($1, $2, $3, $4, NULLIF($5, '')) \
                 ON CONFLICT (worker_id, protocol_slug, date, shift) \
                 DO UPDATE SET notes = COALESCE(NULLIF($5, ''), schedule_assignments.notes) \
                 RETURNING id",
                &[&worker_id, &protocol_slug, &date, &shift_key, &notes],
            )
            .await?;
        Ok(row.get("id"))
    }

    async fn remove(
        &self,
        worker_id: i64,
        protocol_slug: &str,
        date: NaiveDate,
        shift: Shift,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn().await?;
        let shift_key = shift.as_str();
        let affected = conn
            .execute(
                "DELETE FROM schedule_assignments \
                 WHERE worker_id = $1 AND protocol_slug = $2 AND date = $3 AND shift = $4",
                &[&worker_id, &protocol_slug, &date, &shift_key],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn clear_day(
        &self,
        date: NaiveDate,
        shift: Option<Shift>,
    ) -> Result<u64, DatabaseError> {
        let conn = self.conn().await?;
        let affected = match shift {
            Some(shift) => {
                let shift_key = shift.as_str();
                conn.execute(
                    "DELETE FROM schedule_assignments WHERE date = $1 AND shift = $2",
                    &[&date, &shift_key],
                )
                .await?
            }
            None => {
                conn.execute("DELETE FROM schedule_assignments WHERE date = $1", &[&date])
                    .await?
            }
        };
        Ok(affected)
    }

    async fn copy_week(
        &self,
        source_sunday: NaiveDate,
        target_sunday: NaiveDate,
    ) -> Result<u64, DatabaseError> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        let source_dates = week_dates(source_sunday);
        let target_dates = week_dates(target_sunday);

        // Hard overwrite: the target week is replaced, not merged.
        tx.execute(
            "DELETE FROM schedule_assignments WHERE date >= $1 AND date <= $2",
            &[&target_dates[0], &target_dates[6]],
        )
        .await?;

        let mut copied = 0u64;
        for (source, target) in source_dates.iter().zip(target_dates.iter()) {
            copied += tx
                .execute(
                    "INSERT INTO schedule_assignments (worker_id, protocol_slug, date, shift, notes) \
                     SELECT worker_id, protocol_slug, $2::date, shift, notes \
                     FROM schedule_assignments WHERE date = $1 \
                     ON CONFLICT DO NOTHING",
                    &[source, target],
                )
                .await?;
        }

        tx.commit().await?;
        Ok(copied)
    }

    async fn week_assignments(
        &self,
        sunday: NaiveDate,
    ) -> Result<Vec<AssignmentRow>, DatabaseError> {
        let conn = self.conn().await?;
        let dates = week_dates(sunday);
        let rows = conn
            .query(
                format!(
                    "{ASSIGNMENT_SELECT} \
                     WHERE sa.date >= $1 AND sa.date <= $2 \
                     ORDER BY sa.date, \
                       CASE sa.shift WHEN 'morning' THEN 1 WHEN 'afternoon' THEN 2 ELSE 3 END, \
                       w.name"
                )
                .as_str(),
                &[&dates[0], &dates[6]],
            )
            .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    async fn worker_assignments_for_date(
        &self,
        worker_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<AssignmentRow>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                format!(
                    "{ASSIGNMENT_SELECT} \
                     WHERE sa.worker_id = $1 AND sa.date = $2 \
                     ORDER BY \
                       CASE sa.shift WHEN 'morning' THEN 1 WHEN 'afternoon' THEN 2 ELSE 3 END, \
                       sa.protocol_slug"
                )
                .as_str(),
                &[&worker_id, &date],
            )
            .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    // ==================== Completions ====================

    async fn toggle_complete(
        &self,
        assignment_id: i64,
        acting_worker: i64,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn().await?;

        let deleted = conn
            .execute(
                "DELETE FROM task_completions WHERE assignment_id = $1",
                &[&assignment_id],
            )
            .await?;
        if deleted > 0 {
            return Ok(false);
        }

        // ON CONFLICT absorbs a concurrent toggle that inserted first;
        // either way the assignment ends up completed.
        conn.execute(
            "INSERT INTO task_completions (assignment_id, completed_by) \
             VALUES ($1, $2) ON CONFLICT (assignment_id) DO NOTHING",
            &[&assignment_id, &acting_worker],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
                DatabaseError::NotFound
            } else {
                DatabaseError::Query(e)
            }
        })?;
        Ok(true)
    }

    // ==================== Shift definitions ====================

    async fn list_shift_definitions(&self) -> Result<Vec<ShiftDefinition>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT id, key, display_name_he, display_name_en, start_time, end_time, \
                        sort_order, active \
                 FROM shift_definitions ORDER BY sort_order, key",
                &[],
            )
            .await?;
        Ok(rows.iter().map(shift_definition_from_row).collect())
    }

    async fn create_shift_definition(
        &self,
        new: NewShiftDefinition,
    ) -> Result<ShiftDefinition, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO shift_definitions \
                     (key, display_name_he, display_name_en, start_time, end_time, sort_order) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING id, key, display_name_he, display_name_en, start_time, end_time, \
                           sort_order, active",
                &[
                    &new.key,
                    &new.display_name_he,
                    &new.display_name_en,
                    &new.start_time,
                    &new.end_time,
                    &new.sort_order,
                ],
            )
            .await
            .map_err(|e| map_unique(e, "shift key"))?;
        Ok(shift_definition_from_row(&row))
    }

    async fn update_shift_definition(
        &self,
        key: &str,
        update: ShiftDefinitionUpdate,
    ) -> Result<Option<ShiftDefinition>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "UPDATE shift_definitions SET \
                     display_name_he = COALESCE($2, display_name_he), \
                     display_name_en = COALESCE($3, display_name_en), \
                     start_time = COALESCE($4, start_time), \
                     end_time = COALESCE($5, end_time), \
                     sort_order = COALESCE($6, sort_order), \
                     active = COALESCE($7, active) \
                 WHERE key = $1 \
                 RETURNING id, key, display_name_he, display_name_en, start_time, end_time, \
                           sort_order, active",
                &[
                    &key,
                    &update.display_name_he,
                    &update.display_name_en,
                    &update.start_time,
                    &update.end_time,
                    &update.sort_order,
                    &update.active,
                ],
            )
            .await?;
        Ok(row.map(|r| shift_definition_from_row(&r)))
    }
}
