//! Schedule mutation and query tools.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::catalog::{Language, ProtocolCatalog};
use crate::db::{Database, Shift};
use crate::error::ToolError;
use crate::resolve::{resolve_protocol, resolve_worker};
use crate::tools::{
    optional_str, require_str, Tool, ToolResult, ERR_PROTOCOL_NOT_FOUND, ERR_WORKER_NOT_FOUND,
};
use crate::week::{parse_date, sunday_of_week, week_dates, DAY_NAMES};

fn parse_date_param(params: &serde_json::Value, field: &str) -> Result<chrono::NaiveDate, ToolError> {
    let raw = require_str(params, field)?;
    parse_date(raw)
        .ok_or_else(|| ToolError::InvalidParameters(format!("'{field}' must be YYYY-MM-DD, got '{raw}'")))
}

fn require_shift_param(params: &serde_json::Value, field: &str) -> Result<Shift, ToolError> {
    let raw = require_str(params, field)?;
    Shift::parse(raw).ok_or_else(|| {
        ToolError::InvalidParameters(format!(
            "'{field}' must be morning, afternoon, or night, got '{raw}'"
        ))
    })
}

fn optional_shift_param(
    params: &serde_json::Value,
    field: &str,
) -> Result<Option<Shift>, ToolError> {
    match optional_str(params, field) {
        None => Ok(None),
        Some(raw) => Shift::parse(raw)
            .map(Some)
            .ok_or_else(|| {
                ToolError::InvalidParameters(format!(
                    "'{field}' must be morning, afternoon, or night, got '{raw}'"
                ))
            }),
    }
}

/// Assign a protocol to a worker on a date and shift.
///
/// Re-assigning the same tuple is not an error; it merges notes into the
/// existing row.
pub struct AssignTaskTool {
    db: Arc<dyn Database>,
    catalog: Arc<dyn ProtocolCatalog>,
}

impl AssignTaskTool {
    pub fn new(db: Arc<dyn Database>, catalog: Arc<dyn ProtocolCatalog>) -> Self {
        Self { db, catalog }
    }
}

#[async_trait]
impl Tool for AssignTaskTool {
    fn name(&self) -> &str {
        "assign_task"
    }

    fn description(&self) -> &str {
        "Assign a protocol task to a worker on a specific date and shift. \
         Worker and protocol accept approximate names."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "worker_name": {"type": "string", "description": "Worker name, may be partial"},
                "protocol_slug": {"type": "string", "description": "Protocol slug or title, may be partial"},
                "date": {"type": "string", "description": "Date in YYYY-MM-DD"},
                "shift": {"type": "string", "enum": ["morning", "afternoon", "night"]},
                "notes": {"type": "string", "description": "Optional note attached to the assignment"}
            },
            "required": ["worker_name", "protocol_slug", "date", "shift"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, ToolError> {
        let worker_query = require_str(&params, "worker_name")?;
        let protocol_query = require_str(&params, "protocol_slug")?;
        let date = parse_date_param(&params, "date")?;
        let shift = require_shift_param(&params, "shift")?;
        let notes = optional_str(&params, "notes");

        let workers = self.db.list_workers().await?;
        let worker = match resolve_worker(worker_query, &workers) {
            Ok(w) => w,
            Err(failure) => {
                return Ok(ToolResult::fail(failure.message("worker"), ERR_WORKER_NOT_FOUND))
            }
        };
        let protocols = self.catalog.protocols(Language::He);
        let protocol = match resolve_protocol(protocol_query, &protocols) {
            Ok(p) => p,
            Err(failure) => {
                return Ok(ToolResult::fail(
                    failure.message("protocol"),
                    ERR_PROTOCOL_NOT_FOUND,
                ))
            }
        };

        self.db
            .assign(worker.id, &protocol.slug, date, shift, notes)
            .await?;

        Ok(ToolResult::ok(format!(
            "Assigned '{}' to {} on {} ({} shift)",
            protocol.title, worker.name, date, shift
        )))
    }
}

/// Remove a single assignment identified by its natural key.
pub struct RemoveTaskTool {
    db: Arc<dyn Database>,
    catalog: Arc<dyn ProtocolCatalog>,
}

impl RemoveTaskTool {
    pub fn new(db: Arc<dyn Database>, catalog: Arc<dyn ProtocolCatalog>) -> Self {
        Self { db, catalog }
    }
}

#[async_trait]
impl Tool for RemoveTaskTool {
    fn name(&self) -> &str {
        "remove_task"
    }

    fn description(&self) -> &str {
        "Remove a worker's assignment of a protocol on a date and shift."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "worker_name": {"type": "string"},
                "protocol_slug": {"type": "string"},
                "date": {"type": "string", "description": "Date in YYYY-MM-DD"},
                "shift": {"type": "string", "enum": ["morning", "afternoon", "night"]}
            },
            "required": ["worker_name", "protocol_slug", "date", "shift"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, ToolError> {
        let worker_query = require_str(&params, "worker_name")?;
        let protocol_query = require_str(&params, "protocol_slug")?;
        let date = parse_date_param(&params, "date")?;
        let shift = require_shift_param(&params, "shift")?;

        let workers = self.db.list_workers().await?;
        let worker = match resolve_worker(worker_query, &workers) {
            Ok(w) => w,
            Err(failure) => {
                return Ok(ToolResult::fail(failure.message("worker"), ERR_WORKER_NOT_FOUND))
            }
        };
        let protocols = self.catalog.protocols(Language::He);
        let protocol = match resolve_protocol(protocol_query, &protocols) {
            Ok(p) => p,
            Err(failure) => {
                return Ok(ToolResult::fail(
                    failure.message("protocol"),
                    ERR_PROTOCOL_NOT_FOUND,
                ))
            }
        };

        let removed = self.db.remove(worker.id, &protocol.slug, date, shift).await?;

        if removed {
            Ok(ToolResult::ok(format!(
                "Removed '{}' from {} on {} ({} shift)",
                protocol.title, worker.name, date, shift
            )))
        } else {
            Ok(ToolResult::ok(format!(
                "{} was not assigned '{}' on {} ({} shift); nothing to remove",
                worker.name, protocol.title, date, shift
            )))
        }
    }
}

/// Copy a whole week's assignments onto another week.
pub struct CopyWeekTool {
    db: Arc<dyn Database>,
}

impl CopyWeekTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for CopyWeekTool {
    fn name(&self) -> &str {
        "copy_week"
    }

    fn description(&self) -> &str {
        "Copy every assignment from one week to another. Dates may fall \
         anywhere in each week; they snap to that week's Sunday. The target \
         week's existing assignments are replaced."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "source_week": {"type": "string", "description": "The source week's Sunday, YYYY-MM-DD"},
                "target_week": {"type": "string", "description": "The target week's Sunday, YYYY-MM-DD"}
            },
            "required": ["source_week", "target_week"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, ToolError> {
        let source = sunday_of_week(parse_date_param(&params, "source_week")?);
        let target = sunday_of_week(parse_date_param(&params, "target_week")?);

        if source == target {
            return Err(ToolError::InvalidParameters(
                "source and target fall in the same week".to_string(),
            ));
        }

        let copied = self.db.copy_week(source, target).await?;
        Ok(ToolResult::ok(format!(
            "Copied {copied} assignments from the week of {source} to the week of {target}"
        )))
    }
}

/// Read back a week's schedule as indented text.
pub struct GetScheduleTool {
    db: Arc<dyn Database>,
    catalog: Arc<dyn ProtocolCatalog>,
}

impl GetScheduleTool {
    pub fn new(db: Arc<dyn Database>, catalog: Arc<dyn ProtocolCatalog>) -> Self {
        Self { db, catalog }
    }
}

#[async_trait]
impl Tool for GetScheduleTool {
    fn name(&self) -> &str {
        "get_schedule"
    }

    fn description(&self) -> &str {
        "Get the schedule for the week containing the given date. Lists each \
         day's assignments grouped by shift."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "week": {"type": "string", "description": "The week's Sunday (any date in the week is accepted), YYYY-MM-DD"}
            },
            "required": ["week"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, ToolError> {
        let sunday = sunday_of_week(parse_date_param(&params, "week")?);
        let rows = self.db.week_assignments(sunday).await?;
        let titles = self.catalog.title_map(Language::He);
        let dates = week_dates(sunday);

        if rows.is_empty() {
            return Ok(ToolResult::ok(format!(
                "The week of {sunday} has no assignments yet"
            )));
        }

        let mut out = format!("Schedule for the week of {sunday}:\n");
        for (i, date) in dates.iter().enumerate() {
            for shift in Shift::ALL {
                let entries: Vec<_> = rows
                    .iter()
                    .filter(|r| r.date == *date && r.shift == shift)
                    .collect();
                if entries.is_empty() {
                    continue;
                }
                let _ = writeln!(out, "{} ({date}) {shift}:", DAY_NAMES[i]);
                for entry in entries {
                    let title = titles
                        .get(&entry.protocol_slug)
                        .map(String::as_str)
                        .unwrap_or(&entry.protocol_slug);
                    let _ = write!(out, "  {}: {title}", entry.worker_name);
                    if let Some(notes) = &entry.notes {
                        let _ = write!(out, " [{notes}]");
                    }
                    if entry.completed {
                        out.push_str(" (done)");
                    }
                    out.push('\n');
                }
            }
        }

        Ok(ToolResult::ok(out.trim_end().to_string()))
    }
}

/// Clear all assignments on a date, optionally one shift only.
pub struct ClearDayTool {
    db: Arc<dyn Database>,
}

impl ClearDayTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ClearDayTool {
    fn name(&self) -> &str {
        "clear_day"
    }

    fn description(&self) -> &str {
        "Delete all assignments on a date. Pass a shift to clear only that \
         shift's assignments."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "date": {"type": "string", "description": "Date in YYYY-MM-DD"},
                "shift": {"type": "string", "enum": ["morning", "afternoon", "night"]}
            },
            "required": ["date"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, ToolError> {
        let date = parse_date_param(&params, "date")?;
        let shift = optional_shift_param(&params, "shift")?;

        let cleared = self.db.clear_day(date, shift).await?;
        let scope = match shift {
            Some(shift) => format!("the {shift} shift of {date}"),
            None => format!("{date}"),
        };
        Ok(ToolResult::ok(format!(
            "Cleared {cleared} assignments from {scope}"
        )))
    }
}
