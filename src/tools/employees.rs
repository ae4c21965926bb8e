//! Roster management tools.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::auth::hash_pin;
use crate::db::{Database, NewWorker, Shift, WorkerUpdate};
use crate::error::{DatabaseError, ToolError};
use crate::resolve::resolve_worker;
use crate::tools::{
    optional_str, Tool, ToolResult, ERR_MISSING_FIELDS, ERR_NO_FIELDS, ERR_PHONE_EXISTS,
    ERR_WORKER_NOT_FOUND,
};

/// Keep digits only. Phones arrive in chat as "050-123 4567" and worse.
fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// List the roster, including deactivated workers.
pub struct ListEmployeesTool {
    db: Arc<dyn Database>,
}

impl ListEmployeesTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ListEmployeesTool {
    fn name(&self) -> &str {
        "list_employees"
    }

    fn description(&self) -> &str {
        "List all workers with their role, phone, default shift, and status."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolResult, ToolError> {
        let workers = self.db.list_all_workers().await?;
        if workers.is_empty() {
            return Ok(ToolResult::ok("No workers are registered yet"));
        }

        let mut out = format!("{} workers:\n", workers.len());
        for w in workers {
            let _ = write!(
                out,
                "  {} - {} - {} - {} shift",
                w.name, w.role, w.phone, w.default_shift
            );
            if w.is_manager {
                out.push_str(" - manager");
            }
            if !w.active {
                out.push_str(" - INACTIVE");
            }
            out.push('\n');
        }
        Ok(ToolResult::ok(out.trim_end().to_string()))
    }
}

/// Onboard a new worker with a hashed PIN.
pub struct AddEmployeeTool {
    db: Arc<dyn Database>,
}

impl AddEmployeeTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for AddEmployeeTool {
    fn name(&self) -> &str {
        "add_employee"
    }

    fn description(&self) -> &str {
        "Register a new worker. Requires name, role, phone, a 4-6 digit PIN \
         for login, and a default shift."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "role": {"type": "string"},
                "phone": {"type": "string"},
                "pin": {"type": "string", "description": "4-6 digit login PIN"},
                "default_shift": {"type": "string", "enum": ["morning", "afternoon", "night"]}
            },
            "required": ["name", "role", "phone", "pin", "default_shift"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, ToolError> {
        let mut missing = Vec::new();
        for field in ["name", "role", "phone", "pin", "default_shift"] {
            if optional_str(&params, field).is_none() {
                missing.push(field);
            }
        }
        if !missing.is_empty() {
            return Ok(ToolResult::fail(
                format!("Missing required fields: {}", missing.join(", ")),
                ERR_MISSING_FIELDS,
            ));
        }

        let name = optional_str(&params, "name").unwrap_or_default().to_string();
        let role = optional_str(&params, "role").unwrap_or_default().to_string();
        let phone = normalize_phone(optional_str(&params, "phone").unwrap_or_default());
        let pin = optional_str(&params, "pin").unwrap_or_default();
        let shift_raw = optional_str(&params, "default_shift").unwrap_or_default();

        if phone.len() < 9 {
            return Err(ToolError::InvalidParameters(
                "phone must have at least 9 digits".to_string(),
            ));
        }
        if pin.len() < 4 || pin.len() > 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(ToolError::InvalidParameters(
                "pin must be 4-6 digits".to_string(),
            ));
        }
        let Some(default_shift) = Shift::parse(shift_raw) else {
            return Err(ToolError::InvalidParameters(format!(
                "default_shift must be morning, afternoon, or night, got '{shift_raw}'"
            )));
        };

        let new = NewWorker {
            pin_hash: hash_pin(pin, &phone),
            name: name.clone(),
            role,
            phone,
            default_shift,
            is_manager: false,
        };

        match self.db.create_worker(new).await {
            Ok(worker) => Ok(ToolResult::ok(format!(
                "Added {} ({}) with {} as their default shift",
                worker.name, worker.role, worker.default_shift
            ))),
            Err(DatabaseError::UniqueViolation(_)) => Ok(ToolResult::fail(
                "A worker with that phone number already exists".to_string(),
                ERR_PHONE_EXISTS,
            )),
            Err(err) => Err(err.into()),
        }
    }
}

/// Update an existing worker's details.
///
/// PINs are deliberately not updatable through chat; a manager asking the
/// assistant to change one gets refused here rather than relying on the
/// model to decline.
pub struct UpdateEmployeeTool {
    db: Arc<dyn Database>,
}

impl UpdateEmployeeTool {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for UpdateEmployeeTool {
    fn name(&self) -> &str {
        "update_employee"
    }

    fn description(&self) -> &str {
        "Update a worker's role, default shift, or active status. At least \
         one field to change must be given. PINs cannot be changed here."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "employee_name": {"type": "string", "description": "Current name, may be partial"},
                "role": {"type": "string"},
                "default_shift": {"type": "string", "enum": ["morning", "afternoon", "night"]},
                "active": {"type": "boolean", "description": "false deactivates the worker"}
            },
            "required": ["employee_name"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, ToolError> {
        let Some(worker_query) = optional_str(&params, "employee_name") else {
            return Ok(ToolResult::fail(
                "Missing required fields: employee_name".to_string(),
                ERR_MISSING_FIELDS,
            ));
        };

        if optional_str(&params, "pin").is_some() {
            return Err(ToolError::InvalidParameters(
                "PINs cannot be changed through chat".to_string(),
            ));
        }

        let default_shift = match optional_str(&params, "default_shift") {
            None => None,
            Some(raw) => match Shift::parse(raw) {
                Some(shift) => Some(shift),
                None => {
                    return Err(ToolError::InvalidParameters(format!(
                        "default_shift must be morning, afternoon, or night, got '{raw}'"
                    )))
                }
            },
        };

        let update = WorkerUpdate {
            role: optional_str(&params, "role").map(str::to_string),
            default_shift,
            active: params.get("active").and_then(|v| v.as_bool()),
            ..Default::default()
        };
        if update.is_empty() {
            return Ok(ToolResult::fail(
                "No fields to update were given".to_string(),
                ERR_NO_FIELDS,
            ));
        }

        // Resolve against the full roster so a deactivated worker can be
        // brought back.
        let workers = self.db.list_all_workers().await?;
        let worker = match resolve_worker(worker_query, &workers) {
            Ok(w) => w,
            Err(failure) => {
                return Ok(ToolResult::fail(failure.message("worker"), ERR_WORKER_NOT_FOUND))
            }
        };

        match self.db.update_worker(worker.id, update).await? {
            Some(updated) => Ok(ToolResult::ok(format!("Updated {}", updated.name))),
            None => Ok(ToolResult::fail(
                format!("No worker found matching '{worker_query}'"),
                ERR_WORKER_NOT_FOUND,
            )),
        }
    }
}
