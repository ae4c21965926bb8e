//! System prompt assembly.
//!
//! The prompt is rebuilt from live data on every turn so the model always
//! sees the current roster, catalog, and week. The model plans in dates,
//! not day names, so the week's dates are spelled out explicitly.

use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::catalog::{Language, Protocol, ProtocolCatalog};
use crate::db::{Database, ShiftDefinition, Worker};
use crate::error::DatabaseError;
use crate::schedule::{week_schedule, WeekSchedule};
use crate::week::{sunday_of_week, week_dates, DAY_NAMES};

/// Build the full system prompt for a conversation turn.
pub async fn build_system_prompt(
    db: &dyn Database,
    catalog: &dyn ProtocolCatalog,
    today: NaiveDate,
) -> Result<String, DatabaseError> {
    let workers = db.list_workers().await?;
    let shift_defs = db.list_shift_definitions().await?;
    let protocols = catalog.protocols(Language::He);
    let sunday = sunday_of_week(today);
    let week = week_schedule(db, catalog, sunday, Language::He).await?;
    Ok(render_system_prompt(
        today, &workers, &protocols, &shift_defs, &week,
    ))
}

fn render_system_prompt(
    today: NaiveDate,
    workers: &[Worker],
    protocols: &[Protocol],
    shift_defs: &[ShiftDefinition],
    week: &WeekSchedule,
) -> String {
    let mut p = String::new();

    p.push_str(
        "You are the shift scheduling assistant for Pure Blue Fish, a land-based \
         fish farm. You help the manager plan which worker performs which \
         operational protocol on which day and shift. Answer in the language \
         the manager writes in (usually Hebrew).\n\n",
    );

    let _ = writeln!(p, "Today is {} ({}).", today, day_name(today));
    let _ = writeln!(
        p,
        "The schedule week runs Sunday to Saturday. This week's dates are:"
    );
    for (i, date) in week_dates(week.week_start).iter().enumerate() {
        let _ = writeln!(p, "- {}: {}", DAY_NAMES[i], date);
    }
    p.push('\n');

    p.push_str("Workers:\n");
    if workers.is_empty() {
        p.push_str("(no workers registered yet)\n");
    }
    for w in workers {
        let _ = writeln!(
            p,
            "- {} ({}, default shift: {})",
            w.name, w.role, w.default_shift
        );
    }
    p.push('\n');

    p.push_str("Protocols that can be assigned:\n");
    for protocol in protocols {
        let _ = write!(p, "- {} [{}]", protocol.title, protocol.slug);
        if let Some(freq) = &protocol.frequency {
            let _ = write!(p, " ({freq})");
        }
        p.push('\n');
    }
    p.push('\n');

    p.push_str("Shifts:\n");
    for def in shift_defs.iter().filter(|d| d.active) {
        let _ = writeln!(
            p,
            "- {} ({}): {}-{}",
            def.key, def.display_name_he, def.start_time, def.end_time
        );
    }
    p.push('\n');

    p.push_str("Current week schedule:\n");
    let mut any = false;
    for day in &week.days {
        for slot in &day.shifts {
            for entry in &slot.entries {
                any = true;
                let _ = write!(
                    p,
                    "- {} {} {}: {} -> {}",
                    day.day_name, day.date, slot.shift, entry.worker_name, entry.protocol_title
                );
                if let Some(notes) = &entry.notes {
                    let _ = write!(p, " [{notes}]");
                }
                if entry.completed {
                    p.push_str(" (done)");
                }
                p.push('\n');
            }
        }
    }
    if !any {
        p.push_str("(empty - no assignments this week)\n");
    }
    p.push('\n');

    p.push_str(
        "Rules:\n\
         - Use the tools to read and change the schedule; never invent state.\n\
         - Always pass dates as YYYY-MM-DD using the dates listed above.\n\
         - When the manager says \"every day\" or \"all week\", make one \
           assignment per date, all 7 days.\n\
         - If a worker or protocol reference is unclear or matches several \
           people, ask instead of guessing.\n\
         - Never set or change a worker's PIN; that is not possible here.\n",
    );
    if !any {
        p.push_str(
            "- The week is empty. If the manager wants a starting point, \
             suggest copying last week with copy_week.\n",
        );
    }

    p
}

fn day_name(date: NaiveDate) -> &'static str {
    use chrono::Datelike;
    DAY_NAMES[date.weekday().num_days_from_sunday() as usize]
}
