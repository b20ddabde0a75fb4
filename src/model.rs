use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Status value that marks a task as finished. Finished tasks never raise alerts.
pub const COMPLETED_STATUS: &str = "Concluído";

/// Label used when an interface has no entry in the status table.
pub const UNKNOWN_STATUS: &str = "Status Unknown";

/// Number of days, starting today, that are checked for deadlines.
pub const ALERT_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
}

impl User {
    /// The address to mail, if the user has a usable one.
    pub fn address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// A scheduled task due inside the alert window, saved as an entry in
/// the project_schedule_tasks table, with its project and responsible
/// users already resolved.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub project: Project,
    pub interface_name: String,
    pub task_name: String,
    pub end_date: NaiveDate,
    pub status: Option<String>,
    pub responsible_users: Vec<User>,
}

/// Interface statuses keyed by (project id, interface name).
#[derive(Debug, Default)]
pub struct InterfaceStatuses {
    statuses: HashMap<(i64, String), String>,
}

impl InterfaceStatuses {
    pub fn new(statuses: HashMap<(i64, String), String>) -> Self {
        InterfaceStatuses { statuses }
    }

    /// Status of an interface, or `UNKNOWN_STATUS` when nothing is recorded.
    pub fn lookup(&self, project_id: i64, interface_name: &str) -> &str {
        self.statuses
            .get(&(project_id, interface_name.to_string()))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_STATUS)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }
}

/// The days checked for deadlines: today, tomorrow and the day after.
pub fn alert_window(today: NaiveDate) -> [NaiveDate; ALERT_WINDOW_DAYS as usize] {
    [today, today + Duration::days(1), today + Duration::days(2)]
}

/// Open the task database read only.
pub fn open_database(path: &std::path::Path) -> Result<Connection> {
    let db = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open task database {}.", path.display()))?;
    Ok(db)
}

/// Return every unfinished task due inside the alert window of `today`,
/// ordered by due date. Projects are joined in the same query and the
/// responsible users of all selected tasks are fetched in one more
/// query, so there is no follow-up query per task.
///
/// A NULL status is not the completed marker, so those tasks are
/// selected: the filter is `IS NOT`, which keeps NULLs, not `!=`.
pub fn select_due_tasks(db: &Connection, today: NaiveDate) -> Result<Vec<Task>> {
    let [day0, day1, day2] = alert_window(today);

    let mut users_by_task = responsible_users(db, today)?;

    let mut stmt = db
        .prepare(
            "SELECT t.id, t.interface_name, t.task_name, t.end_date, t.status, p.id, p.project_name
             FROM project_schedule_tasks t
             JOIN projects p ON p.id = t.project_id
             WHERE t.end_date IN (?1, ?2, ?3) AND t.status IS NOT ?4
             ORDER BY t.end_date, t.id",
        )
        .context("Failed to prepare due task query.")?;

    let mapped_rows = stmt
        .query_map(params![day0, day1, day2, COMPLETED_STATUS], |row| {
            task_from_row(row)
        })
        .context("Failed to fetch due tasks from database.")?;

    let mut tasks = Vec::new();
    for task in mapped_rows {
        let mut task = task.context("Failed to read due task row.")?;
        task.responsible_users = users_by_task.remove(&task.id).unwrap_or_default();
        tasks.push(task);
    }

    Ok(tasks)
}

/// Responsible users of every task the due task query selects, keyed by task id.
fn responsible_users(db: &Connection, today: NaiveDate) -> Result<HashMap<i64, Vec<User>>> {
    let [day0, day1, day2] = alert_window(today);

    let mut stmt = db
        .prepare(
            "SELECT a.task_id, u.id, u.username, u.email
             FROM task_responsible_association a
             JOIN users u ON u.id = a.user_id
             JOIN project_schedule_tasks t ON t.id = a.task_id
             WHERE t.end_date IN (?1, ?2, ?3) AND t.status IS NOT ?4
             ORDER BY a.task_id, u.id",
        )
        .context("Failed to prepare responsible users query.")?;

    let mapped_rows = stmt
        .query_map(params![day0, day1, day2, COMPLETED_STATUS], |row| {
            Ok((row.get::<_, i64>(0)?, user_from_row(row)?))
        })
        .context("Failed to fetch responsible users from database.")?;

    let mut users: HashMap<i64, Vec<User>> = HashMap::new();
    for entry in mapped_rows {
        let (task_id, user) = entry.context("Failed to read responsible user row.")?;
        users.entry(task_id).or_default().push(user);
    }

    Ok(users)
}

/// Preload the whole interface status table. Returns `None` when the
/// database has no such table, which turns status enrichment off.
pub fn load_interface_statuses(db: &Connection) -> Result<Option<InterfaceStatuses>> {
    let table = db
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'project_interface_status'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .context("Failed to look up the interface status table.")?;

    if table.is_none() {
        return Ok(None);
    }

    let mut stmt = db
        .prepare("SELECT project_id, interface_name, status FROM project_interface_status")
        .context("Failed to fetch interface statuses from database.")?;

    let mapped_rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .context("Failed to fetch interface statuses from database.")?;

    let mut statuses = HashMap::new();
    for entry in mapped_rows {
        // rows without an interface or a status have nothing to show
        if let (project_id, Some(interface_name), Some(status)) =
            entry.context("Failed to read interface status row.")?
        {
            statuses.insert((project_id, interface_name), status);
        }
    }

    Ok(Some(InterfaceStatuses::new(statuses)))
}

/// Return a task from a row in this order: [id, interface_name,
/// task_name, end_date, status, project id, project_name]. Responsible
/// users are filled in afterwards.
pub fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let project_id: i64 = row.get(5)?;
    let task = Task {
        id: row.get(0)?,
        interface_name: row.get(1)?,
        task_name: row.get(2)?,
        end_date: row.get::<_, NaiveDate>(3)?,
        status: row.get::<_, Option<String>>(4)?,
        project: Project {
            id: project_id,
            name: row
                .get::<_, Option<String>>(6)?
                .unwrap_or_else(|| format!("Project #{}", project_id)),
        },
        responsible_users: Vec::new(),
    };
    Ok(task)
}

/// Return a user from a row in this order: [_, id, username, email].
/// Users without a username are named by their email, or by id.
fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let id: i64 = row.get(1)?;
    let email = row.get::<_, Option<String>>(3)?;
    let username = row
        .get::<_, Option<String>>(2)?
        .filter(|name| !name.trim().is_empty())
        .or_else(|| email.clone().filter(|email| !email.trim().is_empty()))
        .unwrap_or_else(|| format!("User #{}", id));
    Ok(User {
        id,
        username,
        email,
    })
}
