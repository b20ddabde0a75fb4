//! In-memory database with the tables the alerter reads, plus helpers to
//! fill it. The real schema belongs to the application that owns the data.

use chrono::NaiveDate;
use rusqlite::{params, Connection};

pub const PROJECT_NAME: &str = "Apollo";

fn create_tables(db: &Connection) {
    db.execute_batch(
        "CREATE TABLE projects (
             id              INTEGER PRIMARY KEY AUTOINCREMENT,
             project_name    TEXT UNIQUE
         );
         CREATE TABLE users (
             id              INTEGER PRIMARY KEY AUTOINCREMENT,
             username        TEXT,
             email           TEXT
         );
         CREATE TABLE project_schedule_tasks (
             id              INTEGER PRIMARY KEY AUTOINCREMENT,
             project_id      INTEGER NOT NULL REFERENCES projects(id),
             interface_name  TEXT NOT NULL,
             task_name       TEXT NOT NULL,
             start_date      DATE,
             end_date        DATE,
             status          TEXT DEFAULT 'Pendente'
         );
         CREATE TABLE task_responsible_association (
             task_id         INTEGER NOT NULL REFERENCES project_schedule_tasks(id),
             user_id         INTEGER NOT NULL REFERENCES users(id),
             PRIMARY KEY (task_id, user_id)
         );",
    )
    .expect("Failed to create alerter tables.");

    db.execute(
        "INSERT INTO projects (id, project_name) VALUES (1, ?1)",
        params![PROJECT_NAME],
    )
    .expect("Failed to insert project.");
}

/// A database with every table, including the interface status one.
pub fn database() -> Connection {
    let db = database_without_statuses();
    db.execute(
        "CREATE TABLE project_interface_status (
             project_id      INTEGER NOT NULL REFERENCES projects(id),
             interface_name  TEXT NOT NULL,
             status          TEXT,
             PRIMARY KEY (project_id, interface_name)
         )",
        [],
    )
    .expect("Failed to create interface status table.");
    db
}

pub fn database_without_statuses() -> Connection {
    let db = Connection::open_in_memory().expect("Failed to open in-memory database.");
    create_tables(&db);
    db
}

pub fn user(db: &Connection, username: &str, email: Option<&str>) -> i64 {
    db.execute(
        "INSERT INTO users (username, email) VALUES (?1, ?2)",
        params![username, email],
    )
    .expect("Failed to insert user.");
    db.last_insert_rowid()
}

pub fn task(
    db: &Connection,
    project_id: i64,
    interface_name: &str,
    task_name: &str,
    end_date: Option<NaiveDate>,
    status: &str,
) -> i64 {
    db.execute(
        "INSERT INTO project_schedule_tasks (project_id, interface_name, task_name, end_date, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![project_id, interface_name, task_name, end_date, status],
    )
    .expect("Failed to insert task.");
    db.last_insert_rowid()
}

pub fn assign(db: &Connection, task_id: i64, user_id: i64) {
    db.execute(
        "INSERT INTO task_responsible_association (task_id, user_id) VALUES (?1, ?2)",
        params![task_id, user_id],
    )
    .expect("Failed to assign task.");
}

pub fn interface_status(db: &Connection, project_id: i64, interface_name: &str, status: &str) {
    db.execute(
        "INSERT INTO project_interface_status (project_id, interface_name, status) VALUES (?1, ?2, ?3)",
        params![project_id, interface_name, status],
    )
    .expect("Failed to insert interface status.");
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}
