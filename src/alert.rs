use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use crate::model::{InterfaceStatuses, Task, User};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("task {task_id} is due {days} day(s) from {today}, outside the alert window")]
    OutsideWindow {
        task_id: i64,
        today: NaiveDate,
        days: i64,
    },
}

/// How close a task is to its due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    DueToday,
    DueTomorrow,
    DueInTwoDays,
}

impl Urgency {
    /// Classify a task due inside the alert window. Anything else is a
    /// selection bug and is reported as an error, never defaulted.
    pub fn classify(task: &Task, today: NaiveDate) -> Result<Urgency, AlertError> {
        let days = (task.end_date - today).num_days();
        match days {
            0 => Ok(Urgency::DueToday),
            1 => Ok(Urgency::DueTomorrow),
            2 => Ok(Urgency::DueInTwoDays),
            _ => Err(AlertError::OutsideWindow {
                task_id: task.id,
                today,
                days,
            }),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Urgency::DueToday => "DUE TODAY",
            Urgency::DueTomorrow => "Due Tomorrow",
            Urgency::DueInTwoDays => "Due in 2 Days",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How selected tasks are turned into emails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMode {
    /// One email per user listing all of their due tasks.
    Digest,
    /// One email per task and responsible user.
    PerTask,
}

impl Default for AlertMode {
    fn default() -> Self {
        AlertMode::Digest
    }
}

impl FromStr for AlertMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digest" => Ok(AlertMode::Digest),
            "per-task" | "per_task" => Ok(AlertMode::PerTask),
            other => Err(format!(
                "unknown alert mode {:?}, expected \"digest\" or \"per-task\"",
                other
            )),
        }
    }
}

/// A rendered email, ready for the mail sender.
#[derive(Debug, Clone)]
pub struct Alert {
    pub user_id: i64,
    pub username: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub task_ids: Vec<i64>,
}

/// Everything a run will send, plus the number of recipients that had
/// to be left out for lack of an address.
#[derive(Debug, Default)]
pub struct AlertPlan {
    pub alerts: Vec<Alert>,
    pub skipped: usize,
}

/// Renders alert emails for the tasks due relative to `today`.
pub struct Composer<'a> {
    today: NaiveDate,
    statuses: Option<&'a InterfaceStatuses>,
    signature: &'a str,
}

impl<'a> Composer<'a> {
    pub fn new(
        today: NaiveDate,
        statuses: Option<&'a InterfaceStatuses>,
        signature: &'a str,
    ) -> Self {
        Composer {
            today,
            statuses,
            signature,
        }
    }

    /// Compose every alert for `tasks`. Nothing is sent here, so an
    /// error leaves no email half delivered. Every task is checked
    /// against the window, including tasks nobody can be mailed about.
    pub fn plan(&self, tasks: &[Task], mode: AlertMode) -> Result<AlertPlan, AlertError> {
        for task in tasks {
            Urgency::classify(task, self.today)?;
        }

        match mode {
            AlertMode::Digest => self.plan_digests(tasks),
            AlertMode::PerTask => self.plan_per_task(tasks),
        }
    }

    fn plan_digests(&self, tasks: &[Task]) -> Result<AlertPlan, AlertError> {
        let mut tasks_by_user: BTreeMap<i64, (&User, Vec<&Task>)> = BTreeMap::new();
        for task in tasks {
            for user in &task.responsible_users {
                tasks_by_user
                    .entry(user.id)
                    .or_insert_with(|| (user, Vec::new()))
                    .1
                    .push(task);
            }
        }

        let mut plan = AlertPlan::default();
        for (user_id, (user, mut user_tasks)) in tasks_by_user {
            let recipient = match user.address() {
                Some(address) => address,
                None => {
                    warn!(user_id, username = %user.username, "User has no email address, cannot send alert");
                    plan.skipped += 1;
                    continue;
                }
            };

            user_tasks.sort_by_key(|task| task.end_date);

            let mut items = String::new();
            for task in &user_tasks {
                items.push_str(&self.render_item(task)?);
            }

            let subject = format!(
                "Deadline Reminder: You have {} {} approaching their due dates",
                user_tasks.len(),
                if user_tasks.len() == 1 { "task" } else { "tasks" }
            );
            let intro = "This is a friendly reminder about the following tasks you are \
                         responsible for that are approaching their deadlines:";

            plan.alerts.push(Alert {
                user_id,
                username: user.username.clone(),
                recipient: recipient.to_string(),
                subject,
                body: self.render_body(&user.username, intro, &items),
                task_ids: user_tasks.iter().map(|task| task.id).collect(),
            });
        }

        Ok(plan)
    }

    fn plan_per_task(&self, tasks: &[Task]) -> Result<AlertPlan, AlertError> {
        let mut plan = AlertPlan::default();
        for task in tasks {
            let urgency = Urgency::classify(task, self.today)?;
            let item = self.render_item(task)?;

            for user in &task.responsible_users {
                let recipient = match user.address() {
                    Some(address) => address,
                    None => {
                        warn!(
                            user_id = user.id,
                            username = %user.username,
                            task_id = task.id,
                            "User has no email address, cannot send task alert"
                        );
                        plan.skipped += 1;
                        continue;
                    }
                };

                let intro = "This is a reminder about a task you are responsible for \
                             that is approaching its deadline:";

                plan.alerts.push(Alert {
                    user_id: user.id,
                    username: user.username.clone(),
                    recipient: recipient.to_string(),
                    subject: format!("Deadline Alert: {} - {}", urgency, task.task_name),
                    body: self.render_body(&user.username, intro, &item),
                    task_ids: vec![task.id],
                });
            }
        }

        Ok(plan)
    }

    fn render_item(&self, task: &Task) -> Result<String, AlertError> {
        let urgency = Urgency::classify(task, self.today)?;

        let status = match self.statuses {
            Some(statuses) => format!(
                " (Status: {})",
                escape_html(statuses.lookup(task.project.id, &task.interface_name))
            ),
            None => String::new(),
        };

        Ok(format!(
            r#"
                <li style="margin-bottom: 15px; padding: 10px; border-left: 4px solid #f59e0b; background-color: #fef9c3;">
                    <strong>Project:</strong> {project}<br>
                    <strong>Interface:</strong> {interface}{status}<br>
                    <strong>Task:</strong> {task}<br>
                    <strong>Due Date:</strong> {due} <strong style="color: #b45309;">({urgency})</strong>
                </li>"#,
            project = escape_html(&task.project.name),
            interface = escape_html(&display_interface_name(&task.interface_name)),
            status = status,
            task = escape_html(&task.task_name),
            due = format_due_date(task.end_date),
            urgency = urgency,
        ))
    }

    fn render_body(&self, username: &str, intro: &str, items: &str) -> String {
        format!(
            r#"<html>
<body style="font-family: sans-serif;">
    <p>Hi {username},</p>
    <p>{intro}</p>
    <ul style="list-style: none; padding: 0;">{items}
    </ul>
    <p>Please ensure they are completed on time.</p>
    <p>Thanks,<br>{signature}</p>
</body>
</html>
"#,
            username = escape_html(username),
            intro = intro,
            items = items,
            signature = escape_html(self.signature),
        )
    }
}

/// Interface names are stored snake_cased; mails show them with spaces.
pub fn display_interface_name(interface_name: &str) -> String {
    interface_name.replace('_', " ")
}

/// Full weekday, month name, day and year, e.g. "Monday, June 10, 2024".
pub fn format_due_date(date: NaiveDate) -> String {
    date.format("%A, %B %d, %Y").to_string()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
