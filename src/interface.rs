use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::alert::{AlertMode, Composer};
use crate::mailer::MailSender;
use crate::model::{alert_window, load_interface_statuses, select_due_tasks};

/// What happened during one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks due inside the window.
    pub selected: usize,
    pub sent: usize,
    /// Recipients left out because they have no email address.
    pub skipped: usize,
    pub failed: usize,
    /// Alerts composed but never handed to a mailer.
    pub unsent: usize,
}

/// Find the tasks due around `today` and mail their responsible users.
/// With no mailer, alerts are composed and counted as `unsent`.
///
/// Storage and composition errors abort the run. A failed send is
/// logged and counted, and the remaining alerts still go out.
pub fn check_deadlines(
    db: &Connection,
    today: NaiveDate,
    mode: AlertMode,
    signature: &str,
    mailer: Option<&mut dyn MailSender>,
) -> Result<RunSummary> {
    let window = alert_window(today);
    info!(
        today = %window[0],
        tomorrow = %window[1],
        day_after = %window[2],
        "Checking for deadlines"
    );

    let statuses = load_interface_statuses(db)?;
    match &statuses {
        Some(statuses) => info!(count = statuses.len(), "Loaded interface statuses"),
        None => debug!("No interface status table, statuses will not be shown"),
    }

    let tasks = select_due_tasks(db, today)?;
    let mut summary = RunSummary {
        selected: tasks.len(),
        ..RunSummary::default()
    };

    if tasks.is_empty() {
        info!("No upcoming deadlines found");
        return Ok(summary);
    }
    info!(count = tasks.len(), "Found tasks with upcoming deadlines");

    for task in &tasks {
        debug!(
            task_id = task.id,
            task = %task.task_name,
            due = %task.end_date,
            status = ?task.status,
            responsible = task.responsible_users.len(),
            "Selected task"
        );
    }

    let composer = Composer::new(today, statuses.as_ref(), signature);
    let plan = composer.plan(&tasks, mode)?;
    summary.skipped = plan.skipped;

    let mailer = match mailer {
        Some(mailer) => mailer,
        None => {
            summary.unsent = plan.alerts.len();
            return Ok(summary);
        }
    };

    for alert in &plan.alerts {
        match mailer.send(&alert.recipient, &alert.subject, &alert.body) {
            Ok(()) => {
                summary.sent += 1;
                info!(
                    user_id = alert.user_id,
                    username = %alert.username,
                    recipient = %alert.recipient,
                    subject = %alert.subject,
                    tasks = alert.task_ids.len(),
                    "Sent alert"
                );
            }
            Err(err) => {
                summary.failed += 1;
                let reason = format!("{:#}", err);
                error!(
                    recipient = %alert.recipient,
                    subject = %alert.subject,
                    error = %reason,
                    "Failed to send alert"
                );
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::fixtures::{self, date};
    use crate::mailer::testing::RecordingMailer;
    use crate::model::COMPLETED_STATUS;

    fn today() -> NaiveDate {
        date(2024, 6, 10)
    }

    #[test]
    fn completed_task_never_reaches_the_inbox() {
        let db = fixtures::database();
        let u1 = fixtures::user(&db, "u1", Some("u1@x.com"));
        let a = fixtures::task(&db, 1, "backend_api", "Task A", Some(today()), "Pendente");
        let b = fixtures::task(&db, 1, "backend_api", "Task B", Some(date(2024, 6, 12)), COMPLETED_STATUS);
        fixtures::assign(&db, a, u1);
        fixtures::assign(&db, b, u1);
        let mut mailer = RecordingMailer::default();

        let summary = check_deadlines(&db, today(), AlertMode::Digest, "Alerts", Some(&mut mailer)).unwrap();

        assert_eq!(summary, RunSummary { selected: 1, sent: 1, skipped: 0, failed: 0, unsent: 0 });
        assert_eq!(mailer.sent.len(), 1);
        let mail = &mailer.sent[0];
        assert_eq!(mail.recipient, "u1@x.com");
        assert!(mail.body.contains("Task A"));
        assert!(mail.body.contains("DUE TODAY"));
        assert!(!mail.body.contains("Task B"));
    }

    #[test]
    fn empty_window_sends_nothing() {
        let db = fixtures::database();
        let u1 = fixtures::user(&db, "u1", Some("u1@x.com"));
        let later = fixtures::task(&db, 1, "api", "later", Some(today() + Duration::days(10)), "Pendente");
        fixtures::assign(&db, later, u1);
        let mut mailer = RecordingMailer::default();

        let summary = check_deadlines(&db, today(), AlertMode::Digest, "Alerts", Some(&mut mailer)).unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(mailer.sent.is_empty());
    }

    #[test]
    fn digest_mails_each_user_once() {
        let db = fixtures::database();
        let u1 = fixtures::user(&db, "u1", Some("u1@x.com"));
        let u2 = fixtures::user(&db, "u2", Some("u2@x.com"));
        for offset in 0..3 {
            let task = fixtures::task(&db, 1, "api", &format!("task {}", offset), Some(today() + Duration::days(offset)), "Pendente");
            fixtures::assign(&db, task, u1);
            if offset == 1 {
                fixtures::assign(&db, task, u2);
            }
        }
        let mut mailer = RecordingMailer::default();

        let summary = check_deadlines(&db, today(), AlertMode::Digest, "Alerts", Some(&mut mailer)).unwrap();

        assert_eq!(summary.sent, 2);
        let recipients: Vec<&str> = mailer.sent.iter().map(|mail| mail.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["u1@x.com", "u2@x.com"]);
        assert!(mailer.sent[0].subject.contains("3 tasks"));
    }

    #[test]
    fn per_task_mails_every_responsible_user() {
        let db = fixtures::database();
        let task = fixtures::task(&db, 1, "api", "deploy", Some(today() + Duration::days(2)), "Pendente");
        for name in ["u1", "u2", "u3"].iter() {
            let user = fixtures::user(&db, name, Some(&format!("{}@x.com", name)));
            fixtures::assign(&db, task, user);
        }
        let mut mailer = RecordingMailer::default();

        let summary = check_deadlines(&db, today(), AlertMode::PerTask, "Alerts", Some(&mut mailer)).unwrap();

        assert_eq!(summary.sent, 3);
        assert!(mailer
            .sent
            .iter()
            .all(|mail| mail.subject == "Deadline Alert: Due in 2 Days - deploy"));
    }

    #[test]
    fn missing_address_and_failed_send_do_not_stop_the_batch() {
        let db = fixtures::database();
        let task = fixtures::task(&db, 1, "api", "deploy", Some(today()), "Pendente");
        for (name, email) in [("u1", None), ("u2", Some("u2@x.com")), ("u3", Some("u3@x.com"))].iter() {
            let user = fixtures::user(&db, name, *email);
            fixtures::assign(&db, task, user);
        }
        let mut mailer = RecordingMailer {
            failing: vec!["u2@x.com".to_string()],
            ..RecordingMailer::default()
        };

        let summary = check_deadlines(&db, today(), AlertMode::Digest, "Alerts", Some(&mut mailer)).unwrap();

        assert_eq!(summary, RunSummary { selected: 1, sent: 1, skipped: 1, failed: 1, unsent: 0 });
        assert_eq!(mailer.sent.len(), 1);
        assert_eq!(mailer.sent[0].recipient, "u3@x.com");
    }

    #[test]
    fn without_mailer_nothing_is_dispatched() {
        let db = fixtures::database();
        let u1 = fixtures::user(&db, "u1", Some("u1@x.com"));
        let task = fixtures::task(&db, 1, "api", "deploy", Some(today()), "Pendente");
        fixtures::assign(&db, task, u1);

        let summary = check_deadlines(&db, today(), AlertMode::Digest, "Alerts", None).unwrap();

        assert_eq!(summary, RunSummary { selected: 1, sent: 0, skipped: 0, failed: 0, unsent: 1 });
    }

    #[test]
    fn interface_status_appears_in_mail() {
        let db = fixtures::database();
        let u1 = fixtures::user(&db, "u1", Some("u1@x.com"));
        let task = fixtures::task(&db, 1, "backend_api", "deploy", Some(today()), "Pendente");
        fixtures::assign(&db, task, u1);
        fixtures::interface_status(&db, 1, "backend_api", "Homologação");
        let mut mailer = RecordingMailer::default();

        check_deadlines(&db, today(), AlertMode::Digest, "Alerts", Some(&mut mailer)).unwrap();

        assert!(mailer.sent[0].body.contains("backend api (Status: Homologação)"));
    }

    #[test]
    fn users_without_username_still_get_their_alert() {
        let db = fixtures::database();
        let u1 = fixtures::user(&db, "u1", Some("u1@x.com"));
        db.execute("INSERT INTO users (id, username, email) VALUES (9, NULL, 'u9@x.com')", [])
            .unwrap();
        let task = fixtures::task(&db, 1, "api", "deploy", Some(today()), "Pendente");
        fixtures::assign(&db, task, u1);
        fixtures::assign(&db, task, 9);
        let mut mailer = RecordingMailer::default();

        let summary = check_deadlines(&db, today(), AlertMode::Digest, "Alerts", Some(&mut mailer)).unwrap();

        assert_eq!(summary.sent, 2);
        let recipients: Vec<&str> = mailer.sent.iter().map(|mail| mail.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["u1@x.com", "u9@x.com"]);
        assert!(mailer.sent[1].body.contains("Hi u9@x.com,"));
    }

    #[test]
    fn null_status_row_for_another_interface_does_not_block_mail() {
        let db = fixtures::database();
        let u1 = fixtures::user(&db, "u1", Some("u1@x.com"));
        let task = fixtures::task(&db, 1, "backend_api", "deploy", Some(today()), "Pendente");
        fixtures::assign(&db, task, u1);
        fixtures::interface_status(&db, 1, "backend_api", "Em teste");
        db.execute(
            "INSERT INTO project_interface_status (project_id, interface_name, status) VALUES (1, 'other', NULL)",
            [],
        )
        .unwrap();
        let mut mailer = RecordingMailer::default();

        let summary = check_deadlines(&db, today(), AlertMode::Digest, "Alerts", Some(&mut mailer)).unwrap();

        assert_eq!(summary.sent, 1);
        assert!(mailer.sent[0].body.contains("backend api (Status: Em teste)"));
    }

    #[test]
    fn query_failure_aborts_the_run() {
        let db = Connection::open_in_memory().unwrap();
        let mut mailer = RecordingMailer::default();

        let result = check_deadlines(&db, today(), AlertMode::Digest, "Alerts", Some(&mut mailer));

        assert!(result.is_err());
        assert!(mailer.sent.is_empty());
    }
}
