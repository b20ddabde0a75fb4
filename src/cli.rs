use std::path::PathBuf;
use structopt::StructOpt;
use chrono::NaiveDate;

use crate::alert::AlertMode;

/// Every flag is optional: with none, the job reads its settings from
/// the environment and checks deadlines relative to the local date.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "deadline-alerter",
    about = "Emails responsible users about tasks due in the next three days."
)]
pub struct CommandLineArgs {
    /// Read tasks from this sqlite file instead of DATABASE_URL.
    #[structopt(parse(from_os_str), short, long)]
    pub database: Option<PathBuf>,

    /// Grouping of alerts: "digest" or "per-task" (overrides ALERT_MODE).
    #[structopt(short, long)]
    pub mode: Option<AlertMode>,

    /// Check deadlines as if today were this date (YYYY-MM-DD).
    #[structopt(long)]
    pub date: Option<NaiveDate>,

    /// Log the alerts instead of sending them.
    #[structopt(long)]
    pub dry_run: bool,
}
