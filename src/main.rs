use structopt::StructOpt;
use anyhow::{bail, Context};
use chrono::Local;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod alert;
mod cli;
mod config;
mod interface;
mod mailer;
mod model;
#[cfg(test)]
mod fixtures;

use cli::CommandLineArgs;
use config::{MailConfig, Settings};
use mailer::{LogMailer, MailSender, SmtpMailer};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("deadline_alerter=info")),
        )
        .init();

    // Get the command-line arguments.
    let CommandLineArgs {
        database,
        mode,
        date,
        dry_run,
    } = CommandLineArgs::from_args();

    let mut settings = match database {
        Some(path) => Settings::from_lookup(|key| match key {
            "DATABASE_URL" => Some(path.display().to_string()),
            _ => std::env::var(key).ok(),
        }),
        None => Settings::from_env(),
    }
    .context("Invalid configuration.")?;
    if let Some(mode) = mode {
        settings.mode = mode;
    }
    let today = date.unwrap_or_else(|| Local::now().date_naive());

    info!(mode = ?settings.mode, %today, "Starting deadline alerter job");

    let mut mailer: Option<Box<dyn MailSender>> = if dry_run {
        Some(Box::new(LogMailer::default()))
    } else {
        match &settings.mail {
            MailConfig::Enabled(mail) => Some(Box::new(SmtpMailer::new(mail)?)),
            MailConfig::Disabled { missing } => {
                error!(?missing, "Mail server credentials are not fully configured, sending is disabled");
                None
            }
        }
    };

    let mailer = match mailer.as_mut() {
        Some(mailer) => Some(&mut **mailer as &mut dyn MailSender),
        None => None,
    };

    let summary = {
        let database = model::open_database(&settings.database_path)?;
        interface::check_deadlines(&database, today, settings.mode, &settings.signature, mailer)?
    };

    info!(
        selected = summary.selected,
        sent = summary.sent,
        skipped = summary.skipped,
        failed = summary.failed,
        unsent = summary.unsent,
        "Deadline alerter job finished"
    );

    if summary.failed > 0 {
        bail!(
            "{} of {} alert emails could not be sent.",
            summary.failed,
            summary.sent + summary.failed
        );
    }
    Ok(())
}
