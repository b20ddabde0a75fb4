use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, info};

use crate::config::MailSettings;

/// Something that can deliver an HTML email.
pub trait MailSender {
    fn send(&mut self, recipient: &str, subject: &str, html_body: &str) -> Result<()>;
}

/// Sends mail through an authenticated STARTTLS relay. The transport is
/// built once and reused for every message of the run.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &MailSettings) -> Result<Self> {
        let from = settings
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid MAIL_FROM address {:?}.", settings.from))?;

        let transport = SmtpTransport::starttls_relay(&settings.host)
            .with_context(|| format!("Failed to set up mail relay {}.", settings.host))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        debug!(host = %settings.host, port = settings.port, "Mail transport ready");
        Ok(SmtpMailer { transport, from })
    }
}

impl MailSender for SmtpMailer {
    fn send(&mut self, recipient: &str, subject: &str, html_body: &str) -> Result<()> {
        let to = recipient
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid recipient address {:?}.", recipient))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .context("Failed to build email message.")?;

        self.transport
            .send(&message)
            .with_context(|| format!("Mail server rejected message to {}.", recipient))?;
        Ok(())
    }
}

/// Logs alerts instead of delivering them.
#[derive(Debug, Default)]
pub struct LogMailer;

impl MailSender for LogMailer {
    fn send(&mut self, recipient: &str, subject: &str, html_body: &str) -> Result<()> {
        info!(
            recipient,
            subject,
            body_len = html_body.len(),
            "Dry run, alert not sent"
        );
        debug!(body = html_body, "Dry run alert body");
        Ok(())
    }
}
