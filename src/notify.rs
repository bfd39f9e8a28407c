//! Mail notifications
//!
//! Summaries and failures are mailed through `curl`'s SMTP client, run in
//! the local context. Delivery problems are reported to the caller and
//! never change the outcome of the run being reported.

use chrono::Utc;
use tracing::{info, warn};

use crate::config::settings::MailSettings;
use crate::config::SecretString;
use crate::error::{BackupError, BackupResult};
use crate::exec::{CommandExecutor, CommandSpec, ExecutionContext};

pub trait Notifier {
    fn notify(&self, subject: &str, body: &str) -> BackupResult<()>;
}

pub struct MailNotifier<'a> {
    executor: &'a dyn CommandExecutor,
    settings: &'a MailSettings,
}

impl<'a> MailNotifier<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, settings: &'a MailSettings) -> Self {
        Self { executor, settings }
    }

    fn message(&self, subject: &str, body: &str) -> String {
        let mut message = format!(
            "From: {}\r\nTo: {}\r\nSubject: {}: {}\r\nDate: {}\r\n\r\n",
            self.settings.from,
            self.settings.to.join(", "),
            self.settings.subject,
            subject,
            Utc::now().to_rfc2822(),
        );
        for line in body.lines() {
            message.push_str(line);
            message.push_str("\r\n");
        }
        message
    }

    fn command(&self, message: String) -> CommandSpec {
        let mail = self.settings;
        let mut spec = CommandSpec::new("curl")
            .args(["--silent", "--show-error", "--ssl-reqd"])
            .arg("--url")
            .arg(format!("smtp://{}:{}", mail.host, mail.port))
            .arg("--mail-from")
            .arg(&mail.from);
        for to in &mail.to {
            spec = spec.arg("--mail-rcpt").arg(to);
        }
        if !mail.password.is_empty() {
            let credentials = SecretString::new(format!("{}:{}", mail.from, mail.password.expose()));
            spec = spec.arg("--user").secret_arg(&credentials);
        }
        spec.args(["-T", "-"]).stdin_bytes(message)
    }
}

impl Notifier for MailNotifier<'_> {
    fn notify(&self, subject: &str, body: &str) -> BackupResult<()> {
        let command = self.command(self.message(subject, body));
        self.executor
            .execute(&command, ExecutionContext::Local)
            .map_err(|e| BackupError::Notification(format!("Mail not sent: {}", e)))?;
        info!(recipients = self.settings.to.len(), "notification sent");
        Ok(())
    }
}

/// The configured notifier, if mail is enabled
pub fn notifier_from_settings<'a>(
    settings: &'a MailSettings,
    executor: &'a dyn CommandExecutor,
) -> Option<MailNotifier<'a>> {
    settings
        .enabled
        .then(|| MailNotifier::new(executor, settings))
}

/// Send without failing; returns the delivery error as a warning message
pub fn notify_best_effort(
    notifier: Option<&dyn Notifier>,
    subject: &str,
    body: &str,
) -> Option<String> {
    let notifier = notifier?;
    match notifier.notify(subject, body) {
        Ok(()) => None,
        Err(e) => {
            warn!(error = %e, "notification failed");
            Some(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    fn mail() -> MailSettings {
        MailSettings {
            enabled: true,
            host: "smtp.example.org".into(),
            port: 587,
            from: "backup@example.org".into(),
            password: SecretString::new("mailpw"),
            to: vec!["ops@example.org".into(), "admin@example.org".into()],
            subject: "Cloud Backup".into(),
        }
    }

    #[test]
    fn test_curl_command() {
        let host = FakeHost::new();
        let settings = mail();
        let notifier = MailNotifier::new(&host, &settings);
        notifier.notify("Backup succeeded", "all good").unwrap();

        let calls = host.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].context, ExecutionContext::Local);
        assert_eq!(
            calls[0].rendered,
            "curl --silent --show-error --ssl-reqd --url smtp://smtp.example.org:587 \
             --mail-from backup@example.org --mail-rcpt ops@example.org \
             --mail-rcpt admin@example.org --user *** -T -"
        );
    }

    #[test]
    fn test_message_headers() {
        let host = FakeHost::new();
        let settings = mail();
        let message = MailNotifier::new(&host, &settings).message("Restore failed", "line1\nline2");

        assert!(message.starts_with("From: backup@example.org\r\n"));
        assert!(message.contains("To: ops@example.org, admin@example.org\r\n"));
        assert!(message.contains("Subject: Cloud Backup: Restore failed\r\n"));
        assert!(message.ends_with("\r\n\r\nline1\r\nline2\r\n"));
    }

    #[test]
    fn test_failure_is_best_effort() {
        let host = FakeHost::new();
        host.fail_when("curl");
        let settings = mail();
        let notifier = MailNotifier::new(&host, &settings);

        let err = notifier.notify("x", "y").unwrap_err();
        assert!(matches!(err, BackupError::Notification(_)));

        let warning = notify_best_effort(Some(&notifier), "x", "y");
        assert!(warning.unwrap().contains("Mail not sent"));
        assert!(notify_best_effort(None, "x", "y").is_none());
    }

    #[test]
    fn test_disabled_mail_has_no_notifier() {
        let host = FakeHost::new();
        let mut settings = mail();
        settings.enabled = false;
        assert!(notifier_from_settings(&settings, &host).is_none());
        settings.enabled = true;
        assert!(notifier_from_settings(&settings, &host).is_some());
    }
}
