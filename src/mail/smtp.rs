//! SMTP mailer.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, info};

use super::{confirmation_body, Mailer};
use crate::config::MailConfig;
use crate::error::{ReportGateError, Result};

/// Sends confirmation mail through an SMTP relay.
pub struct SmtpMailer {
    config: MailConfig,
    from: Mailbox,
    transport: SmtpTransport,
}

impl SmtpMailer {
    /// Create a mailer. No connection is made until the first send.
    pub fn new(config: MailConfig) -> Result<Self> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| ReportGateError::Mail(format!("Invalid from address: {}", e)))?;

        let builder = if config.use_tls {
            SmtpTransport::starttls_relay(&config.smtp_host)
                .map_err(|e| ReportGateError::Mail(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&config.smtp_host)
        };

        let mut builder = builder
            .port(config.smtp_port)
            .timeout(Some(config.timeout()));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            config,
        })
    }

    fn build_message(&self, to: &str, download_url: &str) -> Result<Message> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| ReportGateError::Mail(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(self.config.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(confirmation_body(download_url))
            .map_err(|e| ReportGateError::Mail(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_confirmation(&self, to: &str, download_url: &str) -> Result<()> {
        debug!(to = %to, host = %self.config.smtp_host, "Sending confirmation mail");

        let message = self.build_message(to, download_url)?;
        let transport = self.transport.clone();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || {
            transport
                .send(&message)
                .map_err(|e| ReportGateError::Mail(format!("Failed to send email: {}", e)))
        })
        .await
        .map_err(|e| ReportGateError::Internal(format!("Task join error: {}", e)))??;

        info!(to = %to, "Confirmation mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> MailConfig {
        MailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 2525,
            username: "mailer".to_string(),
            password: "secret".to_string(),
            from_email: "reports@example.com".to_string(),
            from_name: "Example Reports".to_string(),
            subject: "Your report".to_string(),
            use_tls: false,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_build_message() {
        let mailer = SmtpMailer::new(test_config()).unwrap();
        let message = mailer
            .build_message("reader@example.com", "https://cdn.example.com/report.pdf")
            .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Your report"));
        assert!(raw.contains("https://cdn.example.com/report.pdf"));
    }

    #[test]
    fn test_invalid_from_address_rejected() {
        let mut config = test_config();
        config.from_email = "not an address".to_string();
        assert!(matches!(SmtpMailer::new(config), Err(ReportGateError::Mail(_))));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let mailer = SmtpMailer::new(test_config()).unwrap();
        assert!(mailer.build_message("nobody", "https://x.example").is_err());
    }
}
