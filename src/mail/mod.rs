//! Confirmation mail delivery.

mod smtp;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::MailConfig;
use crate::error::Result;

pub use smtp::SmtpMailer;

/// Sends the download confirmation to a requester.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_confirmation(&self, to: &str, download_url: &str) -> Result<()>;
}

/// Mailer used when delivery is disabled. Only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_confirmation(&self, to: &str, download_url: &str) -> Result<()> {
        info!(to = %to, download_url = %download_url, "Mail disabled, skipping confirmation");
        Ok(())
    }
}

/// Build the mailer selected by the configuration.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.enabled {
        Ok(Arc::new(SmtpMailer::new(config.clone())?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// Plain-text body of the confirmation mail.
pub fn confirmation_body(download_url: &str) -> String {
    format!(
        "Thanks for your interest in our report.\n\n\
         You can download it here:\n{download_url}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_contains_link() {
        let body = confirmation_body("https://cdn.example.com/report.pdf");
        assert!(body.contains("https://cdn.example.com/report.pdf"));
    }

    #[tokio::test]
    async fn test_disabled_config_yields_log_mailer() {
        let mailer = from_config(&MailConfig::default()).unwrap();
        assert!(mailer
            .send_confirmation("a@b.com", "https://cdn.example.com/report.pdf")
            .await
            .is_ok());
    }
}
