//! Email-gated download flow.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use super::email::Email;
use super::record::{DownloadLog, DownloadRecord};
use crate::error::{ReportGateError, Result};
use crate::mail::Mailer;
use crate::ratelimit::{Clock, RateLimiter, SystemClock};

/// A granted download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadGrant {
    pub download_url: String,
}

/// Validates the requester, applies the rate limit and hands out the link.
///
/// Recording the download and mailing the confirmation are best-effort:
/// their failures are logged and never change the outcome.
pub struct DownloadService {
    limiter: Arc<RateLimiter>,
    log: Arc<dyn DownloadLog>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    download_url: String,
    mail_timeout: Duration,
}

impl DownloadService {
    pub fn new(
        limiter: Arc<RateLimiter>,
        log: Arc<dyn DownloadLog>,
        mailer: Arc<dyn Mailer>,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            limiter,
            log,
            mailer,
            clock: Arc::new(SystemClock),
            download_url: download_url.into(),
            mail_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_mail_timeout(mut self, timeout: Duration) -> Self {
        self.mail_timeout = timeout;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Handle one download request.
    ///
    /// Validation runs before the limiter is consulted, so malformed input
    /// never consumes quota.
    #[instrument(skip(self, email, user_agent))]
    pub async fn request_download(
        &self,
        email: &str,
        client_id: &str,
        user_agent: Option<String>,
    ) -> Result<DownloadGrant> {
        let email = Email::parse(email)?;

        let decision = self.limiter.acquire(client_id).await;
        if !decision.allowed {
            return Err(ReportGateError::RateLimited {
                retry_after: decision.retry_after,
            });
        }

        let record = DownloadRecord::new(email.clone(), client_id, user_agent, self.clock.now());
        if let Err(e) = self.log.record(&record).await {
            error!(error = %e, record_id = %record.id, "Failed to record download");
        }

        match tokio::time::timeout(
            self.mail_timeout,
            self.mailer.send_confirmation(email.as_str(), &self.download_url),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Failed to send confirmation mail"),
            Err(_) => error!(timeout = ?self.mail_timeout, "Confirmation mail timed out"),
        }

        info!(
            record_id = %record.id,
            remaining = decision.remaining,
            "Download granted"
        );

        Ok(DownloadGrant {
            download_url: self.download_url.clone(),
        })
    }
}
