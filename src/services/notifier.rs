//! Delivery of freshly generated credentials to the tenant.

use async_trait::async_trait;
use reqwest::Client;
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

const SUBJECT: &str = "Your storage sync credentials";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("email transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("email provider answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// What gets sent to the new tenant.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Plain-text message body.
    pub fn body(&self) -> String {
        format!(
            "Hi!\n\
             \n\
             Your storage account has been created. Here are your credentials, which\n\
             you can enter directly into the app:\n\
             \n\
             \x20 Bucket: {}\n\
             \x20 Access key: {}\n\
             \x20 Secret key: {}\n\
             \n\
             You also need to set a \"Vault key\" which is your personal password for\n\
             encrypting the synced data. Pick one and set it on each of your devices.\n\
             \n\
             Best regards,\n\
             Storage automation\n",
            self.bucket, self.access_key, self.secret_key
        )
    }
}

/// Sends credentials to a tenant. Best-effort from the caller's view.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_credentials(&self, creds: &Credentials) -> Result<(), NotifyError>;
}

/// Mailgun settings.
#[derive(Clone)]
pub struct MailgunConfig {
    pub api_base: String,
    pub domain: String,
    pub api_key: String,
    pub from: String,
    pub timeout: Duration,
}

/// Sends mail through the Mailgun messages API.
pub struct MailgunNotifier {
    http: Client,
    cfg: MailgunConfig,
}

impl MailgunNotifier {
    pub fn new(cfg: MailgunConfig) -> Result<Self, NotifyError> {
        let http = Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self { http, cfg })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/v3/{}/messages",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.domain
        )
    }
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn send_credentials(&self, creds: &Credentials) -> Result<(), NotifyError> {
        let body = creds.body();
        let form = [
            ("from", self.cfg.from.as_str()),
            ("to", creds.email.as_str()),
            ("subject", SUBJECT),
            ("text", body.as_str()),
        ];
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth("api", Some(&self.cfg.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(email = %creds.email, "sent credentials email");
        Ok(())
    }
}

/// Used when no mail provider is configured: records that nothing was sent.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_credentials(&self, creds: &Credentials) -> Result<(), NotifyError> {
        warn!(
            email = %creds.email,
            bucket = %creds.bucket,
            "no mail provider configured, credentials email not sent"
        );
        Ok(())
    }
}
