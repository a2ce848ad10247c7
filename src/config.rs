use crate::services::{
    account_service::{AccountSettings, MissingResourcePolicy},
    notifier::MailgunConfig,
    storage::EndpointConfig,
};
use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::{env, fmt, str::FromStr, time::Duration};

const DEFAULT_MAILGUN_API_BASE: &str = "https://api.mailgun.net";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
    pub region: String,
    pub admin_token: String,
    pub mailgun: Option<MailgunSettings>,
    pub bucket_quota_bytes: u64,
    pub strict_teardown: bool,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct MailgunSettings {
    pub api_base: String,
    pub domain: String,
    pub api_key: String,
    pub from: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Per-user object storage account provisioner")]
pub struct Args {
    /// Host to bind to (overrides PROVISIONER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PROVISIONER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage service endpoint, host[:port] (overrides MINIO_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Storage admin access key (overrides MINIO_ACCESS_KEY)
    #[arg(long)]
    pub access_key: Option<String>,

    /// Storage admin secret key (overrides MINIO_SECRET_KEY)
    #[arg(long)]
    pub secret_key: Option<String>,

    /// Use https for the storage service (overrides MINIO_USE_SSL)
    #[arg(long)]
    pub use_ssl: Option<bool>,

    /// Request signing region (overrides MINIO_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Bearer token required for account deletion (overrides ADMIN_TOKEN)
    #[arg(long)]
    pub admin_token: Option<String>,

    /// Mailgun sending domain (overrides MAILGUN_DOMAIN)
    #[arg(long)]
    pub mailgun_domain: Option<String>,

    /// Mailgun API key (overrides MAILGUN_API_KEY)
    #[arg(long)]
    pub mailgun_api_key: Option<String>,

    /// Sender address for credentials emails (overrides MAILGUN_FROM)
    #[arg(long)]
    pub mailgun_from: Option<String>,

    /// Mailgun API base URL (overrides MAILGUN_API_BASE)
    #[arg(long)]
    pub mailgun_api_base: Option<String>,

    /// Hard quota for new buckets in bytes, 0 for none (overrides BUCKET_QUOTA_BYTES)
    #[arg(long)]
    pub bucket_quota: Option<u64>,

    /// Treat already-deleted resources as teardown failures (overrides TEARDOWN_STRICT)
    #[arg(long)]
    pub strict_teardown: bool,

    /// Upper bound for one provisioning or deletion, in seconds (overrides REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        Self::resolve(args, |name| env::var(name).ok())
    }

    /// Merge flags over environment values over defaults.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        let required = |flag: Option<String>, name: &str| {
            flag.or_else(|| lookup(name))
                .ok_or_else(|| anyhow!("{} is required", name))
        };

        let mailgun = resolve_mailgun(
            args.mailgun_domain.or_else(|| lookup("MAILGUN_DOMAIN")),
            args.mailgun_api_key.or_else(|| lookup("MAILGUN_API_KEY")),
            args.mailgun_from.or_else(|| lookup("MAILGUN_FROM")),
            args.mailgun_api_base
                .or_else(|| lookup("MAILGUN_API_BASE"))
                .unwrap_or_else(|| DEFAULT_MAILGUN_API_BASE.into()),
        )?;

        let strict_teardown =
            args.strict_teardown || parse_env(&lookup, "TEARDOWN_STRICT")?.unwrap_or(false);

        let cfg = Self {
            host: args
                .host
                .or_else(|| lookup("PROVISIONER_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: match args.port {
                Some(port) => port,
                None => parse_env(&lookup, "PROVISIONER_PORT")?.unwrap_or(8080),
            },
            endpoint: required(args.endpoint, "MINIO_ENDPOINT")?,
            access_key: required(args.access_key, "MINIO_ACCESS_KEY")?,
            secret_key: required(args.secret_key, "MINIO_SECRET_KEY")?,
            use_ssl: match args.use_ssl {
                Some(use_ssl) => use_ssl,
                None => parse_env(&lookup, "MINIO_USE_SSL")?.unwrap_or(true),
            },
            region: args
                .region
                .or_else(|| lookup("MINIO_REGION"))
                .unwrap_or_else(|| "us-east-1".into()),
            admin_token: required(args.admin_token, "ADMIN_TOKEN")?,
            mailgun,
            bucket_quota_bytes: match args.bucket_quota {
                Some(bytes) => bytes,
                None => parse_env(&lookup, "BUCKET_QUOTA_BYTES")?.unwrap_or(0),
            },
            strict_teardown,
            request_timeout: Duration::from_secs(match args.request_timeout {
                Some(secs) => secs,
                None => parse_env(&lookup, "REQUEST_TIMEOUT_SECS")?.unwrap_or(30),
            }),
        };

        if cfg.endpoint.contains("://") {
            bail!("MINIO_ENDPOINT must be host[:port] without a scheme, got `{}`", cfg.endpoint);
        }
        if cfg.request_timeout.is_zero() {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig {
            endpoint: self.endpoint.clone(),
            use_ssl: self.use_ssl,
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            region: self.region.clone(),
            timeout: self.request_timeout,
        }
    }

    pub fn mailgun_config(&self) -> Option<MailgunConfig> {
        self.mailgun.as_ref().map(|m| MailgunConfig {
            api_base: m.api_base.clone(),
            domain: m.domain.clone(),
            api_key: m.api_key.clone(),
            from: m.from.clone(),
            timeout: self.request_timeout,
        })
    }

    pub fn account_settings(&self) -> AccountSettings {
        AccountSettings {
            bucket_quota_bytes: self.bucket_quota_bytes,
            missing_resources: if self.strict_teardown {
                MissingResourcePolicy::Strict
            } else {
                MissingResourcePolicy::Tolerate
            },
            operation_timeout: self.request_timeout,
        }
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value))
        })
        .transpose()
}

fn resolve_mailgun(
    domain: Option<String>,
    api_key: Option<String>,
    from: Option<String>,
    api_base: String,
) -> Result<Option<MailgunSettings>> {
    match (domain, api_key, from) {
        (None, None, None) => Ok(None),
        (Some(domain), Some(api_key), Some(from)) => Ok(Some(MailgunSettings {
            api_base,
            domain,
            api_key,
            from,
        })),
        _ => bail!("MAILGUN_DOMAIN, MAILGUN_API_KEY and MAILGUN_FROM must be set together"),
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("use_ssl", &self.use_ssl)
            .field("region", &self.region)
            .field("admin_token", &"[REDACTED]")
            .field("mailgun", &self.mailgun)
            .field("bucket_quota_bytes", &self.bucket_quota_bytes)
            .field("strict_teardown", &self.strict_teardown)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl fmt::Debug for MailgunSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailgunSettings")
            .field("api_base", &self.api_base)
            .field("domain", &self.domain)
            .field("api_key", &"[REDACTED]")
            .field("from", &self.from)
            .finish()
    }
}
