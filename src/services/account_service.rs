//! Provisioning and deprovisioning of tenant accounts.
//!
//! Provisioning runs a fixed sequence of storage calls and stops at the first
//! failure without rolling back: every name is re-derivable from the email,
//! so deprovisioning is the recovery path for a half-created tenant.
//! Deprovisioning attempts every teardown step, accumulates failures, and
//! decides the outcome once all steps have run.

use crate::{
    models::{
        account::{OWNER_RECORD_KEY, OwnerRecord, ProvisionedAccount, TenantNames},
        policy::PolicyDocument,
    },
    services::{
        naming::{EmailError, parse_email},
        notifier::{Credentials, Notifier},
        secret::generate_secret,
        storage::{ServiceError, StorageError, StorageGateway, StorageResult},
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use std::{fmt, future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// How teardown treats a resource the storage service reports as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingResourcePolicy {
    /// Absent counts as already deleted; repeated deprovisioning succeeds.
    #[default]
    Tolerate,
    /// Absent counts as a failed step.
    Strict,
}

/// Provisioning progress, in order. Each value names the last completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvisionStep {
    Start,
    BucketCreated,
    OwnerWritten,
    UserCreated,
    PolicyCreated,
    PolicyAttached,
    Done,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStep::Start => "start",
            ProvisionStep::BucketCreated => "bucket created",
            ProvisionStep::OwnerWritten => "owner record written",
            ProvisionStep::UserCreated => "user created",
            ProvisionStep::PolicyCreated => "policy created",
            ProvisionStep::PolicyAttached => "policy attached",
            ProvisionStep::Done => "done",
        };
        f.write_str(name)
    }
}

/// Teardown steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    DeleteObjects,
    DeleteBucket,
    DetachPolicy,
    DeletePolicy,
    DeleteUser,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStep::DeleteObjects => "delete objects",
            TeardownStep::DeleteBucket => "delete bucket",
            TeardownStep::DetachPolicy => "detach policy",
            TeardownStep::DeletePolicy => "delete policy",
            TeardownStep::DeleteUser => "delete user",
        };
        f.write_str(name)
    }
}

/// One failed teardown call.
#[derive(Debug)]
pub struct TeardownFailure {
    pub step: TeardownStep,
    pub error: StorageError,
}

/// Accumulated outcome of a deprovisioning run.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub objects_deleted: usize,
    /// Steps whose resource was already gone.
    pub tolerated: Vec<TeardownStep>,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Note `step` as having met an absent resource, once per step.
    fn tolerate(&mut self, step: TeardownStep) {
        if !self.tolerated.contains(&step) {
            self.tolerated.push(step);
        }
    }

    fn record(&mut self, step: TeardownStep, result: StorageResult<()>, missing: MissingResourcePolicy) {
        match result {
            Ok(()) => {}
            Err(err) if missing == MissingResourcePolicy::Tolerate && err.is_not_found() => {
                warn!(step = %step, error = %err, "resource already absent");
                self.tolerate(step);
            }
            Err(err) => {
                error!(step = %step, error = %err, "teardown step failed");
                self.failures.push(TeardownFailure { step, error: err });
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] EmailError),
    #[error("secure randomness unavailable: {0}")]
    RandomnessUnavailable(#[source] rand::Error),
    #[error("provisioning stopped after `{completed}`: {source}")]
    ProvisionFailed {
        completed: ProvisionStep,
        #[source]
        source: StorageError,
    },
    #[error("deprovisioning failed in {} step(s)", .failures.len())]
    DeprovisionFailed { failures: Vec<TeardownFailure> },
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("unauthorized")]
    Unauthorized,
}

/// Orchestration knobs, fixed at startup.
#[derive(Debug, Clone)]
pub struct AccountSettings {
    /// Hard quota applied to new buckets; 0 disables the step.
    pub bucket_quota_bytes: u64,
    pub missing_resources: MissingResourcePolicy,
    /// Upper bound for one provisioning or deprovisioning run.
    pub operation_timeout: Duration,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            bucket_quota_bytes: 0,
            missing_resources: MissingResourcePolicy::Tolerate,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

type SecretSource = fn() -> Result<String, rand::Error>;

/// Account Orchestrator.
///
/// Holds no per-tenant state; the storage service is the system of record.
#[derive(Clone)]
pub struct AccountService {
    gateway: StorageGateway,
    notifier: Arc<dyn Notifier>,
    settings: AccountSettings,
    secrets: SecretSource,
}

impl AccountService {
    pub fn new(gateway: StorageGateway, notifier: Arc<dyn Notifier>, settings: AccountSettings) -> Self {
        Self {
            gateway,
            notifier,
            settings,
            secrets: generate_secret,
        }
    }

    #[cfg(test)]
    fn with_secret_source(mut self, secrets: SecretSource) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    /// Create bucket, owner record, user and policy for `email`, then send the
    /// credentials. A failed email delivery does not fail provisioning.
    pub async fn provision(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedAccount, AccountError> {
        let email = parse_email(email)?;
        let names = TenantNames::derive(&email);
        let span = info_span!("provision", email = %names.email, bucket = %names.bucket_name);

        let secret_key = match (self.secrets)() {
            Ok(secret) => secret,
            Err(err) => {
                span.in_scope(|| error!(error = %err, "failed to generate secret key"));
                return Err(AccountError::RandomnessUnavailable(err));
            }
        };

        let outcome = self
            .bounded(self.create_resources(&names, &secret_key, cancel))
            .instrument(span.clone())
            .await;

        let account = match outcome {
            Ok(()) => ProvisionedAccount {
                bucket_name: names.bucket_name.clone(),
                access_key: names.access_key_id.clone(),
                secret_key,
            },
            Err(err) => {
                span.in_scope(|| error!(error = %err, "provisioning failed"));
                return Err(err);
            }
        };
        span.in_scope(|| info!("created new account"));

        let creds = Credentials {
            email: names.email.clone(),
            bucket: account.bucket_name.clone(),
            access_key: account.access_key.clone(),
            secret_key: account.secret_key.clone(),
        };
        if let Err(err) = self.notifier.send_credentials(&creds).await {
            span.in_scope(|| error!(error = %err, "failed to send credentials email"));
        }

        Ok(account)
    }

    async fn create_resources(
        &self,
        names: &TenantNames,
        secret_key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AccountError> {
        let data = &self.gateway.data;
        let control = &self.gateway.control;
        let mut completed = ProvisionStep::Start;

        advance(
            cancel,
            &mut completed,
            ProvisionStep::BucketCreated,
            data.create_bucket(&names.bucket_name),
        )
        .await?;

        let owner = owner_record_bytes(names);
        advance(cancel, &mut completed, ProvisionStep::OwnerWritten, async {
            let body = owner.map_err(|source| StorageError::ObjectWriteFailed {
                bucket: names.bucket_name.clone(),
                key: OWNER_RECORD_KEY.to_string(),
                source,
            })?;
            data.put_object(&names.bucket_name, OWNER_RECORD_KEY, body, "application/json")
                .await
        })
        .await?;

        if self.settings.bucket_quota_bytes > 0 {
            ensure_live(cancel)?;
            if let Err(err) = control
                .set_bucket_quota(&names.bucket_name, self.settings.bucket_quota_bytes)
                .await
            {
                // not fatal, the account is usable without a quota
                error!(error = %err, "failed to set bucket quota");
            }
        }

        advance(
            cancel,
            &mut completed,
            ProvisionStep::UserCreated,
            control.create_user(&names.access_key_id, secret_key),
        )
        .await?;

        let document = PolicyDocument::for_bucket(&names.bucket_name).to_json();
        advance(cancel, &mut completed, ProvisionStep::PolicyCreated, async {
            let document = document.map_err(|err| StorageError::PolicyCreateFailed {
                policy: names.policy_name.clone(),
                source: ServiceError::InvalidRequest(err.to_string()),
            })?;
            control.add_policy(&names.policy_name, &document).await
        })
        .await?;

        advance(
            cancel,
            &mut completed,
            ProvisionStep::PolicyAttached,
            control.attach_policy(&names.policy_name, &names.access_key_id),
        )
        .await?;

        completed = ProvisionStep::Done;
        debug!(step = %completed, "all provisioning steps completed");
        Ok(())
    }

    /// Remove everything belonging to `email`, attempting every step.
    pub async fn deprovision(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<TeardownReport, AccountError> {
        let email = parse_email(email)?;
        let names = TenantNames::derive(&email);
        let span = info_span!(
            "deprovision",
            email = %names.email,
            bucket = %names.bucket_name,
            policy = %names.policy_name
        );
        span.in_scope(|| info!("deleting account"));

        let report = self
            .bounded(self.tear_down(&names, cancel))
            .instrument(span.clone())
            .await;

        span.in_scope(|| match report {
            Ok(report) if report.is_success() => {
                info!(
                    objects = report.objects_deleted,
                    tolerated = report.tolerated.len(),
                    "deleted account"
                );
                Ok(report)
            }
            Ok(report) => {
                error!(failures = report.failures.len(), "account deletion incomplete");
                Err(AccountError::DeprovisionFailed {
                    failures: report.failures,
                })
            }
            Err(err) => {
                error!(error = %err, "account deletion aborted");
                Err(err)
            }
        })
    }

    async fn tear_down(
        &self,
        names: &TenantNames,
        cancel: &CancellationToken,
    ) -> Result<TeardownReport, AccountError> {
        let data = &self.gateway.data;
        let control = &self.gateway.control;
        let missing = self.settings.missing_resources;
        let mut report = TeardownReport::default();

        let mut keys = data.list_objects(&names.bucket_name);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AccountError::Cancelled),
                next = keys.next() => next,
            };
            let key = match next {
                None => break,
                Some(Ok(key)) => key,
                Some(Err(err)) if missing == MissingResourcePolicy::Tolerate && err.is_not_found() => {
                    warn!(error = %err, "bucket already absent, nothing to list");
                    report.tolerate(TeardownStep::DeleteObjects);
                    break;
                }
                Some(Err(err)) => {
                    error!(error = %err, "failed to list objects");
                    report.failures.push(TeardownFailure {
                        step: TeardownStep::DeleteObjects,
                        error: err,
                    });
                    return Ok(report);
                }
            };
            match data.remove_object(&names.bucket_name, &key).await {
                Ok(()) => report.objects_deleted += 1,
                Err(err) if missing == MissingResourcePolicy::Tolerate && err.is_not_found() => {
                    warn!(object = %key, error = %err, "object already absent");
                    report.tolerate(TeardownStep::DeleteObjects);
                }
                Err(err) => {
                    error!(object = %key, error = %err, "failed to delete object");
                    report.failures.push(TeardownFailure {
                        step: TeardownStep::DeleteObjects,
                        error: err,
                    });
                }
            }
        }
        drop(keys);

        ensure_live(cancel)?;
        let result = data.remove_bucket(&names.bucket_name).await;
        report.record(TeardownStep::DeleteBucket, result, missing);

        ensure_live(cancel)?;
        let result = control
            .detach_policy(&names.policy_name, &names.access_key_id)
            .await;
        report.record(TeardownStep::DetachPolicy, result, missing);

        ensure_live(cancel)?;
        let result = control.remove_policy(&names.policy_name).await;
        report.record(TeardownStep::DeletePolicy, result, missing);

        ensure_live(cancel)?;
        let result = control.remove_user(&names.access_key_id).await;
        report.record(TeardownStep::DeleteUser, result, missing);

        Ok(report)
    }

    /// Bound `fut` by the configured operation timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, AccountError>
    where
        F: Future<Output = Result<T, AccountError>>,
    {
        let limit = self.settings.operation_timeout;
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AccountError::TimedOut(limit))?
    }
}

/// Run one provisioning step, moving `completed` forward on success.
async fn advance<F>(
    cancel: &CancellationToken,
    completed: &mut ProvisionStep,
    next: ProvisionStep,
    step: F,
) -> Result<(), AccountError>
where
    F: Future<Output = StorageResult<()>>,
{
    ensure_live(cancel)?;
    step.await.map_err(|source| AccountError::ProvisionFailed {
        completed: *completed,
        source,
    })?;
    *completed = next;
    Ok(())
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), AccountError> {
    if cancel.is_cancelled() {
        Err(AccountError::Cancelled)
    } else {
        Ok(())
    }
}

fn owner_record_bytes(names: &TenantNames) -> Result<Bytes, ServiceError> {
    serde_json::to_vec(&OwnerRecord::new(&names.email, Utc::now()))
        .map(Bytes::from)
        .map_err(|err| ServiceError::InvalidRequest(err.to_string()))
}
