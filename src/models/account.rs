//! Represents a tenant account: the names derived from an email address and
//! the credentials handed back once the account exists.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Object key of the owner record written into every tenant bucket.
pub const OWNER_RECORD_KEY: &str = "owner.json";

/// Every storage-side name belonging to one tenant.
///
/// All fields are pure functions of the normalized email, so the same set can
/// be rebuilt at deletion time without a lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantNames {
    /// Lowercased, trimmed email address.
    pub email: String,

    /// Bucket holding the tenant's objects.
    pub bucket_name: String,

    /// Storage-service user identifier (the normalized email itself).
    pub access_key_id: String,

    /// Name of the canned policy granting access to `bucket_name`.
    pub policy_name: String,
}

/// Credentials returned to the caller after provisioning.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedAccount {
    pub bucket_name: String,
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for ProvisionedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionedAccount")
            .field("bucket_name", &self.bucket_name)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Audit record stored at [`OWNER_RECORD_KEY`] inside the tenant bucket.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRecord {
    pub email: String,

    /// RFC 3339 UTC timestamp, second precision.
    pub created_at: String,
}

impl OwnerRecord {
    pub fn new(email: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            email: email.into(),
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}
