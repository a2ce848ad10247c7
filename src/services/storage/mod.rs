//! Storage Admin Gateway.
//!
//! Two capability surfaces of the storage service sit behind object-safe
//! traits: the data plane (buckets and objects) and the control plane (users,
//! policies, quotas). [`StorageGateway`] bundles one of each. The shipped
//! implementations speak S3 REST and the MinIO admin API, both signed with
//! AWS Signature V4.

pub mod admin;
mod http;
pub mod s3;
mod seal;
pub mod sigv4;

pub use http::EndpointConfig;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// Service error codes meaning "the thing you addressed does not exist".
const NOT_FOUND_CODES: [&str; 5] = [
    "NoSuchBucket",
    "NoSuchKey",
    "XMinioAdminNoSuchUser",
    "XMinioAdminNoSuchPolicy",
    "XMinioAdminPolicyChangeAlreadyApplied",
];

/// Why a single call to the storage service failed.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service answered {status} {code}: {message}")]
    Status {
        status: StatusCode,
        code: String,
        message: String,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("could not seal admin payload: {0}")]
    Seal(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ServiceError::Status { status, code, .. } => {
                *status == StatusCode::NOT_FOUND || NOT_FOUND_CODES.contains(&code.as_str())
            }
            _ => false,
        }
    }
}

/// Gateway failure, one variant per external sub-operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create bucket `{bucket}`: {source}")]
    BucketCreateFailed {
        bucket: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to write object `{key}` in `{bucket}`: {source}")]
    ObjectWriteFailed {
        bucket: String,
        key: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to list objects in `{bucket}`: {source}")]
    ObjectListFailed {
        bucket: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to delete object `{key}` in `{bucket}`: {source}")]
    ObjectDeleteFailed {
        bucket: String,
        key: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to delete bucket `{bucket}`: {source}")]
    BucketDeleteFailed {
        bucket: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to create user `{access_key}`: {source}")]
    UserCreateFailed {
        access_key: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to delete user `{access_key}`: {source}")]
    UserDeleteFailed {
        access_key: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to set quota on `{bucket}`: {source}")]
    QuotaSetFailed {
        bucket: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to create policy `{policy}`: {source}")]
    PolicyCreateFailed {
        policy: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to delete policy `{policy}`: {source}")]
    PolicyDeleteFailed {
        policy: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to attach policy `{policy}` to `{access_key}`: {source}")]
    PolicyAttachFailed {
        policy: String,
        access_key: String,
        #[source]
        source: ServiceError,
    },
    #[error("failed to detach policy `{policy}` from `{access_key}`: {source}")]
    PolicyDetachFailed {
        policy: String,
        access_key: String,
        #[source]
        source: ServiceError,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn service_error(&self) -> &ServiceError {
        match self {
            StorageError::BucketCreateFailed { source, .. }
            | StorageError::ObjectWriteFailed { source, .. }
            | StorageError::ObjectListFailed { source, .. }
            | StorageError::ObjectDeleteFailed { source, .. }
            | StorageError::BucketDeleteFailed { source, .. }
            | StorageError::UserCreateFailed { source, .. }
            | StorageError::UserDeleteFailed { source, .. }
            | StorageError::QuotaSetFailed { source, .. }
            | StorageError::PolicyCreateFailed { source, .. }
            | StorageError::PolicyDeleteFailed { source, .. }
            | StorageError::PolicyAttachFailed { source, .. }
            | StorageError::PolicyDetachFailed { source, .. } => source,
        }
    }

    /// True when the service reported the addressed resource as absent.
    pub fn is_not_found(&self) -> bool {
        self.service_error().is_not_found()
    }
}

/// Lazy, single-pass sequence of object keys. Ends after the first error.
pub type ObjectKeys<'a> = BoxStream<'a, StorageResult<String>>;

/// Bucket and object operations.
#[async_trait]
pub trait DataPlane: Send + Sync {
    async fn create_bucket(&self, bucket: &str) -> StorageResult<()>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Every key in `bucket`, recursively, fetched page by page as consumed.
    fn list_objects<'a>(&'a self, bucket: &'a str) -> ObjectKeys<'a>;

    async fn remove_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Only succeeds on an empty bucket.
    async fn remove_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Cheap liveness check of the service.
    async fn ping(&self) -> Result<(), ServiceError>;
}

/// User and policy administration.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_user(&self, access_key: &str, secret_key: &str) -> StorageResult<()>;

    async fn remove_user(&self, access_key: &str) -> StorageResult<()>;

    async fn set_bucket_quota(&self, bucket: &str, quota_bytes: u64) -> StorageResult<()>;

    async fn add_policy(&self, name: &str, document: &[u8]) -> StorageResult<()>;

    async fn remove_policy(&self, name: &str) -> StorageResult<()>;

    async fn attach_policy(&self, name: &str, access_key: &str) -> StorageResult<()>;

    async fn detach_policy(&self, name: &str, access_key: &str) -> StorageResult<()>;
}

/// Both planes of one storage service.
#[derive(Clone)]
pub struct StorageGateway {
    pub data: Arc<dyn DataPlane>,
    pub control: Arc<dyn ControlPlane>,
}

impl StorageGateway {
    pub fn new(data: Arc<dyn DataPlane>, control: Arc<dyn ControlPlane>) -> Self {
        Self { data, control }
    }
}
