//! Control plane over the MinIO admin API (v3).

use super::{
    ControlPlane, ServiceError, StorageError, StorageResult,
    http::{EndpointConfig, SignedClient},
    seal,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, header};
use serde::Serialize;

const ADMIN_PREFIX: &str = "/minio/admin/v3";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddUserBody<'a> {
    secret_key: &'a str,
    status: &'a str,
}

#[derive(Serialize)]
struct PolicyAssociation<'a> {
    policies: [&'a str; 1],
    user: &'a str,
}

#[derive(Serialize)]
struct BucketQuota {
    quota: u64,
    size: u64,
    quotatype: &'static str,
}

/// Admin client for users, canned policies and bucket quotas.
#[derive(Clone, Debug)]
pub struct AdminClient {
    inner: SignedClient,
}

impl AdminClient {
    pub fn new(cfg: &EndpointConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            inner: SignedClient::new(cfg)?,
        })
    }

    async fn call(
        &self,
        method: Method,
        operation: &str,
        query: &[(&str, &str)],
        body: Bytes,
    ) -> Result<(), ServiceError> {
        let path = format!("{}/{}", ADMIN_PREFIX, operation);
        let headers = if body.is_empty() {
            Vec::new()
        } else {
            vec![(header::CONTENT_TYPE, "application/octet-stream".to_string())]
        };
        self.inner
            .send(method, &path, query, body, &headers)
            .await
            .map(|_| ())
    }

    /// JSON body sealed with the admin secret key.
    fn sealed_json<T: Serialize>(&self, value: &T) -> Result<Bytes, ServiceError> {
        let plain = serde_json::to_vec(value).map_err(|err| ServiceError::Seal(err.to_string()))?;
        seal::seal(self.inner.secret_key(), &plain)
            .map(Bytes::from)
            .map_err(ServiceError::Seal)
    }

    async fn change_association(
        &self,
        operation: &str,
        policy: &str,
        access_key: &str,
    ) -> Result<(), ServiceError> {
        let body = self.sealed_json(&PolicyAssociation {
            policies: [policy],
            user: access_key,
        })?;
        self.call(Method::POST, operation, &[], body).await
    }
}

#[async_trait]
impl ControlPlane for AdminClient {
    async fn create_user(&self, access_key: &str, secret_key: &str) -> StorageResult<()> {
        let result = match self.sealed_json(&AddUserBody {
            secret_key,
            status: "enabled",
        }) {
            Ok(body) => {
                self.call(Method::PUT, "add-user", &[("accessKey", access_key)], body)
                    .await
            }
            Err(err) => Err(err),
        };
        result.map_err(|source| StorageError::UserCreateFailed {
            access_key: access_key.to_string(),
            source,
        })
    }

    async fn remove_user(&self, access_key: &str) -> StorageResult<()> {
        self.call(
            Method::DELETE,
            "remove-user",
            &[("accessKey", access_key)],
            Bytes::new(),
        )
        .await
        .map_err(|source| StorageError::UserDeleteFailed {
            access_key: access_key.to_string(),
            source,
        })
    }

    async fn set_bucket_quota(&self, bucket: &str, quota_bytes: u64) -> StorageResult<()> {
        let quota_error = |source| StorageError::QuotaSetFailed {
            bucket: bucket.to_string(),
            source,
        };
        let body = serde_json::to_vec(&BucketQuota {
            quota: quota_bytes,
            size: quota_bytes,
            quotatype: "hard",
        })
        .map_err(|err| quota_error(ServiceError::InvalidRequest(err.to_string())))?;
        self.call(
            Method::PUT,
            "set-bucket-quota",
            &[("bucket", bucket)],
            Bytes::from(body),
        )
        .await
        .map_err(quota_error)
    }

    async fn add_policy(&self, name: &str, document: &[u8]) -> StorageResult<()> {
        self.call(
            Method::PUT,
            "add-canned-policy",
            &[("name", name)],
            Bytes::copy_from_slice(document),
        )
        .await
        .map_err(|source| StorageError::PolicyCreateFailed {
            policy: name.to_string(),
            source,
        })
    }

    async fn remove_policy(&self, name: &str) -> StorageResult<()> {
        self.call(
            Method::DELETE,
            "remove-canned-policy",
            &[("name", name)],
            Bytes::new(),
        )
        .await
        .map_err(|source| StorageError::PolicyDeleteFailed {
            policy: name.to_string(),
            source,
        })
    }

    async fn attach_policy(&self, name: &str, access_key: &str) -> StorageResult<()> {
        self.change_association("idp/builtin/policy/attach", name, access_key)
            .await
            .map_err(|source| StorageError::PolicyAttachFailed {
                policy: name.to_string(),
                access_key: access_key.to_string(),
                source,
            })
    }

    async fn detach_policy(&self, name: &str, access_key: &str) -> StorageResult<()> {
        self.change_association("idp/builtin/policy/detach", name, access_key)
            .await
            .map_err(|source| StorageError::PolicyDetachFailed {
                policy: name.to_string(),
                access_key: access_key.to_string(),
                source,
            })
    }
}
