//! In-memory storage service and notifier used by orchestrator and handler
//! tests. Records every call and fails on demand.

use crate::services::{
    notifier::{Credentials, Notifier, NotifyError},
    storage::{
        ControlPlane, DataPlane, ObjectKeys, ServiceError, StorageError, StorageGateway,
        StorageResult,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use reqwest::StatusCode;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{Arc, Mutex},
};

#[derive(Default)]
struct State {
    buckets: BTreeMap<String, BTreeMap<String, (Bytes, String)>>,
    users: BTreeMap<String, String>,
    policies: BTreeMap<String, Vec<u8>>,
    attachments: BTreeSet<(String, String)>,
    quotas: BTreeMap<String, u64>,
    calls: Vec<String>,
    fail_on: HashSet<String>,
    list_fails_after: Option<usize>,
}

fn status(code: u16, name: &str) -> ServiceError {
    ServiceError::Status {
        status: StatusCode::from_u16(code).unwrap(),
        code: name.into(),
        message: format!("{} (fake)", name),
    }
}

/// Both storage planes over shared in-memory state.
#[derive(Default)]
pub struct FakeStorage {
    state: Mutex<State>,
}

impl FakeStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gateway(self: &Arc<Self>) -> StorageGateway {
        StorageGateway::new(self.clone(), self.clone())
    }

    /// Make the call with this label answer 500. Labels are the method name,
    /// plus ` <key>` for `remove_object`.
    pub fn fail_on(&self, label: &str) {
        self.state.lock().unwrap().fail_on.insert(label.to_string());
    }

    /// Listing yields `n` keys and then an error.
    pub fn fail_listing_after(&self, n: usize) {
        self.state.lock().unwrap().list_fails_after = Some(n);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn seed_object(&self, bucket: &str, key: &str) {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), (Bytes::new(), "application/octet-stream".into()));
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().unwrap().buckets.contains_key(bucket)
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<(Bytes, String)> {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_secret(&self, access_key: &str) -> Option<String> {
        self.state.lock().unwrap().users.get(access_key).cloned()
    }

    pub fn policy(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().policies.get(name).cloned()
    }

    pub fn is_attached(&self, policy: &str, access_key: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .attachments
            .contains(&(policy.to_string(), access_key.to_string()))
    }

    pub fn quota(&self, bucket: &str) -> Option<u64> {
        self.state.lock().unwrap().quotas.get(bucket).copied()
    }

    /// Nothing left in any namespace.
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.buckets.is_empty()
            && state.users.is_empty()
            && state.policies.is_empty()
            && state.attachments.is_empty()
    }

    /// Record the call and decide whether it is forced to fail.
    fn enter(&self, label: String) -> (std::sync::MutexGuard<'_, State>, Result<(), ServiceError>) {
        let mut state = self.state.lock().unwrap();
        let forced = state.fail_on.contains(&label);
        state.calls.push(label);
        let result = if forced {
            Err(status(500, "InternalError"))
        } else {
            Ok(())
        };
        (state, result)
    }
}

#[async_trait]
impl DataPlane for FakeStorage {
    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        let (mut state, forced) = self.enter("create_bucket".into());
        let result = forced.and_then(|_| {
            if state.buckets.contains_key(bucket) {
                Err(status(409, "BucketAlreadyOwnedByYou"))
            } else {
                state.buckets.insert(bucket.to_string(), BTreeMap::new());
                Ok(())
            }
        });
        result.map_err(|source| StorageError::BucketCreateFailed {
            bucket: bucket.to_string(),
            source,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        let (mut state, forced) = self.enter("put_object".into());
        let result = forced.and_then(|_| match state.buckets.get_mut(bucket) {
            Some(objects) => {
                objects.insert(key.to_string(), (body, content_type.to_string()));
                Ok(())
            }
            None => Err(status(404, "NoSuchBucket")),
        });
        result.map_err(|source| StorageError::ObjectWriteFailed {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })
    }

    fn list_objects<'a>(&'a self, bucket: &'a str) -> ObjectKeys<'a> {
        let (state, forced) = self.enter("list_objects".into());
        let list_error = |source| StorageError::ObjectListFailed {
            bucket: bucket.to_string(),
            source,
        };
        let items: Vec<StorageResult<String>> = match (forced, state.buckets.get(bucket)) {
            (Err(err), _) => vec![Err(list_error(err))],
            (Ok(()), None) => vec![Err(list_error(status(404, "NoSuchBucket")))],
            (Ok(()), Some(objects)) => {
                let mut items: Vec<_> = objects.keys().cloned().map(Ok).collect();
                if let Some(n) = state.list_fails_after {
                    items.truncate(n);
                    items.push(Err(list_error(status(500, "InternalError"))));
                }
                items
            }
        };
        stream::iter(items).boxed()
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let (mut state, forced) = self.enter(format!("remove_object {}", key));
        let result = forced.and_then(|_| {
            match state.buckets.get_mut(bucket) {
                Some(objects) => {
                    objects.remove(key);
                    Ok(())
                }
                None => Err(status(404, "NoSuchBucket")),
            }
        });
        result.map_err(|source| StorageError::ObjectDeleteFailed {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })
    }

    async fn remove_bucket(&self, bucket: &str) -> StorageResult<()> {
        let (mut state, forced) = self.enter("remove_bucket".into());
        let result = forced.and_then(|_| match state.buckets.get(bucket) {
            None => Err(status(404, "NoSuchBucket")),
            Some(objects) if !objects.is_empty() => Err(status(409, "BucketNotEmpty")),
            Some(_) => {
                state.buckets.remove(bucket);
                state.quotas.remove(bucket);
                Ok(())
            }
        });
        result.map_err(|source| StorageError::BucketDeleteFailed {
            bucket: bucket.to_string(),
            source,
        })
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        let (_state, forced) = self.enter("ping".into());
        forced
    }
}

#[async_trait]
impl ControlPlane for FakeStorage {
    async fn create_user(&self, access_key: &str, secret_key: &str) -> StorageResult<()> {
        let (mut state, forced) = self.enter("create_user".into());
        let result = forced.map(|_| {
            state
                .users
                .insert(access_key.to_string(), secret_key.to_string());
        });
        result.map_err(|source| StorageError::UserCreateFailed {
            access_key: access_key.to_string(),
            source,
        })
    }

    async fn remove_user(&self, access_key: &str) -> StorageResult<()> {
        let (mut state, forced) = self.enter("remove_user".into());
        let result = forced.and_then(|_| match state.users.remove(access_key) {
            Some(_) => Ok(()),
            None => Err(status(404, "XMinioAdminNoSuchUser")),
        });
        result.map_err(|source| StorageError::UserDeleteFailed {
            access_key: access_key.to_string(),
            source,
        })
    }

    async fn set_bucket_quota(&self, bucket: &str, quota_bytes: u64) -> StorageResult<()> {
        let (mut state, forced) = self.enter("set_bucket_quota".into());
        let result = forced.map(|_| {
            state.quotas.insert(bucket.to_string(), quota_bytes);
        });
        result.map_err(|source| StorageError::QuotaSetFailed {
            bucket: bucket.to_string(),
            source,
        })
    }

    async fn add_policy(&self, name: &str, document: &[u8]) -> StorageResult<()> {
        let (mut state, forced) = self.enter("add_policy".into());
        let result = forced.map(|_| {
            state.policies.insert(name.to_string(), document.to_vec());
        });
        result.map_err(|source| StorageError::PolicyCreateFailed {
            policy: name.to_string(),
            source,
        })
    }

    async fn remove_policy(&self, name: &str) -> StorageResult<()> {
        let (mut state, forced) = self.enter("remove_policy".into());
        let result = forced.and_then(|_| match state.policies.remove(name) {
            Some(_) => Ok(()),
            None => Err(status(404, "XMinioAdminNoSuchPolicy")),
        });
        result.map_err(|source| StorageError::PolicyDeleteFailed {
            policy: name.to_string(),
            source,
        })
    }

    async fn attach_policy(&self, name: &str, access_key: &str) -> StorageResult<()> {
        let (mut state, forced) = self.enter("attach_policy".into());
        let result = forced.and_then(|_| {
            if !state.users.contains_key(access_key) {
                Err(status(404, "XMinioAdminNoSuchUser"))
            } else if !state.policies.contains_key(name) {
                Err(status(404, "XMinioAdminNoSuchPolicy"))
            } else {
                state
                    .attachments
                    .insert((name.to_string(), access_key.to_string()));
                Ok(())
            }
        });
        result.map_err(|source| StorageError::PolicyAttachFailed {
            policy: name.to_string(),
            access_key: access_key.to_string(),
            source,
        })
    }

    async fn detach_policy(&self, name: &str, access_key: &str) -> StorageResult<()> {
        let (mut state, forced) = self.enter("detach_policy".into());
        let result = forced.and_then(|_| {
            if state
                .attachments
                .remove(&(name.to_string(), access_key.to_string()))
            {
                Ok(())
            } else {
                Err(status(400, "XMinioAdminPolicyChangeAlreadyApplied"))
            }
        });
        result.map_err(|source| StorageError::PolicyDetachFailed {
            policy: name.to_string(),
            access_key: access_key.to_string(),
            source,
        })
    }
}

/// Notifier that records deliveries, or fails every one.
#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<Credentials>>,
    fail: bool,
}

impl FakeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::default(),
            fail: true,
        })
    }

    pub fn sent(&self) -> Vec<Credentials> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send_credentials(&self, creds: &Credentials) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 502,
                body: "mail relay down".into(),
            });
        }
        self.sent.lock().unwrap().push(creds.clone());
        Ok(())
    }
}
