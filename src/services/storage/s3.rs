//! Data plane over path-style S3 REST.

use super::{
    DataPlane, ObjectKeys, ServiceError, StorageError, StorageResult,
    http::{EndpointConfig, SignedClient, xml_element, xml_elements},
    sigv4::encode_path,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use futures::{StreamExt, stream};
use reqwest::{Method, header};
use std::collections::VecDeque;

const LIVENESS_PATH: &str = "/minio/health/live";

/// S3 client for bucket and object operations.
#[derive(Clone, Debug)]
pub struct S3Client {
    inner: SignedClient,
}

/// One page of a ListObjectsV2 response.
#[derive(Debug, Default, PartialEq, Eq)]
struct ListPage {
    keys: Vec<String>,
    next_token: Option<String>,
}

/// Cursor over the pages of one listing.
struct ListCursor {
    pending: VecDeque<String>,
    token: Option<String>,
    exhausted: bool,
}

impl S3Client {
    pub fn new(cfg: &EndpointConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            inner: SignedClient::new(cfg)?,
        })
    }

    async fn list_page(&self, bucket: &str, token: Option<&str>) -> Result<ListPage, ServiceError> {
        let mut query = vec![("list-type", "2")];
        if let Some(token) = token {
            query.push(("continuation-token", token));
        }
        let response = self
            .inner
            .send(
                Method::GET,
                &encode_path(&[bucket]),
                &query,
                Bytes::new(),
                &[],
            )
            .await?;
        let body = response.text().await?;
        parse_list_page(&body)
    }
}

fn parse_list_page(xml: &str) -> Result<ListPage, ServiceError> {
    if !xml.contains("<ListBucketResult") {
        return Err(ServiceError::Decode("missing ListBucketResult".into()));
    }
    let truncated = xml_element(xml, "IsTruncated").is_some_and(|v| v == "true");
    let next_token = xml_element(xml, "NextContinuationToken").filter(|t| !t.is_empty());
    if truncated && next_token.is_none() {
        return Err(ServiceError::Decode(
            "truncated listing without continuation token".into(),
        ));
    }
    Ok(ListPage {
        keys: xml_elements(xml, "Key"),
        next_token: if truncated { next_token } else { None },
    })
}

/// `Content-MD5` header value for a body.
fn content_md5(body: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(body).0)
}

#[async_trait]
impl DataPlane for S3Client {
    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.inner
            .send(Method::PUT, &encode_path(&[bucket]), &[], Bytes::new(), &[])
            .await
            .map(|_| ())
            .map_err(|source| StorageError::BucketCreateFailed {
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
        let headers = [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::HeaderName::from_static("content-md5"),
                content_md5(&body),
            ),
        ];
        self.inner
            .send(Method::PUT, &encode_path(&[bucket, key]), &[], body, &headers)
            .await
            .map(|_| ())
            .map_err(|source| StorageError::ObjectWriteFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })
    }

    fn list_objects<'a>(&'a self, bucket: &'a str) -> ObjectKeys<'a> {
        let cursor = ListCursor {
            pending: VecDeque::new(),
            token: None,
            exhausted: false,
        };
        stream::try_unfold(cursor, move |mut cursor| async move {
            loop {
                if let Some(key) = cursor.pending.pop_front() {
                    return Ok::<_, StorageError>(Some((key, cursor)));
                }
                if cursor.exhausted {
                    return Ok(None);
                }
                let page = self
                    .list_page(bucket, cursor.token.as_deref())
                    .await
                    .map_err(|source| StorageError::ObjectListFailed {
                        bucket: bucket.to_string(),
                        source,
                    })?;
                cursor.pending.extend(page.keys);
                cursor.exhausted = page.next_token.is_none();
                cursor.token = page.next_token;
            }
        })
        .boxed()
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.inner
            .send(
                Method::DELETE,
                &encode_path(&[bucket, key]),
                &[],
                Bytes::new(),
                &[],
            )
            .await
            .map(|_| ())
            .map_err(|source| StorageError::ObjectDeleteFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })
    }

    async fn remove_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.inner
            .send(Method::DELETE, &encode_path(&[bucket]), &[], Bytes::new(), &[])
            .await
            .map(|_| ())
            .map_err(|source| StorageError::BucketDeleteFailed {
                bucket: bucket.to_string(),
                source,
            })
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        self.inner
            .send(Method::GET, LIVENESS_PATH, &[], Bytes::new(), &[])
            .await
            .map(|_| ())
    }
}
