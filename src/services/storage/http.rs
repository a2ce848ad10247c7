//! Signed HTTP transport shared by the data-plane and control-plane clients.

use super::{
    ServiceError,
    sigv4::{self, SignableRequest, Signer},
};
use bytes::Bytes;
use chrono::Utc;
use reqwest::{Client, Method, Response, Url, header};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Connection details for a storage service endpoint.
#[derive(Clone)]
pub struct EndpointConfig {
    /// `host` or `host:port`, without scheme.
    pub endpoint: String,
    pub use_ssl: bool,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub(crate) struct SignedClient {
    http: Client,
    base: Url,
    signer: Signer,
}

impl SignedClient {
    pub fn new(cfg: &EndpointConfig) -> Result<Self, ServiceError> {
        let scheme = if cfg.use_ssl { "https" } else { "http" };
        let base = Url::parse(&format!("{}://{}", scheme, cfg.endpoint)).map_err(|err| {
            ServiceError::InvalidRequest(format!("endpoint `{}`: {}", cfg.endpoint, err))
        })?;
        if base.host_str().is_none() {
            return Err(ServiceError::InvalidRequest(format!(
                "endpoint `{}` has no host",
                cfg.endpoint
            )));
        }
        let http = Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            http,
            base,
            signer: Signer::new(&cfg.access_key, &cfg.secret_key, &cfg.region),
        })
    }

    pub fn secret_key(&self) -> &str {
        self.signer.secret_key()
    }

    /// Send a signed request and turn non-success answers into
    /// [`ServiceError::Status`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Bytes,
        headers: &[(header::HeaderName, String)],
    ) -> Result<Response, ServiceError> {
        let query = sigv4::canonical_query(query);
        let mut url = self.base.clone();
        url.set_path(path);
        url.set_query(if query.is_empty() { None } else { Some(&query) });

        let host = host_header(&url);
        let payload_hash = sigv4::payload_hash(&body);
        let signed = self.signer.sign(
            &SignableRequest {
                method: method.as_str(),
                host: &host,
                path,
                query: &query,
                payload_hash: &payload_hash,
            },
            Utc::now(),
        );

        debug!("{} {}", method, url);
        let mut request = self
            .http
            .request(method, url)
            .header(header::AUTHORIZATION, signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.body(body).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Host header value as reqwest will send it.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AdminErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Decode an S3 XML or admin JSON error body.
async fn error_from_response(response: Response) -> ServiceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let (code, message) = parse_error_body(&body);
    debug!("storage service error {} {}: {}", status, code, message);
    ServiceError::Status {
        status,
        code,
        message,
    }
}

pub(crate) fn parse_error_body(body: &str) -> (String, String) {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        if let Ok(err) = serde_json::from_str::<AdminErrorBody>(trimmed) {
            return (err.code, err.message);
        }
    }
    if trimmed.starts_with('<') {
        let code = xml_element(trimmed, "Code").unwrap_or_default();
        let message = xml_element(trimmed, "Message").unwrap_or_default();
        return (code, message);
    }
    (String::new(), trimmed.chars().take(256).collect())
}

/// Text of the first `<name>` element, unescaped.
pub(crate) fn xml_element(xml: &str, name: &str) -> Option<String> {
    xml_elements(xml, name).into_iter().next()
}

/// Text of every `<name>` element in document order, unescaped.
pub(crate) fn xml_elements(xml: &str, name: &str) -> Vec<String> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        match after.find(&close) {
            Some(end) => {
                values.push(xml_unescape(&after[..end]));
                rest = &after[end + close.len()..];
            }
            None => break,
        }
    }
    values
}

/// Decode the predefined entities and numeric character references
/// (`&#10;`, `&#xA;`). Anything unrecognised is kept as written.
fn xml_unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
