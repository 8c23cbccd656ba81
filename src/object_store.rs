//! Object storage for raw uploaded bytes.
//!
//! The [`ObjectStore`] trait is the blob interface the pipeline writes
//! uploads to and deletes them from. [`S3ObjectStore`] talks to any
//! S3-compatible service (AWS, MinIO, LocalStack) using the S3 REST API
//! with AWS Signature V4 authentication built from pure-Rust dependencies
//! (`hmac`, `sha2`) — no C library dependencies.
//!
//! Keys are owner-scoped: `{owner_id}/{uuid}-{sanitized_name}`, and the
//! public retrieval URL is `{base_url}/{bucket}/{key}`.
//!
//! # Environment Variables
//!
//! Credentials are read from environment variables:
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (for temporary credentials / IAM roles)

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::PipelineError;

type HmacSha256 = Hmac<Sha256>;

/// Key-value blob store holding each source's raw bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `key`, overwriting any existing object.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str)
        -> Result<(), PipelineError>;

    /// Fetch the object at `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError>;

    /// Delete the object at `key`. Deleting a missing object is not an
    /// error, so compensation and reconciliation retries stay idempotent.
    async fn delete(&self, key: &str) -> Result<(), PipelineError>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, PipelineError>;

    /// Public retrieval URL for `key`.
    fn public_url(&self, key: &str) -> String;
}

/// Build an owner-scoped storage key: `{owner_id}/{uuid}-{sanitized_name}`.
///
/// The UUID keeps re-uploads of same-named files from colliding; the name
/// suffix keeps keys human-readable in bucket listings.
pub fn object_key(owner_id: i64, file_name: &str) -> String {
    format!("{}/{}-{}", owner_id, Uuid::new_v4(), sanitize_name(file_name))
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

// ============ AWS Credentials ============

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self, PipelineError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            PipelineError::ConfigurationError("AWS_ACCESS_KEY_ID environment variable not set".into())
        })?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            PipelineError::ConfigurationError(
                "AWS_SECRET_ACCESS_KEY environment variable not set".into(),
            )
        })?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ S3 store ============

/// [`ObjectStore`] over the S3 REST API with SigV4 signing.
///
/// AWS buckets use virtual-hosted addressing
/// (`{bucket}.s3.{region}.amazonaws.com/{key}`); custom endpoints use
/// path-style (`{endpoint}/{bucket}/{key}`), which is what MinIO and
/// LocalStack expect.
pub struct S3ObjectStore {
    config: StorageConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3ObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self, PipelineError> {
        let creds = AwsCredentials::from_env()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            config: config.clone(),
            creds,
            client,
        })
    }

    /// Scheme + host of the service endpoint.
    fn endpoint(&self) -> (String, String) {
        match &self.config.endpoint_url {
            Some(endpoint) => {
                let (scheme, rest) = match endpoint.split_once("://") {
                    Some((s, r)) => (s.to_string(), r),
                    None => ("https".to_string(), endpoint.as_str()),
                };
                (scheme, rest.trim_end_matches('/').to_string())
            }
            None => (
                "https".to_string(),
                format!(
                    "{}.s3.{}.amazonaws.com",
                    self.config.bucket, self.config.region
                ),
            ),
        }
    }

    /// Request path for `key` (path-style includes the bucket).
    fn canonical_uri(&self, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        if self.config.endpoint_url.is_some() {
            format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key)
        } else {
            format!("/{}", encoded_key)
        }
    }

    async fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        body: Option<(&[u8], &str)>,
    ) -> Result<reqwest::Response, PipelineError> {
        let (scheme, host) = self.endpoint();
        let canonical_uri = self.canonical_uri(key);
        let url = format!("{}://{}{}", scheme, host, canonical_uri);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let payload_hash = hex_sha256(body.map(|(b, _)| b).unwrap_or_default());

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);

        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        if let Some((bytes, content_type)) = body {
            req = req.header("Content-Type", content_type).body(bytes.to_vec());
        }

        req.send()
            .await
            .map_err(|e| PipelineError::StorageFailure(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), PipelineError> {
        let resp = self
            .signed_request(reqwest::Method::PUT, key, Some((bytes, content_type)))
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::StorageFailure(format!(
                "PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                body.chars().take(500).collect::<String>()
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        let resp = self.signed_request(reqwest::Method::GET, key, None).await?;
        if !resp.status().is_success() {
            return Err(PipelineError::StorageFailure(format!(
                "GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::StorageFailure(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        let resp = self
            .signed_request(reqwest::Method::DELETE, key, None)
            .await?;
        let status = resp.status();
        if !status.is_success() && status.as_u16() != 404 {
            return Err(PipelineError::StorageFailure(format!(
                "DeleteObject failed (HTTP {}) for key '{}'",
                status, key
            )));
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        let resp = self
            .signed_request(reqwest::Method::HEAD, key, None)
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(true)
        } else if status.as_u16() == 404 {
            Ok(false)
        } else {
            Err(PipelineError::StorageFailure(format!(
                "HeadObject failed (HTTP {}) for key '{}'",
                status, key
            )))
        }
    }

    fn public_url(&self, key: &str) -> String {
        let base = match &self.config.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => {
                let (scheme, host) = self.endpoint();
                match &self.config.endpoint_url {
                    Some(_) => format!("{}://{}", scheme, host),
                    // Virtual-hosted AWS URLs already carry the bucket.
                    None => return format!("{}://{}/{}", scheme, host, key),
                }
            }
        };
        format!("{}/{}/{}", base, self.config.bucket, key)
    }
}

// ============ AWS SigV4 Helpers ============

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
///
/// Encodes all characters except unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ In-memory store ============

/// In-memory [`ObjectStore`] for tests.
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), PipelineError> {
        self.objects
            .write()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.objects
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::StorageFailure(format!("no object at key '{}'", key)))
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.objects.write().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        Ok(self.objects.read().unwrap().contains_key(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }
}
