use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use ring::{digest, hmac};

use super::{ObjectStore, ObjectStoreError};
use crate::config::S3Config;
use crate::storage::models::SaveLocation;

const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// S3-compatible object store using path-style requests signed with
/// AWS Signature Version 4.
pub struct S3Store {
    client: Client,
    endpoint: String,
    host: String,
    bucket: String,
    region: String,
    access_key: String,
    secret_key: String,
}

impl S3Store {
    pub fn new(config: &S3Config) -> Result<Self, anyhow::Error> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let url = reqwest::Url::parse(&endpoint)?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => anyhow::bail!("S3 endpoint has no host: {endpoint}"),
        };

        Ok(Self {
            client: Client::builder().build()?,
            endpoint,
            host,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn canonical_uri(&self, key: &str) -> String {
        format!("/{}/{}", uri_encode(&self.bucket), uri_encode(key))
    }

    /// Signed request for `key`; `body` carries the payload and its content type.
    fn build_request(
        &self,
        method: Method,
        key: &str,
        body: Option<(Bytes, &str)>,
    ) -> reqwest::RequestBuilder {
        let canonical_uri = self.canonical_uri(key);
        let payload_hash = match &body {
            Some((data, _)) => hex::encode(digest::digest(&digest::SHA256, data)),
            None => EMPTY_PAYLOAD_SHA256.to_string(),
        };

        let signed = sign_request(
            &SigningParams {
                access_key: &self.access_key,
                secret_key: &self.secret_key,
                region: &self.region,
                service: "s3",
                host: &self.host,
            },
            method.as_str(),
            &canonical_uri,
            &payload_hash,
            Utc::now(),
        );

        let mut request = self
            .client
            .request(method, format!("{}{}", self.endpoint, canonical_uri))
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", signed.authorization);
        if let Some((data, content_type)) = body {
            request = request.header("Content-Type", content_type).body(data);
        }
        request
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        body: Option<(Bytes, &str)>,
    ) -> Result<reqwest::Response, ObjectStoreError> {
        self.build_request(method, key, body)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<SaveLocation, ObjectStoreError> {
        let resp = self
            .send(Method::PUT, key, Some((data, content_type)))
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "S3 upload failed ({status}): {body}"
            )));
        }

        Ok(SaveLocation::object_storage())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let resp = self.send(Method::GET, key, None).await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "S3 download failed ({status}): {body}"
            )));
        }

        resp.bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let resp = self.send(Method::DELETE, key, None).await?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "S3 delete failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let resp = self.send(Method::HEAD, key, None).await?;
        Ok(resp.status().is_success())
    }
}

struct SigningParams<'a> {
    access_key: &'a str,
    secret_key: &'a str,
    region: &'a str,
    service: &'a str,
    host: &'a str,
}

struct SignedHeaders {
    amz_date: String,
    authorization: String,
}

fn sign_request(
    params: &SigningParams<'_>,
    method: &str,
    canonical_uri: &str,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let signed_headers = "host;x-amz-content-sha256;x-amz-date";
    let canonical_request = format!(
        "{method}\n{canonical_uri}\n\nhost:{}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n{signed_headers}\n{payload_hash}",
        params.host
    );

    let scope = format!(
        "{date_stamp}/{}/{}/aws4_request",
        params.region, params.service
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex::encode(digest::digest(&digest::SHA256, canonical_request.as_bytes()))
    );

    let signing_key = derive_signing_key(
        params.secret_key,
        &date_stamp,
        params.region,
        params.service,
    );
    let signature = hex::encode(hmac::sign(&signing_key, string_to_sign.as_bytes()));

    SignedHeaders {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            params.access_key
        ),
        amz_date,
    }
}

fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> hmac::Key {
    let step = |key: &[u8], data: &str| {
        hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key), data.as_bytes())
    };

    let k_date = step(format!("AWS4{secret_key}").as_bytes(), date_stamp);
    let k_region = step(k_date.as_ref(), region);
    let k_service = step(k_region.as_ref(), service);
    let k_signing = step(k_service.as_ref(), "aws4_request");
    hmac::Key::new(hmac::HMAC_SHA256, k_signing.as_ref())
}

/// Percent-encode everything but unreserved characters and `/`.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
