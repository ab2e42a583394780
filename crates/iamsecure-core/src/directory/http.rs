use super::{
    AccessKeyMetadata, DirectoryError, IdentityDirectory, IdentityPage, LoginProfile, MfaDevice,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// JSON client for a directory REST gateway fronting the identity provider.
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MfaDevicesResponse {
    #[serde(default)]
    mfa_devices: Vec<MfaDevice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessKeysResponse {
    #[serde(default)]
    access_key_metadata: Vec<AccessKeyMetadata>,
}

/// Provider error code that marks a 404 as a genuine missing entity.
const NO_SUCH_ENTITY: &str = "NoSuchEntity";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastUsedResponse {
    #[serde(default)]
    last_used_date: Option<DateTime<Utc>>,
}

impl HttpDirectory {
    /// Create a new directory client
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Self::with_builder(base_url, token, reqwest::Client::builder())
    }

    fn with_builder(
        base_url: &str,
        token: Option<String>,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("IAMSecure/", env!("CARGO_PKG_VERSION"))),
        );

        if let Some(ref t) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", t))
                    .context("Invalid directory token")?,
            );
        }

        let client = builder
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, path, &body));
        }

        response
            .json()
            .await
            .map_err(|e| DirectoryError::Malformed(e.to_string()))
    }
}

/// A 404 is only a missing entity when the gateway says so. An unrouted path
/// must not read as "user has no login profile".
fn classify_status(status: StatusCode, path: &str, body: &str) -> DirectoryError {
    let detail = if body.trim().is_empty() {
        format!("{} returned {}", path, status)
    } else {
        format!("{} returned {}: {}", path, status, body.trim())
    };

    match status {
        StatusCode::NOT_FOUND if is_no_such_entity(body) => DirectoryError::NotFound(detail),
        StatusCode::TOO_MANY_REQUESTS => DirectoryError::Throttled(detail),
        s if s.is_server_error() => DirectoryError::Unavailable(detail),
        _ => DirectoryError::Other(detail),
    }
}

fn is_no_such_entity(body: &str) -> bool {
    serde_json::from_str::<ErrorBody>(body)
        .map(|error| error.code.as_deref() == Some(NO_SUCH_ENTITY))
        .unwrap_or(false)
}

/// Percent-encode one path segment.
fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[async_trait]
impl IdentityDirectory for HttpDirectory {
    async fn list_identities(
        &self,
        cursor: Option<String>,
    ) -> Result<IdentityPage, DirectoryError> {
        match cursor.as_deref() {
            Some(marker) => self.get_json("/users", &[("marker", marker)]).await,
            None => self.get_json("/users", &[]).await,
        }
    }

    async fn get_login_profile(&self, user_name: &str) -> Result<LoginProfile, DirectoryError> {
        let path = format!("/users/{}/login-profile", encode_segment(user_name));
        self.get_json(&path, &[]).await
    }

    async fn list_mfa_devices(&self, user_name: &str) -> Result<Vec<MfaDevice>, DirectoryError> {
        let path = format!("/users/{}/mfa-devices", encode_segment(user_name));
        let response: MfaDevicesResponse = self.get_json(&path, &[]).await?;
        Ok(response.mfa_devices)
    }

    async fn list_access_keys(
        &self,
        user_name: &str,
    ) -> Result<Vec<AccessKeyMetadata>, DirectoryError> {
        let path = format!("/users/{}/access-keys", encode_segment(user_name));
        let response: AccessKeysResponse = self.get_json(&path, &[]).await?;
        Ok(response.access_key_metadata)
    }

    async fn get_access_key_last_used(
        &self,
        access_key_id: &str,
    ) -> Result<Option<DateTime<Utc>>, DirectoryError> {
        let path = format!("/access-keys/{}/last-used", encode_segment(access_key_id));
        let response: LastUsedResponse = self.get_json(&path, &[]).await?;
        Ok(response.last_used_date)
    }
}
