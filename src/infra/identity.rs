//! Client for the platform identity service that vouches for single-sign-on tokens.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, header};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::auth::SsoVerifier;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity service URL is not configured")]
    Unconfigured,
    #[error("site uid `{0}` is not a lowercase hyphenated UUID")]
    SiteUid(String),
    #[error("invalid identity service URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("identity request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    successful: Value,
}

#[derive(Clone, Debug)]
pub struct IdentityClient {
    client: Client,
    api_url: Option<Url>,
    site_uid: String,
}

impl IdentityClient {
    pub fn new(
        api_url: Option<&str>,
        site_uid: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let api_url = api_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(Url::parse)
            .transpose()?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_url,
            site_uid: site_uid.into(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("cachectl/", env!("CARGO_PKG_VERSION"))
    }

    /// `{api_url}/sites/{site_uid}/sso/{token}`
    pub fn endpoint(&self, token: &str) -> Result<Url, IdentityError> {
        if !is_lowercase_uuid(&self.site_uid) {
            return Err(IdentityError::SiteUid(self.site_uid.clone()));
        }
        let mut url = self.api_url.clone().ok_or(IdentityError::Unconfigured)?;
        url.path_segments_mut()
            .map_err(|()| IdentityError::Unconfigured)?
            .pop_if_empty()
            .extend(["sites", self.site_uid.as_str(), "sso", token]);
        Ok(url)
    }

    pub async fn verify_token(&self, token: &str) -> Result<bool, IdentityError> {
        let url = self.endpoint(token)?;
        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(status = status.as_u16(), "Identity service refused token");
            return Ok(false);
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice::<VerifyResponse>(&body)
            .map(|parsed| truthy(&parsed.successful))
            .unwrap_or(false))
    }
}

#[async_trait]
impl SsoVerifier for IdentityClient {
    async fn verify(&self, token: &str) -> bool {
        match self.verify_token(token).await {
            Ok(valid) => valid,
            Err(err) => {
                warn!(error = %err, "Single-sign-on verification failed");
                false
            }
        }
    }
}

fn is_lowercase_uuid(value: &str) -> bool {
    value.len() == 36
        && !value.bytes().any(|byte| byte.is_ascii_uppercase())
        && Uuid::try_parse(value).is_ok()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty() && text != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}
