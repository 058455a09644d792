//! HTTP client for the incidents read API.
//!
//! All calls authenticate with the browser session cookie obtained at login.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{RequestBuilder, StatusCode};
use tracing::debug;

use crate::error::IncidentsError;
use crate::types::{ErrorEnvelope, Incident, IncidentsResponse, MeResponse, VerifyResponse};
use crate::Result;

/// Overrides the backend base URL.
pub const BACKEND_URL_ENV: &str = "ROOTLY_BACKEND_URL";

/// Backend used when nothing is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3001";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Incidents API client
#[derive(Debug, Clone)]
pub struct IncidentsClient {
    client: reqwest::Client,
    base_url: String,
}

impl IncidentsClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("rootly-incidents/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL from `ROOTLY_BACKEND_URL`, else the local default.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(BACKEND_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        Self::new(base_url.trim())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Open incidents for `owner/repo`.
    pub async fn fetch_incidents(&self, repo: &str, session: &str) -> Result<Vec<Incident>> {
        let response = self
            .get("/api/incidents", session)
            .query(&[("repo", repo), ("status", "open")])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: IncidentsResponse = response.json().await?;
            return Ok(body.incidents);
        }

        Err(match status {
            StatusCode::UNAUTHORIZED => IncidentsError::Unauthorized,
            StatusCode::NOT_FOUND => IncidentsError::ProjectNotFound,
            StatusCode::BAD_REQUEST => {
                let message = response
                    .json::<ErrorEnvelope>()
                    .await
                    .ok()
                    .and_then(|body| body.error.message)
                    .unwrap_or_else(|| "Bad request".to_string());
                IncidentsError::BadRequest(message)
            }
            other => IncidentsError::Http(other.as_u16()),
        })
    }

    /// Whether `owner/repo` is registered to the session user. Any failure is `false`.
    pub async fn verify_project(&self, repo: &str, session: &str) -> bool {
        let request = self
            .get("/api/projects/verify", session)
            .query(&[("repo", repo)]);

        match request.send().await {
            Ok(response) if response.status().is_success() => response
                .json::<VerifyResponse>()
                .await
                .map(|body| body.exists == Some(true))
                .unwrap_or(false),
            Ok(response) => {
                debug!(event = "verify.rejected", status = response.status().as_u16());
                false
            }
            Err(err) => {
                debug!(event = "verify.failed", error = %err);
                false
            }
        }
    }

    /// GitHub username of the session user, if the backend knows it.
    pub async fn username(&self, session: &str) -> Option<String> {
        let response = self.get("/api/me", session).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json::<MeResponse>().await.ok()?.into_username()
    }

    fn get(&self, path: &str, session: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header(CONTENT_TYPE, "application/json")
            .header(COOKIE, session)
    }
}
