//! Wire types returned by the incidents API.

use serde::{Deserialize, Serialize};

/// One open or resolved incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: String,
    pub summary: String,
    pub status: String,
    pub environment: String,
    pub commit_sha: String,
    pub occurred_at: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
}

impl Incident {
    /// Short SHA for display.
    pub fn short_sha(&self) -> &str {
        self.commit_sha.get(..7).unwrap_or(&self.commit_sha)
    }
}

/// Body of `GET /api/incidents`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentsResponse {
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

/// `{ "error": { "code": ..., "message": ... } }` returned on 4xx/5xx.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct VerifyResponse {
    #[serde(default)]
    pub exists: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MeResponse {
    #[serde(default)]
    pub github_username: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl MeResponse {
    pub fn into_username(self) -> Option<String> {
        self.github_username
            .filter(|name| !name.is_empty())
            .or(self.username.filter(|name| !name.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incident_nullable_fields() {
        let json = r#"{
            "incident_id": "inc_1",
            "summary": "TypeError: x is undefined",
            "status": "open",
            "environment": "production",
            "commit_sha": "0123456789abcdef0123456789abcdef01234567",
            "occurred_at": "2026-01-01T00:00:00.000Z",
            "stack_trace": null,
            "error_type": null
        }"#;
        let incident: Incident = serde_json::from_str(json).unwrap();
        assert_eq!(incident.stack_trace, None);
        assert_eq!(incident.short_sha(), "0123456");
    }

    #[test]
    fn missing_incidents_field_is_empty() {
        let body: IncidentsResponse = serde_json::from_str("{}").unwrap();
        assert!(body.incidents.is_empty());
    }

    #[test]
    fn username_prefers_github() {
        let me: MeResponse =
            serde_json::from_str(r#"{"githubUsername":"octo","username":"plain"}"#).unwrap();
        assert_eq!(me.into_username().as_deref(), Some("octo"));

        let me: MeResponse = serde_json::from_str(r#"{"username":"plain"}"#).unwrap();
        assert_eq!(me.into_username().as_deref(), Some("plain"));

        let me: MeResponse = serde_json::from_str(r#"{"githubUsername":""}"#).unwrap();
        assert_eq!(me.into_username(), None);
    }
}
