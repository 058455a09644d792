//! Deployment context attached to every payload.
//!
//! A context always carries `commit_sha` (40 lowercase hex characters),
//! `environment` (`production` or `preview`) and `occurred_at` (RFC 3339,
//! millisecond precision, UTC). Caller-supplied fields are merged on top and
//! win on key collisions.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Commit SHA variables, highest priority first.
pub const COMMIT_SHA_VARS: [&str; 5] = [
    "VERCEL_GIT_COMMIT_SHA",
    "RENDER_GIT_COMMIT",
    "RAILWAY_GIT_COMMIT_SHA",
    "GITHUB_SHA",
    "COMMIT_SHA",
];

/// Reported when no usable commit SHA is configured. Passes ingest validation.
pub const FALLBACK_COMMIT_SHA: &str = "0000000000000000000000000000000000000000";

/// Deployment classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Preview,
}

impl Environment {
    /// `preview` (any case, surrounding whitespace ignored) maps to
    /// [`Environment::Preview`]; everything else, including unset, is
    /// production.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if value.trim().eq_ignore_ascii_case("preview") => Environment::Preview,
            _ => Environment::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Preview => "preview",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true for exactly 40 hex characters (either case).
pub fn is_commit_sha(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lower-case a candidate SHA, or fall back to forty zeros.
pub fn normalize_commit_sha(candidate: Option<&str>) -> String {
    match candidate.map(str::trim) {
        Some(sha) if is_commit_sha(sha) => sha.to_ascii_lowercase(),
        _ => FALLBACK_COMMIT_SHA.to_string(),
    }
}

/// Detect the deployed commit from the process environment.
pub fn commit_sha() -> String {
    commit_sha_from(|name| std::env::var(name).ok())
}

/// Detect the deployed commit using a custom variable lookup.
///
/// The first variable in [`COMMIT_SHA_VARS`] with a non-blank value wins,
/// even if that value turns out to be malformed.
pub fn commit_sha_from<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let found = COMMIT_SHA_VARS
        .iter()
        .filter_map(|&name| lookup(name))
        .find(|value| !value.trim().is_empty());
    normalize_commit_sha(found.as_deref())
}

/// Context object sent alongside every error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn commit_sha(&self) -> Option<&str> {
        self.get_str("commit_sha")
    }

    pub fn environment(&self) -> Option<&str> {
        self.get_str("environment")
    }

    pub fn occurred_at(&self) -> Option<&str> {
        self.get_str("occurred_at")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Context(map)
    }
}

/// Build a context stamped with the current time and detected commit.
pub fn build_context(environment: Environment, extra: Option<&Map<String, Value>>) -> Context {
    build_context_at(environment, extra, Utc::now(), &commit_sha())
}

/// Build a context from explicit inputs. Extra fields overwrite built-ins.
pub fn build_context_at(
    environment: Environment,
    extra: Option<&Map<String, Value>>,
    occurred_at: DateTime<Utc>,
    commit_sha: &str,
) -> Context {
    let mut fields = Map::new();
    fields.insert("commit_sha".into(), Value::String(commit_sha.to_string()));
    fields.insert(
        "environment".into(),
        Value::String(environment.as_str().to_string()),
    );
    fields.insert(
        "occurred_at".into(),
        Value::String(occurred_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    if let Some(extra) = extra {
        for (key, value) in extra {
            fields.insert(key.clone(), value.clone());
        }
    }

    Context(fields)
}
