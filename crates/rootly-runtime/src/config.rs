//! Runtime configuration.
//!
//! [`InitOptions`] is what a host passes to [`init`](crate::init);
//! [`RuntimeConfig`] is the fully resolved form (environment normalised,
//! endpoint chosen, pipeline limits filled in).

use std::time::Duration;

use crate::context::Environment;
use crate::dedup::{DEFAULT_DEDUP_WINDOW, DEFAULT_MAX_FINGERPRINTS};
use crate::rate_limit::{DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW};
use crate::transport::DEFAULT_REQUEST_TIMEOUT;

/// Ingest base URL used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "https://3.111.33.111.nip.io";

/// Overrides the ingest base URL.
pub const API_URL_ENV: &str = "ROOTLY_API_URL";

/// Environment fallback when no explicit environment is given.
pub const ENVIRONMENT_ENV: &str = "NODE_ENV";

/// How long shutdown paths wait for in-flight sends.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Options accepted by [`init`](crate::init).
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Project API key. Blank keys disable the runtime.
    pub api_key: String,
    /// Raw environment name; normalised to `production` / `preview`.
    pub environment: Option<String>,
    /// Explicit ingest base URL; takes precedence over `ROOTLY_API_URL`.
    pub api_url: Option<String>,
    /// Surface pipeline decisions at `debug` level.
    pub debug: bool,
}

impl InitOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_key: String,
    pub environment: Environment,
    /// Base URL without trailing slash; ingest path is appended.
    pub api_url: String,
    pub debug: bool,
    pub dedup_window: Duration,
    pub max_fingerprints: usize,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Append a full backtrace to captured stacks.
    pub attach_backtrace: bool,
    /// Fixed commit SHA; detected from the environment per capture when unset.
    pub commit_sha: Option<String>,
}

impl RuntimeConfig {
    /// Defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            environment: Environment::Production,
            api_url: DEFAULT_API_URL.to_string(),
            debug: false,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            max_fingerprints: DEFAULT_MAX_FINGERPRINTS,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            attach_backtrace: false,
            commit_sha: None,
        }
    }

    /// Resolve options against the process environment.
    ///
    /// Returns `None` when the API key is blank.
    pub fn from_options(options: &InitOptions) -> Option<Self> {
        Self::from_options_with(options, |name| std::env::var(name).ok())
    }

    /// Resolve options against a custom variable lookup.
    pub fn from_options_with<F>(options: &InitOptions, lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = options.api_key.trim();
        if api_key.is_empty() {
            return None;
        }

        let environment = match &options.environment {
            Some(env) => Environment::normalize(Some(env.as_str())),
            None => Environment::normalize(lookup(ENVIRONMENT_ENV).as_deref()),
        };

        let api_url = options
            .api_url
            .clone()
            .or_else(|| lookup(API_URL_ENV))
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Some(
            Self::new(api_key)
                .with_environment(environment)
                .with_api_url(api_url)
                .with_debug(options.debug),
        )
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_dedup(mut self, window: Duration, max_fingerprints: usize) -> Self {
        self.dedup_window = window;
        self.max_fingerprints = max_fingerprints;
        self
    }

    pub fn with_rate_limit(mut self, window: Duration, max: usize) -> Self {
        self.rate_limit_window = window;
        self.rate_limit_max = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_backtrace(mut self, attach: bool) -> Self {
        self.attach_backtrace = attach;
        self
    }

    pub fn with_commit_sha(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }

    /// Full ingest endpoint.
    pub fn ingest_url(&self) -> String {
        format!("{}{}", self.api_url, crate::transport::INGEST_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn blank_key_disables() {
        assert!(RuntimeConfig::from_options_with(&InitOptions::new(""), no_env).is_none());
        assert!(RuntimeConfig::from_options_with(&InitOptions::new("   "), no_env).is_none());
    }

    #[test]
    fn defaults() {
        let cfg = RuntimeConfig::from_options_with(&InitOptions::new("key"), no_env).unwrap();
        assert_eq!(cfg.api_key, "key");
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.dedup_window, Duration::from_secs(10));
        assert_eq!(cfg.max_fingerprints, 500);
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(60));
        assert_eq!(cfg.rate_limit_max, 20);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert!(!cfg.debug);
    }

    #[test]
    fn environment_falls_back_to_node_env() {
        let lookup = |name: &str| (name == ENVIRONMENT_ENV).then(|| "Preview".to_string());
        let cfg = RuntimeConfig::from_options_with(&InitOptions::new("key"), lookup).unwrap();
        assert_eq!(cfg.environment, Environment::Preview);

        let explicit = InitOptions::new("key").with_environment("production");
        let cfg = RuntimeConfig::from_options_with(&explicit, lookup).unwrap();
        assert_eq!(cfg.environment, Environment::Production);
    }

    #[test]
    fn api_url_precedence() {
        let lookup = |name: &str| (name == API_URL_ENV).then(|| " https://env.example/ ".to_string());
        let cfg = RuntimeConfig::from_options_with(&InitOptions::new("key"), lookup).unwrap();
        assert_eq!(cfg.api_url, "https://env.example");
        assert_eq!(cfg.ingest_url(), "https://env.example/api/ingest");

        let explicit = InitOptions::new("key").with_api_url("http://localhost:3001");
        let cfg = RuntimeConfig::from_options_with(&explicit, lookup).unwrap();
        assert_eq!(cfg.api_url, "http://localhost:3001");
    }

    #[test]
    fn blank_env_url_uses_default() {
        let lookup = |name: &str| (name == API_URL_ENV).then(|| "  ".to_string());
        let cfg = RuntimeConfig::from_options_with(&InitOptions::new("key"), lookup).unwrap();
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
    }
}
