//! Rootly Incidents: read side of the Rootly backend
//!
//! Fetches open incidents for a GitHub repository, verifies that a
//! repository is registered, polls on an interval, and detects the
//! repository from a local working tree.
//!
//! Errors are reported as stable tags (`UNAUTHORIZED`, `PROJECT_NOT_FOUND`,
//! `BAD_REQUEST: ...`, `HTTP_ERROR: ...`, `NETWORK_ERROR: ...`) through
//! [`IncidentsError`]'s `Display`.

pub mod client;
pub mod error;
pub mod poller;
pub mod repo;
pub mod types;

pub use client::{IncidentsClient, BACKEND_URL_ENV, DEFAULT_BACKEND_URL};
pub use error::IncidentsError;
pub use poller::{IncidentPoller, PollOutcome, SessionProvider, StaticSession, POLL_INTERVAL};
pub use repo::{detect_repo, parse_github_repo};
pub use types::{Incident, IncidentsResponse};

/// Result type for incidents operations
pub type Result<T> = std::result::Result<T, IncidentsError>;
