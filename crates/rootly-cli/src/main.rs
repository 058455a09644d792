//! Rootly CLI
//!
//! The `rootly` command inspects what the runtime would report from this
//! machine and talks to the incidents API.
//!
//! ## Commands
//!
//! - `sha`: Print the commit SHA the runtime would attach
//! - `context`: Print a deployment context as JSON
//! - `send-test`: Send one test error through the full capture pipeline
//! - `incidents`: List (or watch) open incidents for a repository
//! - `verify`: Check that a repository is registered
//! - `whoami`: Print the GitHub username for a session
//! - `detect-repo`: Print `owner/repo` for a working tree

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rootly_incidents::{
    detect_repo, Incident, IncidentPoller, IncidentsClient, StaticSession, BACKEND_URL_ENV,
    DEFAULT_BACKEND_URL,
};
use rootly_runtime::config::API_URL_ENV;
use rootly_runtime::{
    build_context, commit_sha, CaptureOutcome, CapturedError, Environment, InitOptions, Runtime,
    RuntimeConfig, Severity,
};
use serde_json::{Map, Value};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "rootly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rootly error telemetry tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the commit SHA detected from the environment
    Sha,

    /// Print the context that would be attached to a captured error
    Context {
        /// Environment name (normalised to production/preview)
        #[arg(short, long, env = "NODE_ENV")]
        environment: Option<String>,

        /// Extra context fields as key=value (repeatable)
        #[arg(short = 'x', long = "extra", value_parser = parse_key_value)]
        extra: Vec<(String, String)>,
    },

    /// Send a single test error to the ingest endpoint
    SendTest {
        /// Project API key
        #[arg(long, env = "ROOTLY_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Ingest base URL
        #[arg(long, env = API_URL_ENV)]
        api_url: Option<String>,

        /// Environment name
        #[arg(short, long, env = "NODE_ENV")]
        environment: Option<String>,

        /// Error message to send
        #[arg(short, long, default_value = "Rootly test error")]
        message: String,

        /// Severity: error, warning or info
        #[arg(short, long, default_value = "error")]
        severity: Severity,

        /// How long to wait for delivery, in milliseconds
        #[arg(long, default_value_t = 5000)]
        wait_ms: u64,
    },

    /// List open incidents for a repository
    Incidents {
        #[command(flatten)]
        backend: BackendArgs,

        /// Repository as owner/repo (detected from the working tree if omitted)
        #[arg(short, long)]
        repo: Option<String>,

        /// Keep polling and print every update
        #[arg(short, long)]
        watch: bool,

        /// Poll interval in seconds when watching
        #[arg(long, default_value_t = 45)]
        interval: u64,
    },

    /// Check that a repository is registered for the session user
    Verify {
        #[command(flatten)]
        backend: BackendArgs,

        /// Repository as owner/repo (detected from the working tree if omitted)
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// Print the GitHub username for the session
    Whoami {
        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Print owner/repo for a working tree
    DetectRepo {
        /// Working tree root (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(clap::Args)]
struct BackendArgs {
    /// Backend base URL
    #[arg(long, env = BACKEND_URL_ENV, default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,

    /// Session cookie header value
    #[arg(long, env = "ROOTLY_SESSION", hide_env_values = true)]
    session: String,
}

impl BackendArgs {
    fn client(&self) -> Result<IncidentsClient> {
        IncidentsClient::new(&self.backend_url).context("Failed to build incidents client")
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rootly_runtime::init_tracing(cli.json, level);

    match cli.command {
        Commands::Sha => cmd_sha(),
        Commands::Context { environment, extra } => cmd_context(environment.as_deref(), extra),
        Commands::SendTest {
            api_key,
            api_url,
            environment,
            message,
            severity,
            wait_ms,
        } => {
            let mut options = InitOptions::new(api_key).with_debug(cli.verbose);
            if let Some(url) = api_url {
                options = options.with_api_url(url);
            }
            if let Some(env) = environment {
                options = options.with_environment(env);
            }
            tokio::task::spawn_blocking(move || {
                cmd_send_test(options, &message, severity, Duration::from_millis(wait_ms))
            })
            .await
            .context("send-test task failed")?
        }
        Commands::Incidents {
            backend,
            repo,
            watch,
            interval,
        } => cmd_incidents(&backend, repo, watch, Duration::from_secs(interval)).await,
        Commands::Verify { backend, repo } => cmd_verify(&backend, repo).await,
        Commands::Whoami { backend } => cmd_whoami(&backend).await,
        Commands::DetectRepo { path } => cmd_detect_repo(&path),
    }
}

fn cmd_sha() -> Result<()> {
    println!("{}", commit_sha());
    Ok(())
}

fn cmd_context(environment: Option<&str>, extra: Vec<(String, String)>) -> Result<()> {
    let extra: Map<String, Value> = extra
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    let context = build_context(Environment::normalize(environment), Some(&extra));
    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(())
}

fn cmd_send_test(
    options: InitOptions,
    message: &str,
    severity: Severity,
    wait: Duration,
) -> Result<()> {
    let config = RuntimeConfig::from_options(&options).ok_or_else(|| anyhow!("API key is empty"))?;
    info!("Sending test error to {}", config.ingest_url());

    let runtime = Runtime::builder(config)
        .build()
        .context("Failed to start runtime")?;

    let error = CapturedError::new(
        "RootlyTestError",
        message,
        format!("RootlyTestError: {message}\n    at rootly send-test"),
    );
    let outcome = runtime.capture(&error, None, Some(severity));
    if outcome != CaptureOutcome::Sent {
        bail!("Capture was not sent: {outcome:?}");
    }

    if !runtime.flush(wait) {
        bail!("Delivery did not finish within {}ms", wait.as_millis());
    }

    let metrics = runtime.metrics();
    if metrics.sent() == 1 {
        println!("Test error delivered ({severity})");
        Ok(())
    } else {
        bail!("Ingest endpoint rejected the test error (run with --verbose for details)")
    }
}

fn resolve_repo(repo: Option<String>) -> Result<String> {
    match repo {
        Some(repo) => Ok(repo),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            detect_repo(&cwd).ok_or_else(|| {
                anyhow!("No GitHub origin found in {}; pass --repo", cwd.display())
            })
        }
    }
}

fn print_incidents(incidents: &[Incident]) {
    if incidents.is_empty() {
        println!("No open incidents");
        return;
    }
    for incident in incidents {
        println!(
            "{}  [{}]  {}  {}  {}",
            incident.incident_id,
            incident.environment,
            incident.short_sha(),
            incident.occurred_at,
            incident.summary
        );
    }
}

async fn cmd_incidents(
    backend: &BackendArgs,
    repo: Option<String>,
    watch: bool,
    interval: Duration,
) -> Result<()> {
    let repo = resolve_repo(repo)?;
    let client = backend.client()?;

    if !watch {
        let incidents = client
            .fetch_incidents(&repo, &backend.session)
            .await
            .with_context(|| format!("Failed to fetch incidents for {repo}"))?;
        print_incidents(&incidents);
        return Ok(());
    }

    let mut poller = IncidentPoller::new(client, Arc::new(StaticSession::new(&backend.session)))
        .with_interval(interval);
    let mut updates = poller.subscribe();
    poller.start(repo.clone());
    info!("Watching incidents for {repo} (Ctrl-C to stop)");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let incidents = updates.borrow_and_update().clone();
                print_incidents(&incidents);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.stop();
    Ok(())
}

async fn cmd_verify(backend: &BackendArgs, repo: Option<String>) -> Result<()> {
    let repo = resolve_repo(repo)?;
    if backend.client()?.verify_project(&repo, &backend.session).await {
        println!("{repo} is registered");
        Ok(())
    } else {
        bail!("{repo} is not registered for this session")
    }
}

async fn cmd_whoami(backend: &BackendArgs) -> Result<()> {
    match backend.client()?.username(&backend.session).await {
        Some(name) => {
            println!("{name}");
            Ok(())
        }
        None => bail!("Session is not authenticated"),
    }
}

fn cmd_detect_repo(path: &Path) -> Result<()> {
    let repo = detect_repo(path)
        .ok_or_else(|| anyhow!("No GitHub origin remote found in {}", path.display()))?;
    println!("{repo}");
    Ok(())
}
