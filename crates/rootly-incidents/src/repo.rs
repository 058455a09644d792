//! GitHub repository detection from a working tree.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

fn github_remote() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"github\.com[/:](.+?)/(.+?)(\.git)?$").expect("static regex"))
}

fn origin_url() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\[remote "origin"\][\s\S]*?url\s*=\s*(.+)"#).expect("static regex")
    })
}

/// `owner/repo` from a GitHub remote URL (HTTPS or SSH, with or without `.git`).
pub fn parse_github_repo(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    let caps = github_remote().captures(url)?;
    let owner = caps.get(1)?.as_str();
    let repo = caps.get(2)?.as_str();
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}

/// Read `<root>/.git/config` and parse the `origin` remote.
pub fn detect_repo(root: &Path) -> Option<String> {
    let config_path = root.join(".git").join("config");
    let config = match std::fs::read_to_string(&config_path) {
        Ok(config) => config,
        Err(err) => {
            debug!(event = "repo.detect_failed", path = %config_path.display(), error = %err);
            return None;
        }
    };

    let remote = origin_url().captures(&config)?.get(1)?.as_str().trim();
    parse_github_repo(remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_forms() {
        assert_eq!(
            parse_github_repo("https://github.com/acme/shop.git").as_deref(),
            Some("acme/shop")
        );
        assert_eq!(
            parse_github_repo("https://github.com/acme/shop").as_deref(),
            Some("acme/shop")
        );
        assert_eq!(
            parse_github_repo("https://github.com/acme/shop/").as_deref(),
            Some("acme/shop")
        );
    }

    #[test]
    fn ssh_forms() {
        assert_eq!(
            parse_github_repo("git@github.com:acme/shop.git").as_deref(),
            Some("acme/shop")
        );
        assert_eq!(
            parse_github_repo("ssh://git@github.com/acme/shop").as_deref(),
            Some("acme/shop")
        );
    }

    #[test]
    fn non_github_is_none() {
        assert_eq!(parse_github_repo("https://gitlab.com/acme/shop.git"), None);
        assert_eq!(parse_github_repo("github.com/acme"), None);
    }
}
