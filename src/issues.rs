use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::error::AnalyzerError;
use crate::package::PackageInfo;

static GITHUB_REPO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:git\+)?(?:https?://|git://|ssh://git@|git@)?(?:www\.)?github\.com[/:]([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)"
    ).unwrap()
});

// Path prefixes on github.com that are not repository owners
const RESERVED_OWNERS: [&str; 4] = ["sponsors", "orgs", "users", "settings"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub comments: u64,
}

/// Open work on a repository as reported by its issue tracker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryActivity {
    pub open_issues: u64,
    pub open_pull_requests: u64,
    pub recent_issues: Vec<Issue>,
    pub top_issues: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IssueReport {
    Available {
        repository: String,
        open_issues: u64,
        open_pull_requests: u64,
        recent_issues: Vec<Issue>,
        top_issues: Vec<Issue>,
    },
    Unavailable {
        reason: String,
    },
}

/// Anything that can summarize the issue tracker of a GitHub repository.
pub trait IssueSource {
    fn activity(&self, owner: &str, repo: &str) -> Result<RepositoryActivity, AnalyzerError>;
}

/// Split a GitHub link into owner and repository name. Accepts web, git and
/// ssh forms, and links to pages inside the repository.
pub fn parse_github_repo(url: &str) -> Option<(String, String)> {
    let caps = GITHUB_REPO.captures(url.trim())?;
    let owner = caps[1].to_string();
    let repo = caps[2].trim_end_matches(".git").to_string();

    if repo.is_empty() || RESERVED_OWNERS.contains(&owner.to_lowercase().as_str()) {
        return None;
    }
    Some((owner, repo))
}

/// Like the security report, issue data is optional: a package without a
/// GitHub link or an unreachable tracker yields `Unavailable`.
pub fn issue_report(source: &dyn IssueSource, package: &PackageInfo) -> IssueReport {
    let Some((owner, repo)) = package.repository.as_deref().and_then(parse_github_repo) else {
        return IssueReport::Unavailable {
            reason: format!("no data available (no GitHub repository listed for {})", package.name),
        };
    };

    match source.activity(&owner, &repo) {
        Ok(activity) =>
            IssueReport::Available {
                repository: format!("https://github.com/{}/{}", owner, repo),
                open_issues: activity.open_issues,
                open_pull_requests: activity.open_pull_requests,
                recent_issues: activity.recent_issues,
                top_issues: activity.top_issues,
            },
        Err(e) => {
            warn!(package = %package.name, owner = %owner, repo = %repo, "issue lookup failed: {}", e);
            IssueReport::Unavailable {
                reason: format!("no data available ({})", e),
            }
        }
    }
}
