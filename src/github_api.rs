use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use urlencoding::encode;

use crate::error::AnalyzerError;
use crate::issues::{ Issue, IssueSource, RepositoryActivity };

const LISTED_ISSUES: usize = 5;
// The issues endpoint also returns pull requests, so over-fetch before filtering
const PAGE_SIZE: &str = "30";

#[derive(Debug, Deserialize)]
struct SearchResult {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct GithubIssue {
    number: u64,
    title: String,
    html_url: String,
    #[serde(default)]
    comments: u64,
    pull_request: Option<Value>,
}

/// Issue tracker summary from the GitHub REST API.
pub struct GithubClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Self {
        GithubClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, AnalyzerError> {
        debug!("GET {} {:?}", url, query);

        let mut request = self.client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(AnalyzerError::NotFound(format!("GitHub returned 404 for {}", url)));
            }
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                return Err(
                    AnalyzerError::Network(
                        "GitHub API rate limit exceeded (set GITHUB_TOKEN to raise it)".to_string()
                    )
                );
            }
            status if !status.is_success() => {
                return Err(
                    AnalyzerError::Network(
                        format!("GitHub API returned status code {}", status.as_u16())
                    )
                );
            }
            _ => {}
        }

        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| AnalyzerError::InvalidResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn open_count(&self, owner: &str, repo: &str, kind: &str) -> Result<u64, AnalyzerError> {
        let url = format!("{}/search/issues", self.base_url);
        let q = format!("repo:{}/{} type:{} state:open", owner, repo, kind);
        let result: SearchResult = self.get(&url, &[("q", q.as_str()), ("per_page", "1")])?;
        Ok(result.total_count)
    }

    fn open_issues(&self, owner: &str, repo: &str, sort: &str) -> Result<Vec<Issue>, AnalyzerError> {
        let url = format!("{}/repos/{}/{}/issues", self.base_url, encode(owner), encode(repo));
        let items: Vec<GithubIssue> = self.get(
            &url,
            &[
                ("state", "open"),
                ("sort", sort),
                ("direction", "desc"),
                ("per_page", PAGE_SIZE),
            ]
        )?;

        Ok(
            items
                .into_iter()
                .filter(|i| i.pull_request.is_none())
                .take(LISTED_ISSUES)
                .map(|i| Issue {
                    number: i.number,
                    title: i.title.trim().to_string(),
                    url: i.html_url,
                    comments: i.comments,
                })
                .collect()
        )
    }
}

impl IssueSource for GithubClient {
    fn activity(&self, owner: &str, repo: &str) -> Result<RepositoryActivity, AnalyzerError> {
        Ok(RepositoryActivity {
            open_issues: self.open_count(owner, repo, "issue")?,
            open_pull_requests: self.open_count(owner, repo, "pr")?,
            recent_issues: self.open_issues(owner, repo, "created")?,
            top_issues: self.open_issues(owner, repo, "comments")?,
        })
    }
}
