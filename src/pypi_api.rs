use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;
use urlencoding::encode;

use crate::error::AnalyzerError;
use crate::license;
use crate::issues::parse_github_repo;
use crate::package::{ development_status, non_empty, python_versions, Dependency, PackageInfo };
use crate::registry::MetadataSource;

const RECENT_RELEASES: usize = 5;

#[derive(Debug, Deserialize)]
struct PypiResponse {
    info: PypiInfo,
    // Only present on the unversioned endpoint
    #[serde(default)]
    releases: HashMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct PypiInfo {
    name: String,
    version: String,
    summary: Option<String>,
    license: Option<String>,
    license_expression: Option<String>,
    #[serde(default)]
    classifiers: Vec<String>,
    author: Option<String>,
    author_email: Option<String>,
    maintainer: Option<String>,
    home_page: Option<String>,
    docs_url: Option<String>,
    project_urls: Option<HashMap<String, String>>,
    requires_python: Option<String>,
    requires_dist: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    upload_time_iso_8601: Option<String>,
    upload_time: Option<String>,
    #[serde(default)]
    yanked: bool,
}

/// Metadata from the PyPI JSON API (`/pypi/<name>[/<version>]/json`).
pub struct PypiJsonSource {
    client: Client,
    base_url: String,
}

impl PypiJsonSource {
    pub fn new(client: Client, base_url: &str) -> Self {
        PypiJsonSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn api_url(&self, name: &str, version: Option<&str>) -> String {
        match version {
            Some(version) =>
                format!("{}/pypi/{}/{}/json", self.base_url, encode(name), encode(version)),
            None => format!("{}/pypi/{}/json", self.base_url, encode(name)),
        }
    }
}

impl MetadataSource for PypiJsonSource {
    fn fetch(&self, name: &str, version: Option<&str>) -> Result<PackageInfo, AnalyzerError> {
        let api_url = self.api_url(name, version);
        debug!("GET {}", api_url);

        let response = self.client.get(&api_url).send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(
                AnalyzerError::NotFound(match version {
                    Some(v) => format!("Version {} of package '{}' not found on PyPI", v, name),
                    None => format!("Package '{}' not found on PyPI", name),
                })
            );
        }

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let reason = response.status().canonical_reason().unwrap_or("Unknown error");
            return Err(
                AnalyzerError::Network(
                    format!("PyPI API returned status code {}: {}", status_code, reason)
                )
            );
        }

        let response_text = response.text()?;
        parse_api_response(&response_text).map_err(|e| AnalyzerError::InvalidResponse {
            url: api_url,
            reason: e.to_string(),
        })
    }

    fn label(&self) -> &str {
        "PyPI JSON API"
    }
}

fn parse_api_response(body: &str) -> Result<PackageInfo, serde_json::Error> {
    let data: PypiResponse = serde_json::from_str(body)?;
    let info = data.info;

    let license = non_empty(info.license_expression.as_deref())
        .map(|l| license::normalize_license_id(&l))
        .or_else(|| info.license.as_deref().and_then(license::resolve_license_field))
        .or_else(|| license::license_from_classifiers(&info.classifiers));
    let license_url = license.as_deref().and_then(license::get_license_url);

    let project_urls = info.project_urls.unwrap_or_default();
    let repository = repository_url(&project_urls, info.home_page.as_deref());
    let homepage = non_empty(info.home_page.as_deref()).or_else(||
        project_url(&project_urls, &["homepage", "home", "home page"])
    );
    let documentation = non_empty(info.docs_url.as_deref()).or_else(||
        project_url(&project_urls, &["documentation", "docs"])
    );

    let author = non_empty(info.author.as_deref()).or_else(||
        info.author_email.as_deref().and_then(name_from_email)
    );

    let maintainers: Vec<String> = info.maintainer
        .as_deref()
        .map(|m| {
            m.split(',')
                .filter_map(|x| non_empty(Some(x)))
                .collect()
        })
        .unwrap_or_default();

    let dependencies: Vec<Dependency> = info.requires_dist
        .unwrap_or_default()
        .iter()
        .filter_map(|r| Dependency::parse(r))
        .collect();

    Ok(PackageInfo {
        name: info.name,
        version: info.version,
        summary: non_empty(info.summary.as_deref()),
        license,
        license_url,
        author,
        homepage,
        documentation,
        requires_python: non_empty(info.requires_python.as_deref()),
        development_status: development_status(&info.classifiers),
        python_versions: python_versions(&info.classifiers),
        repository,
        dependencies,
        recent_releases: recent_releases(&data.releases, RECENT_RELEASES),
        maintainers,
        install_command: None,
    })
}

fn project_url(urls: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    urls.iter()
        .find(|(label, _)| keys.contains(&label.to_lowercase().as_str()))
        .and_then(|(_, url)| non_empty(Some(url.as_str())))
}

// Labels that usually point at the source repository, best first
const REPOSITORY_LABELS: [&str; 7] = [
    "source",
    "source code",
    "repository",
    "code",
    "github",
    "issues",
    "homepage",
];

/// The project's GitHub repository, taken from `project_urls` (preferring
/// source-like labels) or the home page.
fn repository_url(urls: &HashMap<String, String>, home_page: Option<&str>) -> Option<String> {
    let mut candidates: Vec<(usize, &str, &str)> = urls
        .iter()
        .map(|(label, url)| {
            let label_lc = label.to_lowercase();
            let rank = REPOSITORY_LABELS.iter()
                .position(|l| *l == label_lc)
                .unwrap_or(REPOSITORY_LABELS.len());
            (rank, label.as_str(), url.as_str())
        })
        .collect();
    candidates.sort();

    candidates
        .into_iter()
        .map(|(_, _, url)| url)
        .chain(home_page)
        .find_map(parse_github_repo)
        .map(|(owner, repo)| format!("https://github.com/{}/{}", owner, repo))
}

// "Jane Doe <jane@example.org>" -> "Jane Doe"
fn name_from_email(value: &str) -> Option<String> {
    let first = value.split(',').next()?;
    match first.split_once('<') {
        Some((name, _)) => non_empty(Some(name.trim().trim_matches('"'))),
        None => non_empty(Some(first)),
    }
}

/// Newest releases first, ordered by the first upload of each version.
/// Versions with no files or only yanked files are skipped.
fn recent_releases(releases: &HashMap<String, Vec<ReleaseFile>>, limit: usize) -> Vec<String> {
    let mut dated: Vec<(&str, &str)> = releases
        .iter()
        .filter_map(|(version, files)| {
            files
                .iter()
                .filter(|f| !f.yanked)
                .filter_map(|f| f.upload_time_iso_8601.as_deref().or(f.upload_time.as_deref()))
                .min()
                .map(|uploaded| (version.as_str(), uploaded))
        })
        .collect();

    dated.sort_by(|a, b| b.1.cmp(a.1).then_with(|| b.0.cmp(a.0)));
    dated
        .into_iter()
        .take(limit)
        .map(|(version, _)| version.to_string())
        .collect()
}
