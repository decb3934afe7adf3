use reqwest::blocking::Client;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use tracing::{ debug, warn };

use crate::advisory::{ score_severity, Advisory, AdvisorySource, Severity, SeveritySignals };
use crate::error::AnalyzerError;
use crate::package::normalize_name;

const ECOSYSTEM: &str = "PyPI";
const MAX_PAGES: usize = 10;

#[derive(Debug, Serialize)]
struct OsvQuery<'a> {
    package: OsvPackage<'a>,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct OsvPackage<'a> {
    name: &'a str,
    ecosystem: &'a str,
}

#[derive(Debug, Deserialize)]
struct OsvResponse {
    #[serde(default)]
    vulns: Vec<OsvVulnerability>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsvVulnerability {
    id: String,
    summary: Option<String>,
    details: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    published: Option<String>,
    database_specific: Option<Value>,
    #[serde(default)]
    affected: Vec<OsvAffected>,
    #[serde(default)]
    references: Vec<OsvReference>,
}

#[derive(Debug, Deserialize)]
struct OsvAffected {
    package: Option<OsvAffectedPackage>,
    #[serde(default)]
    ranges: Vec<OsvRange>,
    ecosystem_specific: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OsvAffectedPackage {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OsvRange {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    events: Vec<OsvEvent>,
}

#[derive(Debug, Deserialize)]
struct OsvEvent {
    introduced: Option<String>,
    fixed: Option<String>,
    last_affected: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsvReference {
    url: String,
}

/// Client for the OSV query API (`POST /v1/query`).
pub struct OsvClient {
    client: Client,
    base_url: String,
}

impl OsvClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        OsvClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl AdvisorySource for OsvClient {
    fn query(&self, name: &str, version: &str) -> Result<Vec<Advisory>, AnalyzerError> {
        let query_url = format!("{}/v1/query", self.base_url);
        let mut advisories = Vec::new();
        let mut page_token = None;

        for _ in 0..MAX_PAGES {
            let query = OsvQuery {
                package: OsvPackage { name, ecosystem: ECOSYSTEM },
                version,
                page_token: page_token.take(),
            };
            debug!("POST {} ({}@{})", query_url, name, version);

            let response = self.client.post(&query_url).json(&query).send()?;
            if !response.status().is_success() {
                return Err(
                    AnalyzerError::Network(
                        format!("OSV API returned status code {}", response.status().as_u16())
                    )
                );
            }

            let body = response.text()?;
            let page: OsvResponse = serde_json::from_str(&body).map_err(|e| {
                AnalyzerError::InvalidResponse { url: query_url.clone(), reason: e.to_string() }
            })?;

            advisories.extend(page.vulns.iter().map(|v| to_advisory(v, name)));

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    page_token = Some(token);
                }
                _ => {
                    return Ok(advisories);
                }
            }
        }

        warn!(
            package = name,
            pages = MAX_PAGES,
            collected = advisories.len(),
            "OSV still reports more pages, advisory list is incomplete"
        );
        Ok(advisories)
    }
}

fn to_advisory(vuln: &OsvVulnerability, package: &str) -> Advisory {
    let package_key = normalize_name(package);
    let relevant: Vec<&OsvAffected> = vuln.affected
        .iter()
        .filter(|a| {
            a.package.as_ref().map_or(true, |p| normalize_name(&p.name) == package_key)
        })
        .collect();

    let severity = labelled_severity(vuln).unwrap_or_else(|| {
        let text = format!(
            "{} {}",
            vuln.summary.as_deref().unwrap_or_default(),
            vuln.details.as_deref().unwrap_or_default()
        );
        let flagged = vuln.affected
            .iter()
            .filter(|a| {
                a.ecosystem_specific
                    .as_ref()
                    .and_then(|e| e.get("affects_security"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            })
            .count();
        let signals = SeveritySignals {
            package,
            text: &text,
            cvss_score: vuln.database_specific.as_ref().and_then(cvss_score),
            security_flagged_entries: flagged,
        };
        score_severity(&signals)
    });

    let mut fixed_versions = Vec::new();
    let mut ranges = Vec::new();
    for range in relevant.iter().flat_map(|a| a.ranges.iter()) {
        if range.kind != "ECOSYSTEM" && range.kind != "SEMVER" {
            continue;
        }
        for event in &range.events {
            if let Some(fixed) = &event.fixed {
                if !fixed_versions.contains(fixed) {
                    fixed_versions.push(fixed.clone());
                }
            }
        }
        ranges.extend(describe_range(&range.events));
    }

    let summary = vuln.summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| vuln.details.as_deref().and_then(|d| d.lines().find(|l| !l.trim().is_empty())))
        .unwrap_or("No description available")
        .trim()
        .to_string();

    Advisory {
        id: vuln.id.clone(),
        severity,
        summary,
        affected_range: if ranges.is_empty() {
            None
        } else {
            Some(ranges.join(" || "))
        },
        fixed_versions,
        aliases: vuln.aliases.clone(),
        references: vuln.references
            .iter()
            .map(|r| r.url.clone())
            .collect(),
        published: vuln.published.clone(),
    }
}

fn labelled_severity(vuln: &OsvVulnerability) -> Option<Severity> {
    vuln.database_specific
        .as_ref()
        .and_then(|d| d.get("severity"))
        .and_then(Value::as_str)
        .and_then(Severity::from_label)
}

fn cvss_score(database_specific: &Value) -> Option<f64> {
    let score = database_specific.get("cvss_score")?;
    score.as_f64().or_else(|| score.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Render range events as intervals, e.g. `>=2.3.0, <2.31.0`.
fn describe_range(events: &[OsvEvent]) -> Vec<String> {
    fn interval(lower: &Option<String>, upper: Option<String>) -> String {
        let parts: Vec<String> = lower
            .iter()
            .map(|l| format!(">={}", l))
            .chain(upper)
            .collect();
        if parts.is_empty() {
            "*".to_string()
        } else {
            parts.join(", ")
        }
    }

    let mut intervals = Vec::new();
    let mut open: Option<Option<String>> = None;

    for event in events {
        if let Some(introduced) = &event.introduced {
            let lower = if introduced == "0" { None } else { Some(introduced.clone()) };
            open = Some(lower);
        } else if let Some(fixed) = &event.fixed {
            let lower = open.take().unwrap_or_default();
            intervals.push(interval(&lower, Some(format!("<{}", fixed))));
        } else if let Some(last) = &event.last_affected {
            let lower = open.take().unwrap_or_default();
            intervals.push(interval(&lower, Some(format!("<={}", last))));
        }
    }

    if let Some(lower) = open {
        intervals.push(interval(&lower, None));
    }

    intervals
}
