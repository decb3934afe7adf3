use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::error::AnalyzerError;

// Packages whose flaws tend to have wide blast radius
const SECURITY_CRITICAL_PACKAGES: [&str; 9] = [
    "cryptography",
    "django",
    "flask",
    "requests",
    "urllib3",
    "pyopenssl",
    "paramiko",
    "pyjwt",
    "python-jose",
];

const CRITICAL_KEYWORDS: [&str; 12] = [
    "remote code execution",
    "rce",
    "arbitrary code",
    "sql injection",
    "authentication bypass",
    "privilege escalation",
    "buffer overflow",
    "memory corruption",
    "denial of service",
    "information disclosure",
    "path traversal",
    "xss",
];

const SENSITIVE_TOPICS: [&str; 3] = ["cryptographic", "encryption", "authentication"];

/// Declared from least to most severe so that `Ord` follows severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse the severity labels used by advisory databases (GHSA uses MODERATE).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "HIGH" => Some(Severity::High),
            "MODERATE" | "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            _ => None,
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Severity::Critical
        } else if score >= 7.0 {
            Severity::High
        } else if score >= 4.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    pub id: String,
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_range: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fixed_versions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

/// Inputs for the fallback severity score, used when the advisory carries
/// no severity label of its own.
#[derive(Debug, Default)]
pub struct SeveritySignals<'a> {
    pub package: &'a str,
    pub text: &'a str,
    pub cvss_score: Option<f64>,
    pub security_flagged_entries: usize,
}

pub fn score_severity(signals: &SeveritySignals) -> Severity {
    let mut score = signals.cvss_score.unwrap_or(0.0);
    let text = signals.text.to_lowercase();

    score += 2.0 * (CRITICAL_KEYWORDS.iter().filter(|k| mentions_keyword(&text, k)).count() as f64);

    if SECURITY_CRITICAL_PACKAGES.contains(&signals.package.to_lowercase().as_str()) {
        score += 1.0;
    }

    if SENSITIVE_TOPICS.iter().any(|t| text.contains(t)) {
        score += 1.5;
    }

    score += 2.0 * (signals.security_flagged_entries as f64);

    Severity::from_score(score)
}

// Phrases match anywhere so inflections still count ("sql injections").
// Single tokens such as "rce" and "xss" must not match inside other words.
fn mentions_keyword(text: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        text.contains(keyword)
    } else {
        contains_word(text, keyword)
    }
}

fn contains_word(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(start, _)| {
        let end = start + keyword.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        !before.map_or(false, char::is_alphanumeric) && !after.map_or(false, char::is_alphanumeric)
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SecurityReport {
    Available {
        total: usize,
        severity_counts: SeverityCounts,
        advisories: Vec<Advisory>,
    },
    Unavailable {
        reason: String,
    },
}

impl SecurityReport {
    /// Orders advisories most severe first, keeping source order within a severity.
    pub fn from_advisories(mut advisories: Vec<Advisory>) -> Self {
        advisories.sort_by(|a, b| b.severity.cmp(&a.severity));

        let mut severity_counts = SeverityCounts::default();
        for advisory in &advisories {
            severity_counts.record(advisory.severity);
        }

        SecurityReport::Available {
            total: advisories.len(),
            severity_counts,
            advisories,
        }
    }
}

/// Anything that can list published advisories for a package release.
pub trait AdvisorySource {
    fn query(&self, name: &str, version: &str) -> Result<Vec<Advisory>, AnalyzerError>;
}

/// Security data is an optional addition to the report, so an unreachable
/// advisory service degrades to `Unavailable` instead of failing the run.
pub fn security_report(source: &dyn AdvisorySource, name: &str, version: &str) -> SecurityReport {
    match source.query(name, version) {
        Ok(advisories) => SecurityReport::from_advisories(advisories),
        Err(e) => {
            warn!(package = name, "vulnerability lookup failed: {}", e);
            SecurityReport::Unavailable {
                reason: format!("no data available ({})", e),
            }
        }
    }
}
