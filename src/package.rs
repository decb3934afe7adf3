use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ Serialize, Deserialize };

use crate::error::AnalyzerError;

static PACKAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)([a-z0-9]|[a-z0-9][a-z0-9._-]*[a-z0-9])$").unwrap()
});

static REQUIREMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[([^\]]*)\])?\s*(.*)$").unwrap()
});

static NAME_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.]+").unwrap());

/// A declared requirement of a package, as listed in `requires_dist`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl Dependency {
    pub fn new(name: &str) -> Self {
        Dependency {
            name: name.to_string(),
            constraint: None,
            extras: Vec::new(),
            marker: None,
        }
    }

    /// Parse a PEP 508 requirement string such as
    /// `PySocks!=1.5.7,>=1.5.6; extra == "socks"`.
    pub fn parse(requirement: &str) -> Option<Self> {
        let (spec, marker) = match requirement.split_once(';') {
            Some((spec, marker)) => (spec, Some(marker.trim())),
            None => (requirement, None),
        };

        let caps = REQUIREMENT.captures(spec)?;
        let name = caps.get(1)?.as_str().to_string();

        let extras = caps
            .get(2)
            .map(|e| {
                e.as_str()
                    .split(',')
                    .map(|x| x.trim().to_string())
                    .filter(|x| !x.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        // Old-style metadata wraps the specifier in parentheses: `idna (<4,>=2.5)`
        let constraint = caps
            .get(3)
            .map(|c| c.as_str().trim().trim_start_matches('(').trim_end_matches(')').trim())
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string());

        Some(Dependency {
            name,
            constraint,
            extras,
            marker: marker.filter(|m| !m.is_empty()).map(|m| m.to_string()),
        })
    }

    /// Requirements gated on an extra are only installed on request.
    pub fn is_optional(&self) -> bool {
        self.marker.as_deref().map_or(false, |m| m.contains("extra"))
    }
}

/// Metadata for one release of a package, merged from the registry API and,
/// where that left gaps, the project page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_python: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development_status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub python_versions: Vec<String>,
    /// Canonical `https://github.com/<owner>/<repo>` link, when one is listed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_releases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_command: Option<String>,
}

impl PackageInfo {
    pub fn new(name: &str, version: &str) -> Self {
        PackageInfo {
            name: name.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    /// Fields the project page can supply when the registry API left them blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.summary.is_none() {
            missing.push("summary");
        }
        if self.license.is_none() {
            missing.push("license");
        }
        if self.homepage.is_none() {
            missing.push("homepage");
        }
        if self.author.is_none() {
            missing.push("author");
        }
        if self.maintainers.is_empty() {
            missing.push("maintainers");
        }
        if self.recent_releases.is_empty() {
            missing.push("recent_releases");
        }
        missing
    }

    /// Copy over values from `other` only where this record has none.
    pub fn fill_missing_from(&mut self, other: PackageInfo) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        fill(&mut self.summary, other.summary);
        fill(&mut self.license, other.license);
        fill(&mut self.license_url, other.license_url);
        fill(&mut self.author, other.author);
        fill(&mut self.homepage, other.homepage);
        fill(&mut self.documentation, other.documentation);
        fill(&mut self.requires_python, other.requires_python);
        fill(&mut self.development_status, other.development_status);
        fill(&mut self.repository, other.repository);
        fill(&mut self.install_command, other.install_command);

        if self.dependencies.is_empty() {
            self.dependencies = other.dependencies;
        }
        if self.recent_releases.is_empty() {
            self.recent_releases = other.recent_releases;
        }
        if self.maintainers.is_empty() {
            self.maintainers = other.maintainers;
        }
        if self.python_versions.is_empty() {
            self.python_versions = other.python_versions;
        }
    }
}

/// `Development Status :: 5 - Production/Stable` yields `5 - Production/Stable`.
pub fn development_status<S: AsRef<str>>(classifiers: &[S]) -> Option<String> {
    classifiers
        .iter()
        .find_map(|c| c.as_ref().strip_prefix("Development Status :: "))
        .and_then(|status| non_empty(Some(status)))
}

/// Interpreter versions advertised by `Programming Language :: Python :: X.Y`
/// classifiers, in declaration order. Implementation and `3 :: Only` entries
/// are skipped.
pub fn python_versions<S: AsRef<str>>(classifiers: &[S]) -> Vec<String> {
    let mut versions: Vec<String> = Vec::new();
    for classifier in classifiers {
        let Some(version) = classifier.as_ref().strip_prefix("Programming Language :: Python :: ") else {
            continue;
        };
        let version = version.trim();
        if version.contains("::") || !version.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        if !versions.iter().any(|v| v == version) {
            versions.push(version.to_string());
        }
    }
    versions
}

/// PEP 503 normalized form, used to compare package names.
pub fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS.replace_all(&name.trim().to_lowercase(), "-").to_string()
}

pub fn validate_name(name: &str) -> Result<(), AnalyzerError> {
    if PACKAGE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(AnalyzerError::Config(format!("'{}' is not a valid package name", name)))
    }
}

/// Treat empty strings and the registry's "UNKNOWN" placeholder as absent.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("unknown") && *v != "None")
        .map(|v| v.to_string())
}
