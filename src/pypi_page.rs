use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::debug;
use urlencoding::encode;

use crate::error::AnalyzerError;
use crate::license;
use crate::package::{ non_empty, PackageInfo };
use crate::registry::MetadataSource;

const RECENT_RELEASES: usize = 5;

static SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<p class="package-description__summary">(.*?)</p>"#).unwrap()
});

static LICENSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<strong>License(?: Expression)?:</strong>(.*?)</p>").unwrap()
});

static AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<strong>Author:</strong>(.*?)</p>").unwrap()
});

static HOMEPAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*href="([^"]+)"[^>]*>\s*<i class="fa[sb]? fa-home""#).unwrap()
});

static MAINTAINER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a href="/user/([^/"]+)/""#).unwrap()
});

static PIP_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<span id="pip-command">(.*?)</span>"#).unwrap()
});

static RELEASE_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<p class="release__version">(.*?)</p>"#).unwrap()
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Metadata scraped from the human-facing project page. Only meant to fill
/// gaps left by the JSON API, so the result carries no dependencies.
pub struct PypiPageSource {
    client: Client,
    base_url: String,
}

impl PypiPageSource {
    pub fn new(client: Client, base_url: &str) -> Self {
        PypiPageSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn page_url(&self, name: &str, version: Option<&str>) -> String {
        match version {
            Some(version) =>
                format!("{}/project/{}/{}/", self.base_url, encode(name), encode(version)),
            None => format!("{}/project/{}/", self.base_url, encode(name)),
        }
    }
}

impl MetadataSource for PypiPageSource {
    fn fetch(&self, name: &str, version: Option<&str>) -> Result<PackageInfo, AnalyzerError> {
        let page_url = self.page_url(name, version);
        debug!("GET {}", page_url);

        let response = self.client.get(&page_url).send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AnalyzerError::NotFound(format!("No project page for '{}'", name)));
        }
        if !response.status().is_success() {
            return Err(
                AnalyzerError::Network(
                    format!("PyPI project page returned status code {}", response.status().as_u16())
                )
            );
        }

        let html = response.text()?;
        Ok(parse_project_page(&html, name, version.unwrap_or_default()))
    }

    fn label(&self) -> &str {
        "PyPI project page"
    }
}

pub fn parse_project_page(html: &str, name: &str, version: &str) -> PackageInfo {
    let mut info = PackageInfo::new(name, version);

    info.summary = first_text(&SUMMARY, html);
    info.license = first_text(&LICENSE, html).and_then(|l| license::resolve_license_field(&l));
    info.license_url = info.license.as_deref().and_then(license::get_license_url);
    info.author = first_text(&AUTHOR, html);
    info.homepage = HOMEPAGE.captures(html).map(|c| unescape(&c[1]));
    info.install_command = first_text(&PIP_COMMAND, html);

    for caps in MAINTAINER.captures_iter(html) {
        let user = unescape(&caps[1]);
        if !info.maintainers.contains(&user) {
            info.maintainers.push(user);
        }
    }

    // Release cards may carry badges such as "pre-release" after the version
    info.recent_releases = RELEASE_VERSION.captures_iter(html)
        .filter_map(|c| {
            clean_text(&c[1])
                .split_whitespace()
                .next()
                .map(|v| v.to_string())
        })
        .take(RECENT_RELEASES)
        .collect();

    info
}

fn first_text(pattern: &Regex, html: &str) -> Option<String> {
    pattern.captures(html).and_then(|c| non_empty(Some(clean_text(&c[1]).as_str())))
}

fn clean_text(fragment: &str) -> String {
    let text = TAG.replace_all(fragment, " ");
    unescape(&text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
