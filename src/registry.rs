use reqwest::blocking::Client;
use tracing::{ debug, warn };

use crate::client::HttpConfig;
use crate::error::AnalyzerError;
use crate::package::PackageInfo;
use crate::pypi_api::PypiJsonSource;
use crate::pypi_page::PypiPageSource;

/// Anything that can produce package metadata for a name and optional version.
pub trait MetadataSource {
    fn fetch(&self, name: &str, version: Option<&str>) -> Result<PackageInfo, AnalyzerError>;

    /// Short label used in log lines
    fn label(&self) -> &str;
}

/// Registry lookup that fills gaps in the structured response from a
/// secondary source. The secondary is best-effort: its failures are logged
/// and the structured data is returned as is.
pub struct RegistryClient {
    primary: Box<dyn MetadataSource>,
    fallback: Option<Box<dyn MetadataSource>>,
}

impl RegistryClient {
    pub fn new(
        primary: Box<dyn MetadataSource>,
        fallback: Option<Box<dyn MetadataSource>>
    ) -> Self {
        RegistryClient { primary, fallback }
    }

    /// The PyPI JSON API, optionally backed by project page scraping.
    pub fn pypi(client: &Client, config: &HttpConfig, scrape: bool) -> Self {
        let primary: Box<dyn MetadataSource> = Box::new(
            PypiJsonSource::new(client.clone(), &config.registry_url)
        );
        let fallback: Option<Box<dyn MetadataSource>> = if scrape {
            Some(Box::new(PypiPageSource::new(client.clone(), &config.registry_url)))
        } else {
            None
        };

        RegistryClient::new(primary, fallback)
    }

    /// The structured source alone, for bulk lookups such as the dependency
    /// walk where page data is never displayed.
    pub fn structured(&self) -> &dyn MetadataSource {
        self.primary.as_ref()
    }
}

impl MetadataSource for RegistryClient {
    fn fetch(&self, name: &str, version: Option<&str>) -> Result<PackageInfo, AnalyzerError> {
        let mut info = self.primary.fetch(name, version)?;

        let missing = info.missing_fields();
        if missing.is_empty() {
            return Ok(info);
        }

        if let Some(fallback) = &self.fallback {
            debug!(
                package = %info.name,
                missing = ?missing,
                "supplementing metadata from {}",
                fallback.label()
            );
            match fallback.fetch(&info.name, Some(&info.version)) {
                Ok(extra) => info.fill_missing_from(extra),
                Err(e) => {
                    warn!(package = %info.name, "{} lookup failed: {}", fallback.label(), e);
                }
            }
        }

        Ok(info)
    }

    fn label(&self) -> &str {
        self.primary.label()
    }
}
