use clap::{ ArgAction, Parser };
use std::path::PathBuf;

use crate::client::{
    HttpConfig,
    DEFAULT_GITHUB_API_URL,
    DEFAULT_OSV_URL,
    DEFAULT_REGISTRY_URL,
    DEFAULT_TIMEOUT_SECS,
};

// `--version` names the package release to analyze, so clap's own version
// flag is left off the command.
#[derive(Parser, Debug, Clone)]
#[command(name = "package_analyzer", author, about, long_about = None)]
pub struct Args {
    /// Name of the PyPI package to analyze
    #[arg(index = 1, value_name = "PACKAGE")]
    pub package: String,

    /// Analyze this release instead of the latest one
    #[arg(short = 'v', long = "version", value_name = "VERSION")]
    pub version: Option<String>,

    /// Report format: table or json
    #[arg(short, long, default_value = "table", value_name = "FORMAT")]
    pub format: String,

    /// Query the vulnerability database for the analyzed release
    #[arg(long, action = ArgAction::SetTrue)]
    pub security: bool,

    /// Write the report to <PACKAGE>_analysis.<ext> in the output directory
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub save: bool,

    /// Summarize open issues and pull requests of the package's GitHub repository
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub issues: bool,

    /// Render the dependency graph with Graphviz
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub graph: bool,

    /// Levels of dependencies to walk for the graph (0 = root only)
    #[arg(short, long, default_value_t = 2, value_name = "DEPTH")]
    pub depth: usize,

    /// Image format for the graph: png, svg or pdf
    #[arg(long = "graph-format", default_value = "png", value_name = "FORMAT")]
    pub graph_format: String,

    /// Directory for saved reports and graph images
    #[arg(short, long = "output-dir", default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Do not scrape the project page for fields missing from the JSON API
    #[arg(long = "no-scrape", action = ArgAction::SetTrue)]
    pub no_scrape: bool,

    /// HTTP timeout in seconds
    #[arg(
        long,
        env = "PACKAGE_ANALYZER_TIMEOUT",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        value_name = "SECS"
    )]
    pub timeout: u64,

    /// Base URL of the package registry
    #[arg(
        long = "registry-url",
        env = "PACKAGE_ANALYZER_REGISTRY_URL",
        default_value = DEFAULT_REGISTRY_URL,
        value_name = "URL"
    )]
    pub registry_url: String,

    /// Base URL of the OSV vulnerability API
    #[arg(
        long = "osv-url",
        env = "PACKAGE_ANALYZER_OSV_URL",
        default_value = DEFAULT_OSV_URL,
        value_name = "URL"
    )]
    pub osv_url: String,

    /// Base URL of the GitHub REST API
    #[arg(
        long = "github-api-url",
        env = "PACKAGE_ANALYZER_GITHUB_API_URL",
        default_value = DEFAULT_GITHUB_API_URL,
        value_name = "URL"
    )]
    pub github_api_url: String,

    /// GitHub token for the issue summary (raises the API rate limit)
    #[arg(long = "github-token", env = "GITHUB_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    pub github_token: Option<String>,

    /// Graphviz executable used to lay out the graph
    #[arg(
        long = "dot-program",
        env = "PACKAGE_ANALYZER_DOT",
        default_value = "dot",
        value_name = "PROGRAM"
    )]
    pub dot_program: PathBuf,

    /// Show debug logging on stderr
    #[arg(long, action = ArgAction::SetTrue)]
    pub verbose: bool,
}

impl Args {
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::new(&self.registry_url, &self.osv_url, self.timeout).with_github_api_url(
            &self.github_api_url
        )
    }
}
