use clap::Parser;
use colored::Colorize;
use std::io::{ self, IsTerminal };
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod advisory;
mod analyzer;
mod cli;
mod client;
mod dependency_tree;
mod error;
mod github_api;
mod graph;
mod issues;
mod license;
mod osv_api;
mod output;
mod package;
mod pypi_api;
mod pypi_page;
mod registry;

use analyzer::{ Colors, Services };
use cli::Args;
use error::AnalyzerError;
use github_api::GithubClient;
use graph::GraphvizEngine;
use osv_api::OsvClient;
use registry::RegistryClient;

fn init_logging(verbose: bool) {
    // RUST_LOG wins over --verbose when both are given
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn build_services(args: &Args) -> Result<Services, AnalyzerError> {
    let config = args.http_config();
    debug!(
        registry = %config.registry_url,
        osv = %config.osv_url,
        github = %config.github_api_url,
        timeout = ?config.timeout,
        "http configuration"
    );
    let client = config.build_client()?;

    Ok(Services {
        registry: RegistryClient::pypi(&client, &config, !args.no_scrape),
        advisories: Box::new(OsvClient::new(client.clone(), &config.osv_url)),
        issues: Box::new(
            GithubClient::new(client.clone(), &config.github_api_url, args.github_token.clone())
        ),
        engine: Box::new(GraphvizEngine::new(args.dot_program.clone())),
    })
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let stdout = io::stdout();
    let colors = Colors {
        report: stdout.is_terminal(),
        progress: io::stderr().is_terminal(),
    };

    let result = build_services(&args).and_then(|services| {
        analyzer::run(&args, &services, &mut stdout.lock(), colors)
    });

    if let Err(e) = result {
        let message = format!("Error: {}", e);
        if colors.progress {
            eprintln!("{}", message.red());
        } else {
            eprintln!("{}", message);
        }
        std::process::exit(e.exit_code());
    }
}
