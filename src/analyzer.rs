use colored::Colorize;
use std::fs;
use std::io::Write;
use tracing::info;

use crate::advisory::{ security_report, AdvisorySource };
use crate::cli::Args;
use crate::dependency_tree::build_tree;
use crate::error::AnalyzerError;
use crate::graph::{ render_graph, GraphFormat, LayoutEngine };
use crate::issues::{ issue_report, IssueSource };
use crate::output::{ render, save_report, OutputFormat, Report };
use crate::package::validate_name;
use crate::registry::{ MetadataSource, RegistryClient };

/// The external collaborators one analysis talks to.
pub struct Services {
    pub registry: RegistryClient,
    pub advisories: Box<dyn AdvisorySource>,
    pub issues: Box<dyn IssueSource>,
    pub engine: Box<dyn LayoutEngine>,
}

/// Color switches for the two output streams, decided separately since
/// either one may be redirected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Colors {
    pub report: bool,
    pub progress: bool,
}

/// Validated form of the command line.
struct Plan {
    format: OutputFormat,
    graph_format: Option<GraphFormat>,
}

// Everything that can be rejected without touching the network is checked
// here, before the first request.
fn plan(args: &Args) -> Result<Plan, AnalyzerError> {
    let format: OutputFormat = args.format.parse()?;
    validate_name(&args.package)?;
    if let Some(version) = &args.version {
        if version.trim().is_empty() {
            return Err(AnalyzerError::Config("version must not be empty".to_string()));
        }
    }

    let graph_format = if args.graph { Some(args.graph_format.parse::<GraphFormat>()?) } else { None };

    Ok(Plan { format, graph_format })
}

fn progress_line(message: &str, color: bool) -> String {
    if color { message.green().to_string() } else { message.to_string() }
}

fn progress(message: &str, color: bool) {
    eprintln!("{}", progress_line(message, color));
}

/// Run one analysis and write the report to `out`. Progress goes to stderr.
pub fn run(
    args: &Args,
    services: &Services,
    out: &mut dyn Write,
    colors: Colors
) -> Result<Report, AnalyzerError> {
    let plan = plan(args)?;

    progress(&format!("Fetching package information for {}...", args.package), colors.progress);
    let package = services.registry.fetch(&args.package, args.version.as_deref())?;
    info!(package = %package.name, version = %package.version, "metadata fetched");

    // The canonical name comes from the registry and is used in output file names
    if validate_name(&package.name).is_err() {
        return Err(AnalyzerError::InvalidResponse {
            url: args.registry_url.clone(),
            reason: format!("registry returned an invalid package name '{}'", package.name),
        });
    }

    let mut report = Report::new(package);

    if args.security {
        progress("Checking for security vulnerabilities...", colors.progress);
        report.security = Some(
            security_report(
                services.advisories.as_ref(),
                &report.package.name,
                &report.package.version
            )
        );
    }

    if args.issues {
        progress("Analyzing GitHub issues...", colors.progress);
        report.issues = Some(issue_report(services.issues.as_ref(), &report.package));
    }

    if let Some(graph_format) = plan.graph_format {
        progress(&format!("Generating dependency graph (depth {})...", args.depth), colors.progress);
        let tree = build_tree(services.registry.structured(), &report.package, args.depth)?;
        info!(nodes = tree.node_count(), depth = tree.depth(), "dependency tree built");

        fs::create_dir_all(&args.output_dir)?;
        let path = render_graph(services.engine.as_ref(), &tree, graph_format, &args.output_dir)?;
        progress(&format!("Dependency graph saved to {}", path.display()), colors.progress);
        report.dependency_tree = Some(tree);
    }

    let rendered = render(&report, plan.format, colors.report && plan.format == OutputFormat::Table)?;
    out.write_all(rendered.as_bytes())?;
    out.flush()?;

    if args.save {
        let path = save_report(&report, plan.format, &args.output_dir)?;
        progress(&format!("Analysis saved to {}", path.display()), colors.progress);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::tests::advisory;
    use crate::advisory::{ Advisory, Severity };
    use crate::graph::tests::RecordingEngine;
    use crate::issues::tests::{ issue, FakeTracker };
    use crate::issues::{ IssueReport, RepositoryActivity };
    use crate::package::{ Dependency, PackageInfo };
    use crate::registry::tests::FakeSource;
    use clap::Parser;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingAdvisories {
        calls: Rc<Cell<usize>>,
    }

    impl AdvisorySource for CountingAdvisories {
        fn query(&self, _name: &str, _version: &str) -> Result<Vec<Advisory>, AnalyzerError> {
            self.calls.set(self.calls.get() + 1);
            Ok(vec![advisory("PYSEC-2023-74", Severity::Medium)])
        }
    }

    fn package(name: &str, deps: &[&str]) -> PackageInfo {
        let mut info = PackageInfo::new(name, "1.0");
        info.dependencies = deps
            .iter()
            .filter_map(|d| Dependency::parse(d))
            .collect();
        info
    }

    fn fixture() -> (FakeSource, Rc<Cell<usize>>, Services) {
        let mut requests = package("requests", &["urllib3", "idna"]);
        requests.repository = Some("https://github.com/psf/requests".to_string());

        let source = FakeSource::default()
            .with(requests)
            .with(package("urllib3", &[]))
            .with(package("idna", &[]));
        let advisory_calls = Rc::new(Cell::new(0));
        let tracker = FakeTracker {
            activity: Some(RepositoryActivity {
                open_issues: 150,
                open_pull_requests: 40,
                recent_issues: vec![issue(6500, "Timeouts ignored with proxies", 2)],
                top_issues: Vec::new(),
            }),
            ..Default::default()
        };
        let services = Services {
            registry: RegistryClient::new(Box::new(source.clone()), None),
            advisories: Box::new(CountingAdvisories { calls: advisory_calls.clone() }),
            issues: Box::new(tracker),
            engine: Box::new(RecordingEngine::default()),
        };
        (source, advisory_calls, services)
    }

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["package_analyzer"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_unsupported_graph_format_fails_before_any_request() {
        let (source, advisory_calls, services) = fixture();
        let mut out = Vec::new();

        let result = run(
            &args(&["requests", "--graph", "--graph-format", "gif", "--security"]),
            &services,
            &mut out,
            Colors::default()
        );

        assert!(matches!(result, Err(AnalyzerError::Config(_))));
        assert_eq!(source.call_count(), 0);
        assert_eq!(advisory_calls.get(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_graph_format_is_ignored_without_graph() {
        let (_source, _calls, services) = fixture();
        let mut out = Vec::new();

        let report = run(
            &args(&["requests", "--graph-format", "gif"]),
            &services,
            &mut out,
            Colors::default()
        ).unwrap();
        assert!(report.dependency_tree.is_none());
    }

    #[test]
    fn test_invalid_output_format_and_name_are_config_errors() {
        let (source, _calls, services) = fixture();
        let mut out = Vec::new();

        let result = run(&args(&["requests", "--format", "yaml"]), &services, &mut out, Colors::default());
        assert!(matches!(result, Err(AnalyzerError::Config(_))));

        let result = run(&args(&["not a name"]), &services, &mut out, Colors::default());
        assert!(matches!(result, Err(AnalyzerError::Config(_))));
        assert_eq!(source.call_count(), 0);
    }

    #[test]
    fn test_security_is_only_queried_on_request() {
        let (_source, advisory_calls, services) = fixture();
        let mut out = Vec::new();

        let report = run(
            &args(&["requests", "--format", "json"]),
            &services,
            &mut out,
            Colors::default()
        ).unwrap();
        assert!(report.security.is_none());
        assert_eq!(advisory_calls.get(), 0);
        assert!(!String::from_utf8(out).unwrap().contains("advisories"));

        let mut out = Vec::new();
        let report = run(
            &args(&["requests", "--format", "json", "--security"]),
            &services,
            &mut out,
            Colors::default()
        ).unwrap();
        assert!(report.security.is_some());
        assert_eq!(advisory_calls.get(), 1);
        assert!(String::from_utf8(out).unwrap().contains("PYSEC-2023-74"));
    }

    #[test]
    fn test_issues_are_only_gathered_on_request() {
        let (_source, _calls, services) = fixture();
        let mut out = Vec::new();

        let report = run(&args(&["requests"]), &services, &mut out, Colors::default()).unwrap();
        assert!(report.issues.is_none());

        let mut out = Vec::new();
        let report = run(&args(&["requests", "--issues"]), &services, &mut out, Colors::default()).unwrap();
        match report.issues {
            Some(IssueReport::Available { repository, open_issues, .. }) => {
                assert_eq!(repository, "https://github.com/psf/requests");
                assert_eq!(open_issues, 150);
            }
            other => panic!("expected issue data, got {:?}", other),
        }
        assert!(String::from_utf8(out).unwrap().contains("Timeouts ignored with proxies"));
    }

    #[test]
    fn test_issues_without_repository_degrade() {
        let (_source, _calls, services) = fixture();
        let mut out = Vec::new();

        let report = run(&args(&["idna", "-i"]), &services, &mut out, Colors::default()).unwrap();
        assert!(matches!(report.issues, Some(IssueReport::Unavailable { .. })));
    }

    #[test]
    fn test_graph_builds_tree_and_renders_into_output_dir() {
        let (source, _calls, services) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().to_string_lossy().to_string();
        let mut out = Vec::new();

        let report = run(
            &args(&["requests", "-g", "-d", "1", "--graph-format", "svg", "-o", &out_dir]),
            &services,
            &mut out,
            Colors::default()
        ).unwrap();

        let tree = report.dependency_tree.unwrap();
        assert_eq!(tree.children.len(), 2);
        // root lookup plus one per direct dependency
        assert_eq!(source.call_count(), 3);
        assert!(String::from_utf8(out).unwrap().contains("├── urllib3 1.0"));
    }

    #[test]
    fn test_unknown_package_is_not_found() {
        let (_source, _calls, services) = fixture();
        let mut out = Vec::new();

        let result = run(&args(&["does-not-exist"]), &services, &mut out, Colors::default());
        assert!(matches!(result, Err(AnalyzerError::NotFound(_))));
    }

    #[test]
    fn test_save_writes_report_file() {
        let (_source, _calls, services) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().to_string_lossy().to_string();
        let mut out = Vec::new();

        run(
            &args(&["requests", "--save", "-o", &out_dir]),
            &services,
            &mut out,
            Colors::default()
        ).unwrap();
        let saved = fs::read_to_string(dir.path().join("requests_analysis.txt")).unwrap();
        assert!(saved.contains("Package Information"));
        assert!(!saved.contains('\u{1b}'));
    }

    #[test]
    fn test_registry_name_with_path_separators_is_rejected() {
        let mut source = FakeSource::default();
        source.packages.insert("evil".to_string(), PackageInfo::new("../evil", "1.0"));
        let services = Services {
            registry: RegistryClient::new(Box::new(source), None),
            advisories: Box::new(CountingAdvisories { calls: Rc::new(Cell::new(0)) }),
            issues: Box::new(FakeTracker::default()),
            engine: Box::new(RecordingEngine::default()),
        };
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("reports");
        let out_dir = nested.to_string_lossy().to_string();
        let mut out = Vec::new();

        let result = run(
            &args(&["evil", "--save", "--graph", "-o", &out_dir]),
            &services,
            &mut out,
            Colors::default()
        );

        assert!(matches!(result, Err(AnalyzerError::InvalidResponse { .. })));
        assert!(out.is_empty());
        assert!(!dir.path().join("evil_analysis.txt").exists());
        assert!(!nested.exists());
    }

    #[test]
    fn test_progress_lines_respect_color_choice() {
        let plain = progress_line("Fetching package information for requests...", false);
        assert_eq!(plain, "Fetching package information for requests...");

        colored::control::set_override(true);
        let painted = progress_line("done", true);
        colored::control::unset_override();
        assert!(painted.contains('\u{1b}'));
    }
}
