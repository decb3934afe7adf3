use colored::{ Color, Colorize };
use serde::Serialize;
use std::fs;
use std::path::{ Path, PathBuf };
use std::str::FromStr;

use crate::advisory::{ SecurityReport, Severity };
use crate::dependency_tree::DependencyNode;
use crate::error::AnalyzerError;
use crate::issues::IssueReport;
use crate::package::{ Dependency, PackageInfo };

const NOT_SPECIFIED: &str = "Not specified";
const SUMMARY_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    fn report_extension(&self) -> &'static str {
        match self {
            OutputFormat::Table => "txt",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other =>
                Err(
                    AnalyzerError::Config(
                        format!("unsupported output format '{}' (expected table or json)", other)
                    )
                ),
        }
    }
}

/// Everything gathered for one invocation. Optional sections are omitted
/// from the JSON form entirely when they were not requested.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(flatten)]
    pub package: PackageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<IssueReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_tree: Option<DependencyNode>,
}

impl Report {
    pub fn new(package: PackageInfo) -> Self {
        Report {
            package,
            security: None,
            issues: None,
            dependency_tree: None,
        }
    }
}

pub fn render(report: &Report, format: OutputFormat, color: bool) -> Result<String, AnalyzerError> {
    match format {
        OutputFormat::Table => Ok(render_table(report, color)),
        OutputFormat::Json => render_json(report),
    }
}

pub fn render_json(report: &Report) -> Result<String, AnalyzerError> {
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::from)?;
    Ok(json + "\n")
}

pub fn render_table(report: &Report, color: bool) -> String {
    let package = &report.package;
    let mut out = String::new();

    out.push_str(&format!("\nPackage: {}\n\n", paint(&package.name, Some(Color::Green), color)));

    let mut info = Table::new("Package Information", &["Field", "Value"]);
    let rows: [(&str, Option<String>); 15] = [
        ("Name", Some(package.name.clone())),
        ("Version", Some(package.version.clone())),
        ("Summary", package.summary.clone()),
        ("Author", package.author.clone()),
        ("License", package.license.clone()),
        ("License URL", package.license_url.clone()),
        ("Homepage", package.homepage.clone()),
        ("Documentation", package.documentation.clone()),
        ("Requires Python", package.requires_python.clone()),
        ("Python Versions", joined(&package.python_versions)),
        ("Development Status", package.development_status.clone()),
        ("Repository", package.repository.clone()),
        ("Maintainers", joined(&package.maintainers)),
        ("Recent Releases", joined(&package.recent_releases)),
        ("Install", package.install_command.clone()),
    ];
    for (field, value) in rows {
        info.row(
            vec![
                Cell::colored(field, Color::Cyan),
                Cell::colored(value.as_deref().unwrap_or(NOT_SPECIFIED), Color::Green)
            ]
        );
    }
    out.push_str(&info.render(color));

    if package.dependencies.is_empty() {
        out.push_str(&format!("\n{}\n", paint("No dependencies found", Some(Color::Yellow), color)));
    } else {
        let mut deps = Table::new("Dependencies", &["Package", "Constraint", "Marker"]);
        for dep in &package.dependencies {
            deps.row(
                vec![
                    Cell::colored(&dependency_label(dep), Color::Cyan),
                    Cell::plain(dep.constraint.as_deref().unwrap_or("*")),
                    Cell::plain(dep.marker.as_deref().unwrap_or(""))
                ]
            );
        }
        out.push('\n');
        out.push_str(&deps.render(color));
    }

    if let Some(security) = &report.security {
        out.push('\n');
        out.push_str(&render_security(security, color));
    }

    if let Some(issues) = &report.issues {
        out.push('\n');
        out.push_str(&render_issues(issues, color));
    }

    if let Some(tree) = &report.dependency_tree {
        out.push_str(&format!("\n{}\n", heading("Dependency Tree", color)));
        out.push_str(&render_tree(tree));
    }

    out
}

fn render_security(security: &SecurityReport, color: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", heading("Security Summary", color)));

    match security {
        SecurityReport::Unavailable { reason } => {
            out.push_str(
                &format!(
                    "{}\n",
                    paint(&format!("Security data unavailable: {}", reason), Some(Color::Yellow), color)
                )
            );
        }
        SecurityReport::Available { total, severity_counts, advisories } => {
            out.push_str(&format!("Total Vulnerabilities: {}\n\nSeverity Breakdown:\n", total));
            for severity in [Severity::Critical, Severity::High, Severity::Medium, Severity::Low] {
                out.push_str(
                    &format!(
                        "  {}: {}\n",
                        paint(&severity.to_string(), Some(severity_color(severity)), color),
                        severity_counts.get(severity)
                    )
                );
            }

            if advisories.is_empty() {
                out.push_str(
                    &format!("\n{}\n", paint("No vulnerabilities found", Some(Color::Green), color))
                );
                return out;
            }

            let mut table = Table::new(
                "Vulnerability Details",
                &["ID", "Severity", "Affected", "Summary", "Fixed Versions"]
            );
            for advisory in advisories {
                let fixed = if advisory.fixed_versions.is_empty() {
                    "No fix available".to_string()
                } else {
                    advisory.fixed_versions.join(", ")
                };
                table.row(
                    vec![
                        Cell::colored(&advisory.id, Color::Cyan),
                        Cell::colored(&advisory.severity.to_string(), severity_color(advisory.severity)),
                        Cell::plain(advisory.affected_range.as_deref().unwrap_or("")),
                        Cell::plain(&truncate(&advisory.summary, SUMMARY_WIDTH)),
                        Cell::colored(&fixed, Color::Green)
                    ]
                );
            }
            out.push('\n');
            out.push_str(&table.render(color));
        }
    }

    out
}

fn render_issues(issues: &IssueReport, color: bool) -> String {
    let mut out = format!("{}\n", heading("Repository Information", color));

    match issues {
        IssueReport::Unavailable { reason } => {
            out.push_str(
                &format!(
                    "{}\n",
                    paint(&format!("Issue data unavailable: {}", reason), Some(Color::Yellow), color)
                )
            );
        }
        IssueReport::Available {
            repository,
            open_issues,
            open_pull_requests,
            recent_issues,
            top_issues,
        } => {
            out.push_str(&format!("URL: {}\n", paint(repository, Some(Color::Cyan), color)));
            out.push_str(&format!("Open Issues: {}\n", open_issues));
            out.push_str(&format!("Open Pull Requests: {}\n", open_pull_requests));

            for (title, list) in [("Recent Issues", recent_issues), ("Most Discussed Issues", top_issues)] {
                if list.is_empty() {
                    continue;
                }
                let mut table = Table::new(title, &["#", "Title", "Comments"]);
                for issue in list {
                    table.row(
                        vec![
                            Cell::colored(&issue.number.to_string(), Color::Cyan),
                            Cell::colored(&truncate(&issue.title, SUMMARY_WIDTH), Color::Yellow),
                            Cell::plain(&issue.comments.to_string())
                        ]
                    );
                }
                out.push('\n');
                out.push_str(&table.render(color));
            }
        }
    }

    out
}

/// Text rendering of the dependency tree using box-drawing connectors.
pub fn render_tree(root: &DependencyNode) -> String {
    let mut out = format!("{}\n", node_label(root));
    render_children(root, "", &mut out);
    out
}

fn render_children(node: &DependencyNode, prefix: &str, out: &mut String) {
    for (i, child) in node.children.iter().enumerate() {
        let is_last = i == node.children.len() - 1;
        let connector = if is_last { "└── " } else { "├── " };
        out.push_str(&format!("{}{}{}\n", prefix, connector, node_label(child)));

        let next_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
        render_children(child, &next_prefix, out);
    }
}

fn node_label(node: &DependencyNode) -> String {
    match &node.version {
        Some(version) => format!("{} {}", node.name, version),
        None => format!("{} [unresolved]", node.name),
    }
}

/// Write the report next to any rendered graph as `<package>_analysis.<ext>`.
pub fn save_report(
    report: &Report,
    format: OutputFormat,
    output_dir: &Path
) -> Result<PathBuf, AnalyzerError> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(
        format!("{}_analysis.{}", report.package.name, format.report_extension())
    );
    fs::write(&path, render(report, format, false)?)?;
    Ok(path)
}

fn dependency_label(dep: &Dependency) -> String {
    if dep.extras.is_empty() {
        dep.name.clone()
    } else {
        format!("{}[{}]", dep.name, dep.extras.join(","))
    }
}

fn joined(values: &[String]) -> Option<String> {
    if values.is_empty() { None } else { Some(values.join(", ")) }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text
            .chars()
            .take(width - 3)
            .collect();
        format!("{}...", cut)
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::High => Color::Yellow,
        Severity::Medium => Color::Magenta,
        Severity::Low => Color::Blue,
    }
}

fn paint(text: &str, color: Option<Color>, enabled: bool) -> colored::ColoredString {
    match (enabled, color) {
        (true, Some(c)) => text.color(c),
        _ => text.normal(),
    }
}

fn heading(text: &str, enabled: bool) -> colored::ColoredString {
    if enabled { text.bold() } else { text.normal() }
}

struct Cell {
    text: String,
    color: Option<Color>,
}

impl Cell {
    fn plain(text: &str) -> Self {
        Cell { text: text.to_string(), color: None }
    }

    fn colored(text: &str, color: Color) -> Self {
        Cell { text: text.to_string(), color: Some(color) }
    }
}

/// Minimal bordered table; widths are measured on the uncolored text so
/// escape codes never break the alignment.
struct Table {
    title: String,
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    fn new(title: &str, headers: &[&str]) -> Self {
        Table {
            title: title.to_string(),
            headers: headers
                .iter()
                .map(|h| h.to_string())
                .collect(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: Vec<Cell>) {
        self.rows.push(cells);
    }

    fn render(&self, color: bool) -> String {
        let mut widths: Vec<usize> = self.headers
            .iter()
            .map(|h| h.chars().count())
            .collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.text.chars().count());
            }
        }

        let separator = format!(
            "+{}+\n",
            widths
                .iter()
                .map(|w| "-".repeat(w + 2))
                .collect::<Vec<_>>()
                .join("+")
        );

        let mut out = format!("{}\n", heading(&self.title, color));
        out.push_str(&separator);

        let header: Vec<String> = self.headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!(" {} ", heading(&pad(h, *w), color)))
            .collect();
        out.push_str(&format!("|{}|\n", header.join("|")));
        out.push_str(&separator);

        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!(" {} ", paint(&pad(&cell.text, *w), cell.color, color)))
                .collect();
            out.push_str(&format!("|{}|\n", cells.join("|")));
        }
        out.push_str(&separator);
        out
    }
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::tests::advisory;
    use crate::issues::tests::issue;
    use serde_json::Value;

    fn sample_package() -> PackageInfo {
        let mut info = PackageInfo::new("requests", "2.31.0");
        info.summary = Some("Python HTTP for Humans.".to_string());
        info.license = Some("Apache-2.0".to_string());
        info.license_url = Some("https://opensource.org/licenses/Apache-2.0".to_string());
        info.author = Some("Kenneth Reitz".to_string());
        info.homepage = Some("https://requests.readthedocs.io".to_string());
        info.documentation = Some("https://requests.readthedocs.io/en/latest".to_string());
        info.requires_python = Some(">=3.7".to_string());
        info.maintainers = vec!["nateprewitt".to_string(), "graffatcolmingov".to_string()];
        info.recent_releases = vec!["2.31.0".to_string(), "2.30.0".to_string()];
        info.install_command = Some("pip install requests".to_string());
        info.development_status = Some("5 - Production/Stable".to_string());
        info.python_versions = vec!["3.8".to_string(), "3.12".to_string()];
        info.repository = Some("https://github.com/psf/requests".to_string());
        info.dependencies = vec![
            Dependency::parse("urllib3<3,>=1.21.1").unwrap(),
            Dependency::parse("PySocks!=1.5.7,>=1.5.6; extra == \"socks\"").unwrap()
        ];
        info
    }

    fn collect_strings(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.push(s.clone()),
            Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
            Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
            _ => {}
        }
    }

    #[test]
    fn test_table_and_json_carry_the_same_values() {
        let report = Report::new(sample_package());
        let table = render_table(&report, false);
        let json: Value = serde_json::from_str(&render_json(&report).unwrap()).unwrap();

        let mut values = Vec::new();
        collect_strings(&json, &mut values);
        assert!(values.len() > 10);
        for value in values {
            assert!(table.contains(&value), "table is missing '{}'", value);
        }
    }

    #[test]
    fn test_json_omits_unrequested_sections() {
        let mut package = PackageInfo::new("requests", "2.31.0");
        package.dependencies = Vec::new();
        let json: Value = serde_json::from_str(&render_json(&Report::new(package)).unwrap()).unwrap();

        assert_eq!(json["name"], "requests");
        assert_eq!(json["version"], "2.31.0");
        assert_eq!(json["dependencies"], Value::Array(Vec::new()));
        assert!(json.get("security").is_none());
        assert!(json.get("advisories").is_none());
        assert!(json.get("issues").is_none());
        assert!(json.get("dependency_tree").is_none());
    }

    #[test]
    fn test_json_includes_security_when_present() {
        let mut report = Report::new(sample_package());
        report.security = Some(SecurityReport::from_advisories(vec![advisory("GHSA-x", Severity::High)]));

        let json: Value = serde_json::from_str(&render_json(&report).unwrap()).unwrap();
        assert_eq!(json["security"]["advisories"][0]["id"], "GHSA-x");
        assert_eq!(json["security"]["total"], 1);
    }

    #[test]
    fn test_table_security_sections() {
        let mut report = Report::new(PackageInfo::new("six", "1.16.0"));
        report.security = Some(SecurityReport::from_advisories(Vec::new()));
        let table = render_table(&report, false);
        assert!(table.contains("No dependencies found"));
        assert!(table.contains("Total Vulnerabilities: 0"));
        assert!(table.contains("No vulnerabilities found"));

        report.security = Some(SecurityReport::Unavailable { reason: "no data available".to_string() });
        assert!(render_table(&report, false).contains("Security data unavailable"));

        report.security = Some(SecurityReport::from_advisories(vec![advisory("PYSEC-1", Severity::Critical)]));
        let table = render_table(&report, false);
        assert!(table.contains("PYSEC-1"));
        assert!(table.contains("No fix available"));
        assert!(table.contains("CRITICAL: 1"));
    }

    #[test]
    fn test_issue_sections() {
        let mut report = Report::new(sample_package());
        report.issues = Some(IssueReport::Available {
            repository: "https://github.com/psf/requests".to_string(),
            open_issues: 150,
            open_pull_requests: 40,
            recent_issues: vec![issue(6500, "Timeouts ignored with proxies", 2)],
            top_issues: vec![issue(2011, "Support HTTP/2", 93)],
        });

        let table = render_table(&report, false);
        assert!(table.contains("Open Issues: 150"));
        assert!(table.contains("Open Pull Requests: 40"));
        assert!(table.contains("Most Discussed Issues"));
        assert!(table.contains("Support HTTP/2"));

        let json: Value = serde_json::from_str(&render_json(&report).unwrap()).unwrap();
        assert_eq!(json["issues"]["recent_issues"][0]["number"], 6500);

        report.issues = Some(IssueReport::Unavailable { reason: "no data available".to_string() });
        assert!(render_table(&report, false).contains("Issue data unavailable"));
    }

    #[test]
    fn test_uncolored_table_has_no_escape_codes() {
        let table = render_table(&Report::new(sample_package()), false);
        assert!(!table.contains('\u{1b}'));
    }

    #[test]
    fn test_render_tree() {
        let tree = DependencyNode {
            name: "app".to_string(),
            version: Some("1.0".to_string()),
            children: vec![
                DependencyNode {
                    name: "web".to_string(),
                    version: Some("2.0".to_string()),
                    children: vec![DependencyNode {
                        name: "core".to_string(),
                        version: Some("3.0".to_string()),
                        children: Vec::new(),
                    }],
                },
                DependencyNode {
                    name: "gone".to_string(),
                    version: None,
                    children: Vec::new(),
                }
            ],
        };

        assert_eq!(
            render_tree(&tree),
            "app 1.0\n├── web 2.0\n│   └── core 3.0\n└── gone [unresolved]\n"
        );
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!(matches!("yaml".parse::<OutputFormat>(), Err(AnalyzerError::Config(_))));
    }

    #[test]
    fn test_save_report_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report::new(sample_package());

        let path = save_report(&report, OutputFormat::Json, dir.path()).unwrap();
        assert_eq!(path, dir.path().join("requests_analysis.json"));
        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["version"], "2.31.0");

        let path = save_report(&report, OutputFormat::Table, dir.path()).unwrap();
        assert_eq!(path, dir.path().join("requests_analysis.txt"));
        assert!(fs::read_to_string(&path).unwrap().contains("Package Information"));
    }
}
