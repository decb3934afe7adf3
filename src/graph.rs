use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::{ Path, PathBuf };
use std::process::{ Command, Stdio };
use std::str::FromStr;
use tracing::debug;

use crate::dependency_tree::DependencyNode;
use crate::error::AnalyzerError;

const RESOLVED_FILL: &str = "lightblue";
const UNRESOLVED_FILL: &str = "lightgray";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Png,
    Svg,
    Pdf,
}

impl GraphFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            GraphFormat::Png => "png",
            GraphFormat::Svg => "svg",
            GraphFormat::Pdf => "pdf",
        }
    }
}

impl FromStr for GraphFormat {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(GraphFormat::Png),
            "svg" => Ok(GraphFormat::Svg),
            "pdf" => Ok(GraphFormat::Pdf),
            other =>
                Err(
                    AnalyzerError::Config(
                        format!("unsupported graph format '{}' (expected png, svg or pdf)", other)
                    )
                ),
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Turns a DOT description into an image file.
pub trait LayoutEngine {
    fn render(&self, dot: &str, format: GraphFormat, output: &Path) -> Result<(), AnalyzerError>;
}

/// Graphviz, driven through its `dot` executable.
pub struct GraphvizEngine {
    program: PathBuf,
}

impl GraphvizEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        GraphvizEngine { program: program.into() }
    }
}

impl LayoutEngine for GraphvizEngine {
    fn render(&self, dot: &str, format: GraphFormat, output: &Path) -> Result<(), AnalyzerError> {
        debug!("running {} -T{} -o {}", self.program.display(), format, output.display());

        let mut child = Command::new(&self.program)
            .arg(format!("-T{}", format.extension()))
            .arg("-o")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AnalyzerError::Render(
                    format!(
                        "could not run '{}' ({}); is Graphviz installed?",
                        self.program.display(),
                        e
                    )
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(dot.as_bytes())
                .map_err(|e| AnalyzerError::Render(format!("failed to send graph to dot: {}", e)))?;
        }

        let result = child
            .wait_with_output()
            .map_err(|e| AnalyzerError::Render(format!("dot did not finish: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(
                AnalyzerError::Render(format!("dot exited with {}: {}", result.status, stderr.trim()))
            );
        }

        Ok(())
    }
}

/// Describe the tree as a left-to-right Graphviz digraph. Packages that
/// appear under several parents become a single node.
pub fn to_dot(root: &DependencyNode) -> String {
    let mut dot = format!("digraph \"{}\" {{\n", escape(&root.name));
    dot.push_str(&format!("  label=\"Dependency Graph for {}\";\n", escape(&root.name)));
    dot.push_str("  rankdir=LR;\n");
    dot.push_str(
        &format!("  node [shape=box, style=\"rounded,filled\", fillcolor={}];\n", RESOLVED_FILL)
    );

    let mut nodes = HashSet::new();
    let mut edges = HashSet::new();
    let mut body = String::new();
    write_node(root, &mut nodes, &mut edges, &mut body);

    dot.push_str(&body);
    dot.push_str("}\n");
    dot
}

fn write_node(
    node: &DependencyNode,
    nodes: &mut HashSet<String>,
    edges: &mut HashSet<(String, String)>,
    out: &mut String
) {
    if nodes.insert(node.name.clone()) {
        match &node.version {
            Some(version) => {
                out.push_str(
                    &format!(
                        "  \"{}\" [label=\"{}\\n{}\"];\n",
                        escape(&node.name),
                        escape(&node.name),
                        escape(version)
                    )
                );
            }
            None => {
                out.push_str(
                    &format!(
                        "  \"{}\" [label=\"{}\", fillcolor={}];\n",
                        escape(&node.name),
                        escape(&node.name),
                        UNRESOLVED_FILL
                    )
                );
            }
        }
    }

    for child in &node.children {
        if edges.insert((node.name.clone(), child.name.clone())) {
            out.push_str(
                &format!("  \"{}\" -> \"{}\";\n", escape(&node.name), escape(&child.name))
            );
        }
        write_node(child, nodes, edges, out);
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Lay out the tree and write `<package>_dependencies.<ext>` into `output_dir`.
pub fn render_graph(
    engine: &dyn LayoutEngine,
    root: &DependencyNode,
    format: GraphFormat,
    output_dir: &Path
) -> Result<PathBuf, AnalyzerError> {
    let output = output_dir.join(format!("{}_dependencies.{}", root.name, format.extension()));
    engine.render(&to_dot(root), format, &output)?;
    Ok(output)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records what it was asked to render instead of running Graphviz.
    #[derive(Default)]
    pub(crate) struct RecordingEngine {
        pub rendered: RefCell<Vec<(String, GraphFormat, PathBuf)>>,
    }

    impl LayoutEngine for RecordingEngine {
        fn render(&self, dot: &str, format: GraphFormat, output: &Path) -> Result<(), AnalyzerError> {
            self.rendered.borrow_mut().push((dot.to_string(), format, output.to_path_buf()));
            Ok(())
        }
    }

    fn node(name: &str, version: Option<&str>, children: Vec<DependencyNode>) -> DependencyNode {
        DependencyNode {
            name: name.to_string(),
            version: version.map(|v| v.to_string()),
            children,
        }
    }

    #[test]
    fn test_graph_format_parsing() {
        assert_eq!("png".parse::<GraphFormat>().unwrap(), GraphFormat::Png);
        assert_eq!("SVG".parse::<GraphFormat>().unwrap(), GraphFormat::Svg);
        assert_eq!("pdf".parse::<GraphFormat>().unwrap(), GraphFormat::Pdf);
        assert!(matches!("gif".parse::<GraphFormat>(), Err(AnalyzerError::Config(_))));
    }

    #[test]
    fn test_to_dot_deduplicates_nodes_and_edges() {
        let core = node("core", Some("2.0"), vec![]);
        let tree = node(
            "app",
            Some("1.0"),
            vec![
                node("web", Some("1.1"), vec![core.clone()]),
                node("db", Some("0.3"), vec![core.clone()]),
                node("gone", None, vec![])
            ]
        );

        let dot = to_dot(&tree);
        assert!(dot.starts_with("digraph \"app\" {"));
        assert!(dot.contains("rankdir=LR;"));
        assert!(dot.contains("\"app\" [label=\"app\\n1.0\"];"));
        assert!(dot.contains("\"gone\" [label=\"gone\", fillcolor=lightgray];"));
        assert_eq!(dot.matches("\"core\" [label=").count(), 1);
        assert_eq!(dot.matches("\"web\" -> \"core\";").count(), 1);
        assert_eq!(dot.matches("\"db\" -> \"core\";").count(), 1);
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape("a\"b"), "a\\\"b");
    }

    #[test]
    fn test_render_graph_names_output_after_package() {
        let engine = RecordingEngine::default();
        let tree = node("requests", Some("2.31.0"), vec![]);

        let path = render_graph(&engine, &tree, GraphFormat::Svg, Path::new("out")).unwrap();
        assert_eq!(path, Path::new("out").join("requests_dependencies.svg"));

        let rendered = engine.rendered.borrow();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].1, GraphFormat::Svg);
        assert!(rendered[0].0.contains("requests"));
    }

    #[test]
    fn test_missing_engine_is_a_render_error() {
        let engine = GraphvizEngine::new("definitely-not-a-real-dot-binary");
        let dir = tempfile::tempdir().unwrap();
        let result = engine.render("digraph {}", GraphFormat::Png, &dir.path().join("x.png"));
        assert!(matches!(result, Err(AnalyzerError::Render(_))));
    }
}
