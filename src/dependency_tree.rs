use serde::Serialize;
use std::collections::{ HashMap, HashSet };
use tracing::{ debug, warn };

use crate::error::AnalyzerError;
use crate::package::{ normalize_name, PackageInfo };
use crate::registry::MetadataSource;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyNode {
    pub name: String,
    /// `None` when the registry lookup for this node failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    fn leaf(name: &str, version: Option<String>) -> Self {
        DependencyNode {
            name: name.to_string(),
            version,
            children: Vec::new(),
        }
    }

    /// Number of levels below this node (a lone root has depth 0).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DependencyNode::node_count).sum::<usize>()
    }
}

/// Walk the declared (non-optional) requirements of `root`, stopping at
/// `max_depth` levels. Nodes on the last level are fetched but never
/// expanded, so the walk issues no request beyond that level.
pub fn build_tree(
    source: &dyn MetadataSource,
    root: &PackageInfo,
    max_depth: usize
) -> Result<DependencyNode, AnalyzerError> {
    let mut walker = TreeWalker {
        source,
        max_depth,
        fetched: HashMap::new(),
    };
    let mut path = vec![(normalize_name(&root.name), root.name.clone())];
    walker.expand(root, 0, &mut path)
}

struct TreeWalker<'a> {
    source: &'a dyn MetadataSource,
    max_depth: usize,
    // Each distinct package is requested at most once per walk
    fetched: HashMap<String, Option<PackageInfo>>,
}

impl<'a> TreeWalker<'a> {
    fn expand(
        &mut self,
        info: &PackageInfo,
        level: usize,
        path: &mut Vec<(String, String)>
    ) -> Result<DependencyNode, AnalyzerError> {
        let mut node = DependencyNode::leaf(&info.name, Some(info.version.clone()));
        if level >= self.max_depth {
            if !info.dependencies.is_empty() {
                debug!(package = %info.name, level, "depth limit reached, not expanding");
            }
            return Ok(node);
        }

        let mut seen = HashSet::new();
        for dep in info.dependencies.iter().filter(|d| !d.is_optional()) {
            let key = normalize_name(&dep.name);
            if !seen.insert(key.clone()) {
                continue;
            }

            if path.iter().any(|(k, _)| *k == key) {
                let mut cycle: Vec<String> = path
                    .iter()
                    .map(|(_, name)| name.clone())
                    .collect();
                cycle.push(dep.name.clone());
                return Err(AnalyzerError::CyclicDependency(cycle));
            }

            match self.lookup(&key, &dep.name) {
                Some(child_info) => {
                    path.push((key, child_info.name.clone()));
                    let child = self.expand(&child_info, level + 1, path);
                    path.pop();
                    node.children.push(child?);
                }
                None => node.children.push(DependencyNode::leaf(&dep.name, None)),
            }
        }

        Ok(node)
    }

    fn lookup(&mut self, key: &str, name: &str) -> Option<PackageInfo> {
        if let Some(cached) = self.fetched.get(key) {
            debug!(package = name, "reusing metadata fetched earlier in the walk");
            return cached.clone();
        }

        let result = match self.source.fetch(name, None) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(package = name, "could not resolve dependency: {}", e);
                None
            }
        };
        self.fetched.insert(key.to_string(), result.clone());
        result
    }
}
