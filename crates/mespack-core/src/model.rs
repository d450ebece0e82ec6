//! Package data model
//!
//! [`PackageManifest`] is the declared shape of a package (its descriptor or
//! the `manifest.json` inside its archive). [`DependencyGraph`] is the
//! resolved form: an arena of [`Package`]s where every edge pointing at the
//! same `id@version` shares one node.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::locator::FoundFile;

/// `id@version` identity of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    pub id: String,
    pub version: String,
}

impl PackageKey {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Archive name in every repository: `<id>.<version>.zip`.
    pub fn file_name(&self) -> String {
        format!("{}.{}.zip", self.id, self.version)
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageType {
    Root,
    Business,
    Presentation,
    Data,
    Database,
    #[serde(rename = "IoT")]
    Iot,
    Html,
    Help,
    Tests,
    #[serde(other)]
    Generic,
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PackageType::Root => "Root",
            PackageType::Business => "Business",
            PackageType::Presentation => "Presentation",
            PackageType::Data => "Data",
            PackageType::Database => "Database",
            PackageType::Iot => "IoT",
            PackageType::Html => "Html",
            PackageType::Help => "Help",
            PackageType::Tests => "Tests",
            PackageType::Generic => "Generic",
        };
        f.write_str(name)
    }
}

fn mandatory_default() -> bool {
    true
}

/// A declared reference to another package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRef {
    pub id: String,
    pub version: String,
    #[serde(default = "mandatory_default")]
    pub mandatory: bool,
}

impl DependencyRef {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            mandatory: true,
        }
    }

    /// A dependency that may stay unresolved.
    pub fn ignorable(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            mandatory: false,
            ..Self::new(id, version)
        }
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.id, &self.version)
    }

    pub fn is_ignorable(&self) -> bool {
        !self.mandatory
    }
}

/// Declared package metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub package_id: String,
    pub version: String,
    pub package_type: PackageType,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
    #[serde(default)]
    pub test_packages: Vec<DependencyRef>,
}

impl PackageManifest {
    pub fn new(
        package_id: impl Into<String>,
        version: impl Into<String>,
        package_type: PackageType,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            version: version.into(),
            package_type,
            dependencies: Vec::new(),
            test_packages: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, dependency: DependencyRef) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_test_package(mut self, test_package: DependencyRef) -> Self {
        self.test_packages.push(test_package);
        self
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.package_id, &self.version)
    }
}

/// Index of a package in a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub(crate) usize);

/// Where a package's archive was found.
#[derive(Debug, Clone)]
pub struct PackageSource {
    /// Position in the effective repository order
    pub repository: usize,
    pub file: FoundFile,
}

/// A resolved dependency edge.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub key: PackageKey,
    pub ignorable: bool,
    pub missing: bool,
    pub package: Option<PackageId>,
}

/// A package node. Only its source and edges are filled in by resolution.
#[derive(Debug, Clone)]
pub struct Package {
    pub manifest: PackageManifest,
    pub source: Option<PackageSource>,
    pub dependencies: Vec<Dependency>,
}

impl Package {
    pub fn key(&self) -> PackageKey {
        self.manifest.key()
    }
}

/// Resolved dependency graph. Node 0 is the root.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub(crate) packages: Vec<Package>,
}

impl DependencyGraph {
    pub(crate) fn with_root(root: Package) -> Self {
        Self {
            packages: vec![root],
        }
    }

    pub fn root(&self) -> PackageId {
        PackageId(0)
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id.0]
    }

    pub(crate) fn package_mut(&mut self, id: PackageId) -> &mut Package {
        &mut self.packages[id.0]
    }

    pub(crate) fn push(&mut self, package: Package) -> PackageId {
        self.packages.push(package);
        PackageId(self.packages.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn packages(&self) -> impl Iterator<Item = (PackageId, &Package)> {
        self.packages
            .iter()
            .enumerate()
            .map(|(i, p)| (PackageId(i), p))
    }

    /// Every unresolved, non-ignorable dependency in the graph, once each,
    /// in discovery order.
    pub fn missing_mandatory(&self) -> Vec<PackageKey> {
        let mut missing: Vec<PackageKey> = Vec::new();
        for (_, package) in self.packages() {
            for dep in &package.dependencies {
                if dep.missing && !dep.ignorable && !missing.contains(&dep.key) {
                    missing.push(dep.key.clone());
                }
            }
        }
        missing
    }

    pub fn find(&self, key: &PackageKey) -> Option<PackageId> {
        self.packages
            .iter()
            .position(|p| &p.key() == key)
            .map(PackageId)
    }

    /// DFS from the root over resolved edges. Returns the key chain, closed
    /// by the repeated package, of the first cycle found.
    pub fn find_cycle(&self) -> Option<Vec<PackageKey>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if self.dfs_cycle(self.root(), &mut visited, &mut path) {
            Some(path.iter().map(|id| self.package(*id).key()).collect())
        } else {
            None
        }
    }

    fn dfs_cycle(
        &self,
        node: PackageId,
        visited: &mut HashSet<PackageId>,
        path: &mut Vec<PackageId>,
    ) -> bool {
        if path.contains(&node) {
            path.push(node);
            return true;
        }
        if !visited.insert(node) {
            return false;
        }
        path.push(node);

        for dep in &self.package(node).dependencies {
            if let Some(next) = dep.package {
                if self.dfs_cycle(next, visited, path) {
                    return true;
                }
            }
        }

        path.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_and_file_name() {
        let key = PackageKey::new("Cmf.Custom.Business", "1.2.0");
        assert_eq!(key.to_string(), "Cmf.Custom.Business@1.2.0");
        assert_eq!(key.file_name(), "Cmf.Custom.Business.1.2.0.zip");
    }

    #[test]
    fn test_manifest_defaults_dependencies_to_mandatory() {
        let json = r#"{
            "packageId": "Root",
            "version": "1.0.0",
            "packageType": "Root",
            "dependencies": [
                { "id": "B", "version": "1.0.0" },
                { "id": "C", "version": "1.0.0", "mandatory": false }
            ]
        }"#;
        let manifest: PackageManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.package_type, PackageType::Root);
        assert!(!manifest.dependencies[0].is_ignorable());
        assert!(manifest.dependencies[1].is_ignorable());
        assert!(manifest.test_packages.is_empty());
    }

    fn node(id: &str, deps: &[PackageId]) -> Package {
        Package {
            manifest: PackageManifest::new(id, "1.0", PackageType::Business),
            source: None,
            dependencies: deps
                .iter()
                .map(|d| Dependency {
                    key: PackageKey::new("?", "1.0"),
                    ignorable: false,
                    missing: false,
                    package: Some(*d),
                })
                .collect(),
        }
    }

    #[test]
    fn test_find_cycle_reports_closed_chain() {
        // A -> B -> C -> B
        let mut graph = DependencyGraph::with_root(node("A", &[PackageId(1)]));
        graph.push(node("B", &[PackageId(2)]));
        graph.push(node("C", &[PackageId(1)]));

        let chain: Vec<String> = graph
            .find_cycle()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(chain, ["A@1.0", "B@1.0", "C@1.0", "B@1.0"]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // A -> B, A -> C, B -> D, C -> D
        let mut graph = DependencyGraph::with_root(node("A", &[PackageId(1), PackageId(2)]));
        graph.push(node("B", &[PackageId(3)]));
        graph.push(node("C", &[PackageId(3)]));
        graph.push(node("D", &[]));
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_unknown_package_type_is_generic() {
        let json = r#"{ "packageId": "X", "version": "1", "packageType": "Reporting" }"#;
        let manifest: PackageManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.package_type, PackageType::Generic);
    }
}
