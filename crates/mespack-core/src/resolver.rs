//! Dependency resolution
//!
//! Binds every declared dependency of a root manifest, transitively, to the
//! first repository holding its archive. Each `id@version` is looked up and
//! its manifest read at most once; edges that resolve to the same key share
//! one [`Package`] node, so cyclic declarations terminate.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use mespack_transport::TransportError;

use crate::error::{ResolutionError, Result};
use crate::locator::DirectoryHandle;
use crate::manifest::ManifestReader;
use crate::model::{
    Dependency, DependencyGraph, Package, PackageId, PackageKey, PackageManifest, PackageSource,
};

/// Find `key` in `directories`; the first repository holding it wins.
pub async fn locate(
    directories: &[DirectoryHandle],
    key: &PackageKey,
) -> std::result::Result<Option<PackageSource>, TransportError> {
    let name = key.file_name();
    for (repository, directory) in directories.iter().enumerate() {
        if let Some(file) = directory.get_file(&name).await? {
            debug!(package = %key, repository = %directory.uri(), "package located");
            return Ok(Some(PackageSource { repository, file }));
        }
    }
    Ok(None)
}

pub struct DependencyResolver<'a> {
    directories: &'a [DirectoryHandle],
    reader: &'a dyn ManifestReader,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(directories: &'a [DirectoryHandle], reader: &'a dyn ManifestReader) -> Self {
        Self {
            directories,
            reader,
        }
    }

    /// Resolve the graph rooted at `root`. The root's own archive is bound
    /// when a repository holds it; unresolved dependency edges are flagged
    /// `missing` and not explored further.
    pub async fn resolve(&self, root: PackageManifest) -> Result<DependencyGraph> {
        let root_key = root.key();
        let source = locate(self.directories, &root_key).await?;
        let mut graph = DependencyGraph::with_root(Package {
            manifest: root,
            source,
            dependencies: Vec::new(),
        });

        let mut known: HashMap<PackageKey, Option<PackageId>> = HashMap::new();
        known.insert(root_key, Some(graph.root()));
        let mut queue = VecDeque::from([graph.root()]);

        while let Some(current) = queue.pop_front() {
            let declared = graph.package(current).manifest.dependencies.clone();
            let mut edges = Vec::with_capacity(declared.len());

            for reference in declared {
                let key = reference.key();
                let package = match known.get(&key) {
                    Some(bound) => *bound,
                    None => {
                        let bound = self.load(&key).await?.map(|package| graph.push(package));
                        if let Some(id) = bound {
                            queue.push_back(id);
                        } else {
                            debug!(package = %key, ignorable = reference.is_ignorable(), "dependency not found");
                        }
                        known.insert(key.clone(), bound);
                        bound
                    }
                };
                edges.push(Dependency {
                    key,
                    ignorable: reference.is_ignorable(),
                    missing: package.is_none(),
                    package,
                });
            }

            graph.package_mut(current).dependencies = edges;
        }

        Ok(graph)
    }

    async fn load(&self, key: &PackageKey) -> Result<Option<Package>> {
        let Some(source) = locate(self.directories, key).await? else {
            return Ok(None);
        };
        let manifest = self.reader.read(&source.file)?;
        if &manifest.key() != key {
            return Err(ResolutionError::InvalidManifest {
                location: source.file.location.to_string(),
                reason: format!("archive declares {}, expected {}", manifest.key(), key),
            }
            .into());
        }
        Ok(Some(Package {
            manifest,
            source: Some(source),
            dependencies: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use crate::locator::{FoundFile, RepositoryUri};
    use crate::model::{DependencyRef, PackageType};

    /// Serves manifests by file name, counting reads.
    struct MapReader {
        manifests: Vec<PackageManifest>,
        reads: Mutex<Vec<String>>,
    }

    impl MapReader {
        fn new(manifests: Vec<PackageManifest>) -> Self {
            Self {
                manifests,
                reads: Mutex::new(Vec::new()),
            }
        }
    }

    impl ManifestReader for MapReader {
        fn read(&self, file: &FoundFile) -> std::result::Result<PackageManifest, ResolutionError> {
            let name = file.location.file_name().unwrap_or_default();
            self.reads.lock().unwrap().push(name.clone());
            self.manifests
                .iter()
                .find(|m| m.key().file_name() == name)
                .cloned()
                .ok_or(ResolutionError::InvalidManifest {
                    location: name,
                    reason: "unknown".to_string(),
                })
        }
    }

    fn directory_with(files: &[&str]) -> (tempfile::TempDir, DirectoryHandle) {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), b"zip").unwrap();
        }
        let path: PathBuf = dir.path().to_path_buf();
        let handle = DirectoryHandle::Local {
            uri: RepositoryUri::Local(path.clone()),
            path,
        };
        (dir, handle)
    }

    fn manifest(id: &str, deps: &[DependencyRef]) -> PackageManifest {
        deps.iter().fold(
            PackageManifest::new(id, "1.0", PackageType::Business),
            |m, d| m.with_dependency(d.clone()),
        )
    }

    #[tokio::test]
    async fn test_first_repository_wins() {
        let (_a, first) = directory_with(&["B.1.0.zip"]);
        let (_b, second) = directory_with(&["B.1.0.zip"]);
        let directories = vec![first, second];
        let source = locate(&directories, &PackageKey::new("B", "1.0"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.repository, 0);
    }

    #[tokio::test]
    async fn test_shared_dependency_is_loaded_once() {
        let (_dir, repo) = directory_with(&["B.1.0.zip", "C.1.0.zip", "D.1.0.zip"]);
        let directories = vec![repo];
        let reader = MapReader::new(vec![
            manifest("B", &[DependencyRef::new("D", "1.0")]),
            manifest("C", &[DependencyRef::new("D", "1.0")]),
            manifest("D", &[]),
        ]);
        let root = PackageManifest::new("A", "1.0", PackageType::Root)
            .with_dependency(DependencyRef::new("B", "1.0"))
            .with_dependency(DependencyRef::new("C", "1.0"));

        let graph = DependencyResolver::new(&directories, &reader)
            .resolve(root)
            .await
            .unwrap();

        assert_eq!(graph.len(), 4);
        let reads = reader.reads.lock().unwrap().clone();
        assert_eq!(reads.iter().filter(|r| r.as_str() == "D.1.0.zip").count(), 1);

        let b = graph.find(&PackageKey::new("B", "1.0")).unwrap();
        let c = graph.find(&PackageKey::new("C", "1.0")).unwrap();
        assert_eq!(
            graph.package(b).dependencies[0].package,
            graph.package(c).dependencies[0].package
        );
        assert!(graph.package(graph.root()).source.is_none());
    }

    #[tokio::test]
    async fn test_missing_edges_are_flagged() {
        let (_dir, repo) = directory_with(&[]);
        let directories = vec![repo];
        let reader = MapReader::new(vec![]);
        let root = PackageManifest::new("A", "1.0", PackageType::Root)
            .with_dependency(DependencyRef::new("B", "1.0"))
            .with_dependency(DependencyRef::ignorable("C", "1.0"));

        let graph = DependencyResolver::new(&directories, &reader)
            .resolve(root)
            .await
            .unwrap();

        let edges = &graph.package(graph.root()).dependencies;
        assert!(edges.iter().all(|e| e.missing));
        assert_eq!(graph.missing_mandatory(), vec![PackageKey::new("B", "1.0")]);
    }

    #[tokio::test]
    async fn test_cyclic_declarations_terminate() {
        let (_dir, repo) = directory_with(&["B.1.0.zip", "C.1.0.zip"]);
        let directories = vec![repo];
        let reader = MapReader::new(vec![
            manifest("B", &[DependencyRef::new("C", "1.0")]),
            manifest("C", &[DependencyRef::new("B", "1.0")]),
        ]);
        let root = PackageManifest::new("A", "1.0", PackageType::Root)
            .with_dependency(DependencyRef::new("B", "1.0"));

        let graph = DependencyResolver::new(&directories, &reader)
            .resolve(root)
            .await
            .unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[tokio::test]
    async fn test_mismatched_archive_manifest_is_rejected() {
        let (_dir, repo) = directory_with(&["B.1.0.zip"]);
        let directories = vec![repo];
        let mut wrong = manifest("B", &[]);
        wrong.version = "2.0".to_string();
        // Served under B.1.0.zip despite declaring 2.0.
        struct Fixed(PackageManifest);
        impl ManifestReader for Fixed {
            fn read(&self, _: &FoundFile) -> std::result::Result<PackageManifest, ResolutionError> {
                Ok(self.0.clone())
            }
        }
        let reader = Fixed(wrong);
        let root = PackageManifest::new("A", "1.0", PackageType::Root)
            .with_dependency(DependencyRef::new("B", "1.0"));

        let err = DependencyResolver::new(&directories, &reader)
            .resolve(root)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::MespackError::Resolution(ResolutionError::InvalidManifest { .. })
        ));
    }
}
