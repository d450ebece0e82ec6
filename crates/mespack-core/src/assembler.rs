//! Package assembly
//!
//! Copies the root package and its transitive dependency closure into one
//! output tree. Dependencies resolved from the CI repository are copied;
//! dependencies already released elsewhere are recorded in
//! `Dependencies.json` with their physical location instead.
//!
//! All validation (root type, repository setup, unresolved mandatory
//! dependencies, cycles) happens before anything is written to the output
//! directory.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use mespack_transport::SmbClient;

use crate::context::ExecutionContext;
use crate::error::{ConfigError, MespackError, ResolutionError, Result};
use crate::locator::{effective_order, DirectoryHandle, FoundFile, RepositoryLocator, RepositoryUri};
use crate::manifest::{ManifestReader, ZipManifestReader};
use crate::model::{DependencyGraph, PackageId, PackageKey, PackageManifest, PackageType};
use crate::resolver::{locate, DependencyResolver};

/// Location map written next to the assembled packages.
pub const DEPENDENCIES_FILE: &str = "Dependencies.json";

/// Subfolder receiving test packages.
pub const TESTS_FOLDER: &str = "Tests";

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    pub root: PackageManifest,
    /// Searched before the configured repositories
    pub repositories: Vec<RepositoryUri>,
    /// Overrides the configured CI repository
    pub ci_repository: Option<RepositoryUri>,
    pub output_dir: PathBuf,
    pub include_test_packages: bool,
}

/// Outcome of a successful assembly.
#[derive(Debug, Clone, Default)]
pub struct AssemblyReport {
    /// Packages copied into the output directory, in traversal order
    pub copied: Vec<PackageKey>,
    /// `id@version` to location of released dependencies
    pub locations: BTreeMap<String, String>,
    pub test_packages: Vec<PackageKey>,
    pub dependencies_file: PathBuf,
}

pub struct Assembler<'a> {
    context: &'a ExecutionContext,
    locator: RepositoryLocator<'a>,
    reader: Box<dyn ManifestReader>,
}

impl<'a> Assembler<'a> {
    pub fn new(context: &'a ExecutionContext) -> Self {
        Self {
            context,
            locator: RepositoryLocator::new(context.credentials(), context.native_unc()),
            reader: Box::new(ZipManifestReader),
        }
    }

    /// Use `factory` for the SMB client of every share session.
    pub fn with_client_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SmbClient> + Send + Sync + 'static,
    {
        self.locator = self.locator.with_client_factory(factory);
        self
    }

    pub fn with_manifest_reader(mut self, reader: impl ManifestReader + 'static) -> Self {
        self.reader = Box::new(reader);
        self
    }

    /// Assemble `options.root` into `options.output_dir`. Share sessions
    /// opened during the run are disconnected before returning.
    pub async fn assemble(&mut self, options: AssembleOptions) -> Result<AssemblyReport> {
        let result = self.run(options).await;
        self.locator.disconnect_all().await;
        result
    }

    async fn run(&mut self, options: AssembleOptions) -> Result<AssemblyReport> {
        let root_key = options.root.key();
        if options.root.package_type != PackageType::Root {
            return Err(ResolutionError::NotARootPackage {
                package: root_key.to_string(),
                package_type: options.root.package_type,
            }
            .into());
        }

        let order = self.search_order(&options)?;
        let mut directories = Vec::with_capacity(order.len());
        for uri in &order {
            directories.push(self.locator.get_directory(uri).await?);
        }
        let ci_index = directories.len() - 1;
        debug!(repositories = ?order.iter().map(|r| r.to_string()).collect::<Vec<_>>(), "search order");

        let graph = DependencyResolver::new(&directories, self.reader.as_ref())
            .resolve(options.root)
            .await?;

        let missing = graph.missing_mandatory();
        if !missing.is_empty() {
            return Err(ResolutionError::UnresolvedDependencies(
                missing.iter().map(ToString::to_string).collect(),
            )
            .into());
        }
        if let Some(cycle) = graph.find_cycle() {
            return Err(ResolutionError::CyclicDependency {
                chain: cycle.iter().map(ToString::to_string).collect(),
            }
            .into());
        }
        let Some(root_source) = graph.package(graph.root()).source.as_ref() else {
            return Err(ResolutionError::PackageNotFound(root_key.to_string()).into());
        };

        std::fs::create_dir_all(&options.output_dir).map_err(MespackError::assembly_failed)?;
        let tests_dir = options.output_dir.join(TESTS_FOLDER);
        if options.include_test_packages {
            std::fs::create_dir_all(&tests_dir).map_err(MespackError::assembly_failed)?;
        }

        let mut output = Output::new(&options.output_dir, ci_index, self.context.native_unc());
        output.copy(&graph, graph.root(), &root_source.file)?;
        output.traverse(&graph)?;

        let mut report = AssemblyReport {
            copied: output.copied.iter().map(|id| graph.package(*id).key()).collect(),
            ..AssemblyReport::default()
        };

        if options.include_test_packages {
            for id in &output.copied {
                let manifest = &graph.package(*id).manifest;
                report
                    .test_packages
                    .extend(assemble_tests(&directories, manifest, &tests_dir).await?);
            }
        }

        report.dependencies_file = options.output_dir.join(DEPENDENCIES_FILE);
        write_locations(&report.dependencies_file, &output.locations)?;
        report.locations = output.locations;

        info!(
            event = "assemble.completed",
            package = %root_key,
            copied = report.copied.len(),
            recorded = report.locations.len(),
            "assembly complete"
        );
        Ok(report)
    }

    /// Explicit repositories, then configured ones, CI repository last.
    fn search_order(&self, options: &AssembleOptions) -> Result<Vec<RepositoryUri>> {
        let working_dir = self.context.working_dir();
        let configured = self.context.repositories().repository_uris(working_dir)?;
        let ci_repository = match &options.ci_repository {
            Some(uri) => uri.clone(),
            None => self
                .context
                .repositories()
                .ci_repository_uri(working_dir)?
                .ok_or_else(|| ConfigError::MissingRepository("cirepo".to_string()))?,
        };
        Ok(effective_order(&options.repositories, &configured, &ci_repository))
    }
}

/// Output tree state of one run.
struct Output<'p> {
    dir: &'p Path,
    ci_index: usize,
    native_unc: bool,
    copied: Vec<PackageId>,
    locations: BTreeMap<String, String>,
}

impl<'p> Output<'p> {
    fn new(dir: &'p Path, ci_index: usize, native_unc: bool) -> Self {
        Self {
            dir,
            ci_index,
            native_unc,
            copied: Vec::new(),
            locations: BTreeMap::new(),
        }
    }

    fn copy(&mut self, graph: &DependencyGraph, id: PackageId, file: &FoundFile) -> Result<()> {
        let key = graph.package(id).key();
        let destination = copy_artifact(file, &key, self.dir)?;
        info!(event = "assemble.package_copied", package = %key, destination = %destination.display());
        self.copied.push(id);
        Ok(())
    }

    /// Depth-first pre-order walk from the root over an acyclic graph.
    /// Every package is handled once.
    fn traverse(&mut self, graph: &DependencyGraph) -> Result<()> {
        let root = graph.root();
        let mut done: HashSet<PackageId> = HashSet::from([root]);
        let mut stack: Vec<(PackageId, usize)> = vec![(root, 0)];

        while let Some(&(current, next)) = stack.last() {
            let Some(edge) = graph.package(current).dependencies.get(next) else {
                stack.pop();
                continue;
            };
            if let Some(frame) = stack.last_mut() {
                frame.1 = next + 1;
            }

            if edge.missing && edge.ignorable {
                debug!(package = %edge.key, "skipping unresolved ignorable dependency");
                continue;
            }
            let Some(dependency) = edge.package else {
                return Err(ResolutionError::MissingDependencySource(edge.key.to_string()).into());
            };
            if !done.insert(dependency) {
                continue;
            }

            let Some(source) = graph.package(dependency).source.as_ref() else {
                return Err(ResolutionError::MissingDependencySource(edge.key.to_string()).into());
            };
            if source.repository == self.ci_index {
                self.copy(graph, dependency, &source.file)?;
            } else {
                let location = source.file.location.describe(self.native_unc);
                debug!(event = "assemble.location_recorded", package = %edge.key, location = %location);
                self.locations.insert(edge.key.to_string(), location);
            }

            stack.push((dependency, 0));
        }
        Ok(())
    }
}

fn copy_artifact(file: &FoundFile, key: &PackageKey, dir: &Path) -> Result<PathBuf> {
    let name = file.location.file_name().unwrap_or_else(|| key.file_name());
    let destination = dir.join(name);
    file.copy_to(&destination)
        .map_err(MespackError::assembly_failed)?;
    Ok(destination)
}

/// Copy the declared test packages of `manifest` into `tests_dir`.
async fn assemble_tests(
    directories: &[DirectoryHandle],
    manifest: &PackageManifest,
    tests_dir: &Path,
) -> Result<Vec<PackageKey>> {
    if manifest.test_packages.is_empty() {
        info!(package = %manifest.key(), "package has no test packages");
        return Ok(Vec::new());
    }

    let mut copied = Vec::with_capacity(manifest.test_packages.len());
    for test_package in &manifest.test_packages {
        let key = test_package.key();
        let source = locate(directories, &key)
            .await
            .map_err(MespackError::assembly_failed)?
            .ok_or_else(|| ResolutionError::TestPackageNotFound(key.to_string()))?;
        let destination = copy_artifact(&source.file, &key, tests_dir)?;
        info!(event = "assemble.test_package_copied", package = %key, destination = %destination.display());
        copied.push(key);
    }
    Ok(copied)
}

fn write_locations(path: &Path, locations: &BTreeMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(locations).map_err(MespackError::assembly_failed)?;
    std::fs::write(path, json).map_err(MespackError::assembly_failed)
}
