//! mespack-core: dependency resolution and package assembly
//!
//! Resolves the dependency graph of a root package against an ordered list
//! of repositories and assembles it into one output tree.
//!
//! ## Layer 2 - Domain
//!
//! Focus: search order, graph resolution, copy-or-record assembly.
//!
//! ## Key Components
//!
//! - `ExecutionContext`: working directory, repository configuration and credentials for one run
//! - `RepositoryLocator`: local, HTTP and SMB share repositories behind one `DirectoryHandle`
//! - `DependencyResolver`: binds every declared dependency to the first repository holding it
//! - `Assembler`: copies CI-hosted packages and records where released ones live

pub mod assembler;
pub mod config;
pub mod context;
mod error;
pub mod locator;
pub mod manifest;
pub mod model;
pub mod resolver;
pub mod telemetry;

pub use assembler::{AssembleOptions, Assembler, AssemblyReport, DEPENDENCIES_FILE, TESTS_FOLDER};
pub use config::{RepositoriesConfig, REPOSITORIES_FILE};
pub use context::ExecutionContext;
pub use error::{ConfigError, MespackError, ResolutionError, Result};
pub use locator::{
    effective_order, ArtifactLocation, DirectoryHandle, FoundFile, RepositoryLocator,
    RepositoryUri,
};
pub use manifest::{load_descriptor, ManifestReader, ZipManifestReader, DESCRIPTOR_FILE};
pub use model::{
    Dependency, DependencyGraph, DependencyRef, Package, PackageId, PackageKey, PackageManifest,
    PackageSource, PackageType,
};
pub use resolver::{locate, DependencyResolver};
pub use telemetry::init_tracing;

/// Crate version, reported by `mespack --version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
