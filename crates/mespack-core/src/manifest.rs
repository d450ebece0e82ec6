//! Package manifest loading

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use crate::error::{ConfigError, ResolutionError};
use crate::locator::{ArtifactLocation, FoundFile};
use crate::model::PackageManifest;

/// Descriptor file of the package being assembled.
pub const DESCRIPTOR_FILE: &str = "cmfpackage.json";

/// Manifest entry inside every package archive.
pub const ARCHIVE_MANIFEST: &str = "manifest.json";

/// Extracts the manifest of a package artifact.
pub trait ManifestReader: Send + Sync {
    fn read(&self, file: &FoundFile) -> Result<PackageManifest, ResolutionError>;
}

/// Reads `manifest.json` from a zip archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipManifestReader;

impl ZipManifestReader {
    fn read_archive<R: Read + Seek>(
        reader: R,
        location: &ArtifactLocation,
    ) -> Result<PackageManifest, ResolutionError> {
        let invalid = |reason: String| ResolutionError::InvalidManifest {
            location: location.to_string(),
            reason,
        };
        let mut archive = zip::ZipArchive::new(reader).map_err(|e| invalid(e.to_string()))?;
        let entry = archive
            .by_name(ARCHIVE_MANIFEST)
            .map_err(|e| invalid(format!("{ARCHIVE_MANIFEST}: {e}")))?;
        serde_json::from_reader(entry).map_err(|e| invalid(e.to_string()))
    }
}

impl ManifestReader for ZipManifestReader {
    fn read(&self, file: &FoundFile) -> Result<PackageManifest, ResolutionError> {
        match (&file.buffer, &file.location) {
            (Some(data), location) => Self::read_archive(Cursor::new(data.as_slice()), location),
            (None, location @ ArtifactLocation::Local(path)) => {
                let archive = File::open(path).map_err(|e| ResolutionError::InvalidManifest {
                    location: location.to_string(),
                    reason: e.to_string(),
                })?;
                Self::read_archive(archive, location)
            }
            (None, location) => Err(ResolutionError::InvalidManifest {
                location: location.to_string(),
                reason: "artifact content is not available".to_string(),
            }),
        }
    }
}

/// Load the root descriptor from `working_dir`.
pub fn load_descriptor(working_dir: &Path) -> Result<PackageManifest, ConfigError> {
    let path = working_dir.join(DESCRIPTOR_FILE);
    let text = std::fs::read_to_string(&path)?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::model::{DependencyRef, PackageType};

    fn archive_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_reads_manifest_from_buffered_archive() {
        let manifest = PackageManifest::new("B", "1.0", PackageType::Business)
            .with_dependency(DependencyRef::new("C", "2.0"));
        let json = serde_json::to_string(&manifest).unwrap();
        let data = archive_with(&[("manifest.json", &json), ("payload.bin", "x")]);

        let file = FoundFile::buffered(
            ArtifactLocation::Local("/virtual/B.1.0.zip".into()),
            data,
        );
        assert_eq!(ZipManifestReader.read(&file).unwrap(), manifest);
    }

    #[test]
    fn test_archive_without_manifest_is_invalid() {
        let data = archive_with(&[("other.json", "{}")]);
        let file = FoundFile::buffered(ArtifactLocation::Local("/virtual/x.zip".into()), data);
        let err = ZipManifestReader.read(&file).unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidManifest { .. }));
    }

    #[test]
    fn test_load_descriptor_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DESCRIPTOR_FILE), "{ not json").unwrap();
        let err = load_descriptor(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
