//! Artifact byte transfer
//!
//! Moving artifact bytes is delegated to an [`ArtifactTransfer`]. The run
//! exporter asks it to download a run's artifacts next to the run record;
//! the run importer asks it to upload them under the new run's artifact
//! URI.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Moves artifact trees between a tracking server's storage and a local
/// export directory.
pub trait ArtifactTransfer: Send + Sync {
    /// Copy everything under `artifact_uri` into `dest`.
    ///
    /// Returns the relative paths of the copied files, sorted.
    fn download(&self, artifact_uri: &str, dest: &Path) -> Result<Vec<String>>;

    /// Copy everything under `src` to `artifact_uri`.
    fn upload(&self, src: &Path, artifact_uri: &str) -> Result<()>;
}

/// Transfer that moves nothing; runs are migrated as metadata only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipArtifacts;

impl ArtifactTransfer for SkipArtifacts {
    fn download(&self, _artifact_uri: &str, _dest: &Path) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn upload(&self, _src: &Path, _artifact_uri: &str) -> Result<()> {
        Ok(())
    }
}

/// Transfer for artifact roots on a locally mounted filesystem
/// (`file://` URIs, plain paths, and `dbfs:/` through `/dbfs`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalArtifactTransfer;

impl LocalArtifactTransfer {
    fn resolve(uri: &str) -> Result<PathBuf> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        if uri.starts_with("dbfs:") {
            return Ok(crate::record::local_path(uri));
        }
        if uri.contains("://") {
            return Err(Error::Other(format!(
                "artifact URI '{uri}' is not on a local filesystem"
            )));
        }
        Ok(PathBuf::from(uri))
    }
}

fn copy_tree(src: &Path, dest: &Path, rel: &Path, copied: &mut Vec<String>) -> Result<()> {
    fs::create_dir_all(dest.join(rel))?;
    for entry in fs::read_dir(src.join(rel))? {
        let entry = entry?;
        let child = rel.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(src, dest, &child, copied)?;
        } else {
            fs::copy(entry.path(), dest.join(&child))?;
            copied.push(
                child
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            );
        }
    }
    Ok(())
}

impl ArtifactTransfer for LocalArtifactTransfer {
    fn download(&self, artifact_uri: &str, dest: &Path) -> Result<Vec<String>> {
        let src = Self::resolve(artifact_uri)?;
        if !src.is_dir() {
            return Ok(Vec::new());
        }
        let mut copied = Vec::new();
        copy_tree(&src, dest, Path::new(""), &mut copied)?;
        copied.sort();
        Ok(copied)
    }

    fn upload(&self, src: &Path, artifact_uri: &str) -> Result<()> {
        if !src.is_dir() {
            return Ok(());
        }
        let dest = Self::resolve(artifact_uri)?;
        let mut copied = Vec::new();
        copy_tree(src, &dest, Path::new(""), &mut copied)?;
        tracing::debug!(files = copied.len(), dest = %dest.display(), "uploaded artifacts");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_moves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SkipArtifacts.download("s3://bucket/x", dir.path()).unwrap().is_empty());
        SkipArtifacts.upload(dir.path(), "s3://bucket/y").unwrap();
    }

    #[test]
    fn test_local_download_and_upload() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("model")).unwrap();
        fs::write(src.path().join("model/MLmodel"), "flavors: {}").unwrap();
        fs::write(src.path().join("notes.txt"), "hi").unwrap();

        let staging = tempfile::tempdir().unwrap();
        let uri = format!("file://{}", src.path().display());
        let files = LocalArtifactTransfer.download(&uri, staging.path()).unwrap();
        assert_eq!(files, ["model/MLmodel", "notes.txt"]);

        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("run2/artifacts");
        LocalArtifactTransfer
            .upload(staging.path(), target.to_str().unwrap())
            .unwrap();
        assert_eq!(
            fs::read_to_string(target.join("model/MLmodel")).unwrap(),
            "flavors: {}"
        );
    }

    #[test]
    fn test_local_missing_source_is_empty() {
        let staging = tempfile::tempdir().unwrap();
        let files = LocalArtifactTransfer
            .download("/definitely/not/here", staging.path())
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_local_rejects_remote_scheme() {
        let staging = tempfile::tempdir().unwrap();
        assert!(LocalArtifactTransfer
            .download("s3://bucket/run/artifacts", staging.path())
            .is_err());
    }
}
