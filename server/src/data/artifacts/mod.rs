//! Report artifact storage
//!
//! Layout under the reports root:
//! - `<owner>/csv/<job_id>.csv`
//! - `<owner>/xls/<job_id>.xlsx`

mod csv;
mod error;
mod xlsx;

pub use error::ArtifactError;
pub use xlsx::SHEET_NAME;

use std::path::{Path, PathBuf};

use crate::domain::reports::ResultTable;
use crate::utils::file::sanitize_path_component;

const CSV_SUBDIR: &str = "csv";
const XLSX_SUBDIR: &str = "xls";

/// Downloadable artifact formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Csv,
    Xlsx,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Csv => "csv",
            ArtifactKind::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Csv => "text/csv; charset=utf-8",
            ArtifactKind::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    fn subdir(&self) -> &'static str {
        match self {
            ArtifactKind::Csv => CSV_SUBDIR,
            ArtifactKind::Xlsx => XLSX_SUBDIR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub csv: PathBuf,
    pub xlsx: PathBuf,
}

impl ArtifactPaths {
    pub fn get(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Csv => &self.csv,
            ArtifactKind::Xlsx => &self.xlsx,
        }
    }
}

/// Writes a typed result table to every artifact format. Blocking; the
/// pipeline calls it from `spawn_blocking`.
pub trait ArtifactSink: Send + Sync {
    fn write_table(
        &self,
        job_id: &str,
        owner: &str,
        table: &ResultTable,
    ) -> Result<ArtifactPaths, ArtifactError>;
}

/// Filesystem sink rooted at the reports directory
#[derive(Debug, Clone)]
pub struct FileArtifactSink {
    root: PathBuf,
}

impl FileArtifactSink {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, owner: &str, job_id: &str, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(sanitize_path_component(owner))
            .join(kind.subdir())
            .join(format!(
                "{}.{}",
                sanitize_path_component(job_id),
                kind.extension()
            ))
    }

    pub fn paths_for(&self, owner: &str, job_id: &str) -> ArtifactPaths {
        ArtifactPaths {
            csv: self.path_for(owner, job_id, ArtifactKind::Csv),
            xlsx: self.path_for(owner, job_id, ArtifactKind::Xlsx),
        }
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl ArtifactSink for FileArtifactSink {
    fn write_table(
        &self,
        job_id: &str,
        owner: &str,
        table: &ResultTable,
    ) -> Result<ArtifactPaths, ArtifactError> {
        let paths = self.paths_for(owner, job_id);

        ensure_parent(&paths.csv)?;
        csv::write_file(&paths.csv, table)?;

        ensure_parent(&paths.xlsx)?;
        xlsx::write_file(&paths.xlsx, table)?;

        tracing::trace!(
            job_id,
            csv = %paths.csv.display(),
            xlsx = %paths.xlsx.display(),
            rows = table.rows.len(),
            "Artifacts written"
        );
        Ok(paths)
    }
}
