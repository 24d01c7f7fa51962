//! Read-only view of the problem catalog.
//!
//! The catalog files are owned by an external store. The grader only needs
//! the location of the case directory (to mount it) and read access for the
//! lookup endpoints. Writes by the store during an in-flight run are not
//! isolated from that run.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::CatalogError;

/// Source of case sets and question text for grading targets.
#[async_trait]
pub trait CaseCatalog: Send + Sync {
    /// Host directory mounted read-only into every sandbox.
    fn cases_dir(&self) -> &Path;

    /// Case set for a target, as JSON text.
    async fn case_set(&self, target_id: &str) -> Result<String, CatalogError>;

    /// Question statement for a target, as markdown.
    async fn question_text(&self, target_id: &str) -> Result<String, CatalogError>;
}

/// Catalog backed by flat files: `<cases_dir>/<id>.json`, `<questions_dir>/<id>.md`.
#[derive(Debug, Clone)]
pub struct FlatFileCatalog {
    cases_dir: PathBuf,
    questions_dir: PathBuf,
}

impl FlatFileCatalog {
    pub fn new(cases_dir: impl Into<PathBuf>, questions_dir: impl Into<PathBuf>) -> Self {
        Self {
            cases_dir: cases_dir.into(),
            questions_dir: questions_dir.into(),
        }
    }

    /// Read `<dir>/<id>.<ext>`, falling back to the lower-cased id.
    async fn read_entry(dir: &Path, target_id: &str, ext: &str) -> Result<String, CatalogError> {
        if !is_catalog_id(target_id) {
            return Err(CatalogError::NotFound(target_id.to_string()));
        }

        let lower = target_id.to_ascii_lowercase();
        let mut candidates = vec![dir.join(format!("{target_id}.{ext}"))];
        if lower != target_id {
            candidates.push(dir.join(format!("{lower}.{ext}")));
        }

        for path in candidates {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return Ok(text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(CatalogError::Read { path, source }),
            }
        }
        Err(CatalogError::NotFound(target_id.to_string()))
    }
}

#[async_trait]
impl CaseCatalog for FlatFileCatalog {
    fn cases_dir(&self) -> &Path {
        &self.cases_dir
    }

    async fn case_set(&self, target_id: &str) -> Result<String, CatalogError> {
        Self::read_entry(&self.cases_dir, target_id, "json").await
    }

    async fn question_text(&self, target_id: &str) -> Result<String, CatalogError> {
        Self::read_entry(&self.questions_dir, target_id, "md").await
    }
}

fn is_catalog_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
