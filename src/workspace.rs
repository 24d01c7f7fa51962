//! Ephemeral per-submission workspaces.
//!
//! Layout of a workspace:
//!
//! ```text
//! <root>/<prefix><random>/
//!     student/                 <- mounted read-only into the sandbox
//!         <package_dir>/
//!             <entry_filename> <- the submission, verbatim
//! ```

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::WorkspaceError;

/// Directory under the workspace root that is mounted into the sandbox.
pub const SUBMISSION_DIR: &str = "student";

/// Creates uniquely named workspaces under a common root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    prefix: String,
    package_dir: String,
}

impl WorkspaceManager {
    pub fn new(
        root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        package_dir: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            package_dir: package_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh workspace on the blocking pool.
    pub async fn create(&self) -> Result<Workspace, WorkspaceError> {
        let manager = self.clone();
        tokio::task::spawn_blocking(move || manager.create_blocking()).await?
    }

    /// Create a fresh workspace on the calling thread.
    ///
    /// Names come from `tempfile`, which creates the directory exclusively and
    /// retries on collision, so concurrent calls never alias.
    pub fn create_blocking(&self) -> Result<Workspace, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempdir_in(&self.root)
            .map_err(|source| WorkspaceError::Create {
                root: self.root.clone(),
                source,
            })?;

        let package_path = dir.path().join(SUBMISSION_DIR).join(&self.package_dir);
        std::fs::create_dir_all(&package_path).map_err(|source| WorkspaceError::Layout {
            path: package_path.clone(),
            source,
        })?;

        debug!(path = %dir.path().display(), "Created workspace");

        Ok(Workspace {
            dir: Some(dir),
            package_path,
        })
    }
}

/// An exclusively owned workspace directory.
///
/// Removed by [`Workspace::destroy`] or, failing that, on drop. Removal
/// failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    package_path: PathBuf,
}

impl Workspace {
    /// Root of the workspace.
    pub fn path(&self) -> &Path {
        self.dir
            .as_ref()
            .map_or_else(|| Path::new(""), TempDir::path)
    }

    /// Unique directory name; doubles as the sandbox container name.
    pub fn name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Subtree mounted into the sandbox.
    pub fn submission_root(&self) -> PathBuf {
        self.path().join(SUBMISSION_DIR)
    }

    /// Write the submission source under the package directory, verbatim.
    pub async fn write_submission(
        &self,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let path = self.package_path.join(filename);
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|source| WorkspaceError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), bytes = content.len(), "Wrote submission");
        Ok(path)
    }

    /// Remove the workspace now, on the blocking pool.
    ///
    /// Removal continues in the background if this future is dropped.
    pub async fn destroy(mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(result) => log_removal(&path, result),
            Err(e) => warn!(path = %path.display(), error = %e, "Workspace removal task failed"),
        }
    }

    fn release(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        log_removal(&path, dir.close());
    }
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!(path = %path.display(), "Removed workspace"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove workspace"),
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}
