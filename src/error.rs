//! Error taxonomy for the grading pipeline.
//!
//! Only [`ValidationError`] ever reaches a client as an error. Workspace and
//! sandbox failures are folded into a failure envelope by the grading
//! service, and a sandbox that exits non-zero is not an error at all.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A grading request was rejected before any filesystem or sandbox work.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The entry filename must be a single plain path component.
    #[error("invalid entry filename: {0:?}")]
    InvalidFilename(String),
}

/// Filesystem failures while preparing a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace under {root}")]
    Create {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to prepare workspace layout at {path}")]
    Layout {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write submission to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("workspace task did not complete")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures of the sandbox invocation itself, as opposed to a failing submission.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to launch sandbox runtime `{runtime}`")]
    Launch {
        runtime: String,
        #[source]
        source: io::Error,
    },

    #[error("sandbox process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("failed to read sandbox {stream}")]
    Read {
        stream: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for sandbox process")]
    Wait(#[source] io::Error),
}

/// Infrastructure failure somewhere between workspace creation and sandbox exit.
#[derive(Debug, Error)]
pub enum GradeError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl GradeError {
    /// Message safe to hand back to the submitter: no host paths, no OS detail.
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "internal error: could not prepare the submission workspace",
            Self::Sandbox(SandboxError::Launch { .. }) => {
                "internal error: the sandbox could not be started"
            }
            Self::Sandbox(_) => "internal error: the sandbox run could not be observed",
        }
    }
}

/// Read-only catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no entry for target {0:?}")]
    NotFound(String),

    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_messages_do_not_leak_paths() {
        let err = GradeError::from(WorkspaceError::Create {
            root: PathBuf::from("/var/secret/tmp"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        });
        assert!(!err.public_message().contains("/var/secret"));
        assert!(err.to_string().contains("/var/secret"));

        let err = GradeError::from(SandboxError::Launch {
            runtime: "/opt/bin/docker".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        });
        assert_eq!(
            err.public_message(),
            "internal error: the sandbox could not be started"
        );
    }

    #[test]
    fn validation_messages_name_the_field() {
        assert_eq!(
            ValidationError::MissingField("sourceCode").to_string(),
            "missing required field: sourceCode"
        );
    }
}
