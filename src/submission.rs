//! Grading requests and validated submissions.

use std::path::{Component, Path};

use serde::Deserialize;

use crate::error::ValidationError;

/// Wire form of a grading request.
///
/// Every field is optional here so that a missing field becomes a
/// [`ValidationError`] instead of a deserialization failure. The short keys
/// (`problem`, `filename`, `code`) are what the existing web client sends.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    #[serde(default, alias = "problem")]
    pub target_id: Option<String>,

    #[serde(default, alias = "filename")]
    pub entry_filename: Option<String>,

    #[serde(default, alias = "code")]
    pub source_code: Option<String>,
}

/// An accepted submission. Only constructible through validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    target_id: String,
    entry_filename: String,
    source_code: String,
}

impl Submission {
    /// Validate and accept a submission.
    ///
    /// All three fields must be non-empty, and the entry filename must be a
    /// single normal path component so it cannot escape the workspace.
    pub fn new(
        target_id: impl Into<String>,
        entry_filename: impl Into<String>,
        source_code: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let target_id = target_id.into();
        let entry_filename = entry_filename.into();
        let source_code = source_code.into();

        if target_id.is_empty() {
            return Err(ValidationError::MissingField("targetId"));
        }
        if entry_filename.is_empty() {
            return Err(ValidationError::MissingField("entryFilename"));
        }
        if source_code.is_empty() {
            return Err(ValidationError::MissingField("sourceCode"));
        }
        if !is_plain_filename(&entry_filename) {
            return Err(ValidationError::InvalidFilename(entry_filename));
        }

        Ok(Self {
            target_id,
            entry_filename,
            source_code,
        })
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn entry_filename(&self) -> &str {
        &self.entry_filename
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }
}

impl TryFrom<GradeRequest> for Submission {
    type Error = ValidationError;

    fn try_from(req: GradeRequest) -> Result<Self, Self::Error> {
        Self::new(
            req.target_id.unwrap_or_default(),
            req.entry_filename.unwrap_or_default(),
            req.source_code.unwrap_or_default(),
        )
    }
}

fn is_plain_filename(name: &str) -> bool {
    if name.contains(&['/', '\\', '\0'][..]) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
