//! Grader configuration.
//!
//! Loaded from an optional JSON file, then overridden by `GRADER_*`
//! environment variables. Every field has a default, so an empty object (or
//! no file at all) is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub workspace: WorkspaceSettings,
}

/// How the sandbox runtime is invoked.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSettings {
    /// Docker-compatible CLI (`docker`, `podman`, ...).
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Arguments placed before `run`/`kill`, e.g. `["--context", "grader"]`.
    #[serde(default)]
    pub runtime_args: Vec<String>,

    /// Grading image. Opaque to the grader.
    #[serde(default = "default_image")]
    pub image: String,

    /// Wall-clock limit per run in seconds; `0` disables it.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Per-stream capture cap in bytes.
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,

    /// Where the submission subtree appears inside the sandbox.
    #[serde(default = "default_submission_mount")]
    pub submission_mount: String,

    /// Where the shared case directory appears inside the sandbox.
    #[serde(default = "default_cases_mount")]
    pub cases_mount: String,

    /// Variable carrying the test selection regex.
    #[serde(default = "default_filter_env")]
    pub filter_env: String,

    /// Variable carrying `cases_mount`.
    #[serde(default = "default_cases_env")]
    pub cases_env: String,
}

/// Location of the read-only catalog maintained by the external store.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    #[serde(default = "default_cases_dir")]
    pub cases_dir: PathBuf,

    #[serde(default = "default_questions_dir")]
    pub questions_dir: PathBuf,
}

/// Workspace placement and layout.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceSettings {
    /// Parent of all workspaces; the system temp dir when unset.
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Package directory the grading image imports the submission from.
    #[serde(default = "default_package_dir")]
    pub package_dir: String,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            runtime_args: Vec::new(),
            image: default_image(),
            timeout_seconds: default_timeout(),
            max_output_bytes: default_max_output(),
            submission_mount: default_submission_mount(),
            cases_mount: default_cases_mount(),
            filter_env: default_filter_env(),
            cases_env: default_cases_env(),
        }
    }
}

impl SandboxSettings {
    /// `None` when the wall-clock limit is disabled.
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_seconds))
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            cases_dir: default_cases_dir(),
            questions_dir: default_questions_dir(),
        }
    }
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            root: None,
            prefix: default_prefix(),
            package_dir: default_package_dir(),
        }
    }
}

impl WorkspaceSettings {
    pub fn resolved_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    /// Load from `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        config.resolve_paths(&cwd);
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse configuration JSON")
    }

    /// Apply `GRADER_*` overrides. Unparseable numbers are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GRADER_RUNTIME") {
            self.sandbox.runtime = v;
        }
        if let Some(v) = lookup("GRADER_IMAGE") {
            self.sandbox.image = v;
        }
        if let Some(v) = lookup("GRADER_TIMEOUT_SECONDS") {
            match v.parse() {
                Ok(secs) => self.sandbox.timeout_seconds = secs,
                Err(e) => warn!(value = %v, error = %e, "Ignoring GRADER_TIMEOUT_SECONDS"),
            }
        }
        if let Some(v) = lookup("GRADER_MAX_OUTPUT_BYTES") {
            match v.parse() {
                Ok(bytes) => self.sandbox.max_output_bytes = bytes,
                Err(e) => warn!(value = %v, error = %e, "Ignoring GRADER_MAX_OUTPUT_BYTES"),
            }
        }
        if let Some(v) = lookup("GRADER_CASES_DIR") {
            self.catalog.cases_dir = v.into();
        }
        if let Some(v) = lookup("GRADER_QUESTIONS_DIR") {
            self.catalog.questions_dir = v.into();
        }
        if let Some(v) = lookup("GRADER_WORKSPACE_ROOT") {
            self.workspace.root = Some(v.into());
        }
    }

    /// Anchor relative host paths at `base`.
    ///
    /// Docker reads a relative `-v` source as a named volume, so every host
    /// path that can end up in a mount has to be absolute.
    pub fn resolve_paths(&mut self, base: &Path) {
        absolutize(base, &mut self.catalog.cases_dir);
        absolutize(base, &mut self.catalog.questions_dir);
        if let Some(root) = &mut self.workspace.root {
            absolutize(base, root);
        }
    }

    /// Reject configurations the sandbox contract cannot honour.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.catalog.cases_dir.is_absolute(),
            "catalog.cases_dir must be absolute ({})",
            self.catalog.cases_dir.display()
        );
        anyhow::ensure!(
            self.workspace.resolved_root().is_absolute(),
            "workspace.root must be absolute ({})",
            self.workspace.resolved_root().display()
        );
        let s = &self.sandbox;
        anyhow::ensure!(!s.runtime.is_empty(), "sandbox.runtime must not be empty");
        anyhow::ensure!(!s.image.is_empty(), "sandbox.image must not be empty");
        anyhow::ensure!(s.max_output_bytes > 0, "sandbox.max_output_bytes must be positive");
        anyhow::ensure!(
            s.submission_mount != s.cases_mount,
            "submission and cases mounts must differ (both {})",
            s.cases_mount
        );
        anyhow::ensure!(
            !self.workspace.package_dir.is_empty(),
            "workspace.package_dir must not be empty"
        );
        Ok(())
    }
}

fn absolutize(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn default_runtime() -> String {
    "docker".into()
}

fn default_image() -> String {
    "go-tester:latest".into()
}

const fn default_timeout() -> u64 {
    60
}

const fn default_max_output() -> usize {
    1024 * 1024
}

fn default_submission_mount() -> String {
    "/app/student".into()
}

fn default_cases_mount() -> String {
    "/app/cases".into()
}

fn default_filter_env() -> String {
    "RUN_REGEX".into()
}

fn default_cases_env() -> String {
    "CASES_DIR".into()
}

fn default_cases_dir() -> PathBuf {
    "cases".into()
}

fn default_questions_dir() -> PathBuf {
    "questions".into()
}

fn default_prefix() -> String {
    "go-tester-".into()
}

fn default_package_dir() -> String {
    "piscine".into()
}
