//! Translation of a submission into a fully specified sandbox invocation.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::SandboxSettings;
use crate::submission::Submission;
use crate::workspace::Workspace;

/// Hard caps applied to every sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpus: u32,
    pub memory_mib: u64,
    pub pids: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpus: 1,
            memory_mib: 256,
            pids: 128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// No network namespace shared with the host.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFs {
    /// Root filesystem read-only; only explicit mounts are visible.
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
}

/// A host directory bound into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub access: AccessMode,
}

impl Mount {
    /// `host:container:ro`
    fn volume_arg(&self) -> OsString {
        let mut arg = self.host.as_os_str().to_os_string();
        arg.push(":");
        arg.push(&self.container);
        match self.access {
            AccessMode::ReadOnly => arg.push(":ro"),
        }
        arg
    }
}

/// Everything needed to launch one sandbox run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub image: String,
    /// Container name, used to kill the sandbox on timeout or cancellation.
    pub container_name: String,
    pub limits: ResourceLimits,
    pub network: NetworkMode,
    pub root_fs: RootFs,
    /// Ordered: submission first, shared cases second.
    pub mounts: Vec<Mount>,
    pub env: BTreeMap<String, String>,
    pub selection_filter: String,
}

impl SandboxConfig {
    /// Arguments for `<runtime> run ...`.
    pub fn run_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "run".into(),
            "--rm".into(),
            "--name".into(),
            self.container_name.clone().into(),
        ];

        match self.network {
            NetworkMode::Disabled => args.extend(["--network", "none"].map(OsString::from)),
        }

        args.extend(
            [
                "--cpus".to_string(),
                self.limits.cpus.to_string(),
                "--memory".to_string(),
                format!("{}m", self.limits.memory_mib),
                "--pids-limit".to_string(),
                self.limits.pids.to_string(),
            ]
            .map(OsString::from),
        );

        match self.root_fs {
            RootFs::ReadOnly => args.push("--read-only".into()),
        }

        for mount in &self.mounts {
            args.push("-v".into());
            args.push(mount.volume_arg());
        }

        for (name, value) in &self.env {
            args.push("-e".into());
            args.push(format!("{name}={value}").into());
        }

        args.push(self.image.clone().into());
        args
    }

    /// Arguments for `<runtime> kill ...`.
    pub fn kill_args(&self) -> Vec<OsString> {
        vec!["kill".into(), self.container_name.clone().into()]
    }
}

/// Builds [`SandboxConfig`]s. Holds only static settings, so `build` is pure.
#[derive(Debug, Clone)]
pub struct SandboxInvocationBuilder {
    image: String,
    limits: ResourceLimits,
    submission_mount: String,
    cases_mount: String,
    filter_env: String,
    cases_env: String,
}

impl SandboxInvocationBuilder {
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            image: settings.image.clone(),
            limits: ResourceLimits::default(),
            submission_mount: settings.submission_mount.clone(),
            cases_mount: settings.cases_mount.clone(),
            filter_env: settings.filter_env.clone(),
            cases_env: settings.cases_env.clone(),
        }
    }

    pub fn build(
        &self,
        submission: &Submission,
        cases_dir: &Path,
        workspace: &Workspace,
    ) -> SandboxConfig {
        let selection_filter = selection_filter(submission.target_id());

        let mounts = vec![
            Mount {
                host: workspace.submission_root(),
                container: self.submission_mount.clone(),
                access: AccessMode::ReadOnly,
            },
            Mount {
                host: cases_dir.to_path_buf(),
                container: self.cases_mount.clone(),
                access: AccessMode::ReadOnly,
            },
        ];

        let env = BTreeMap::from([
            (self.filter_env.clone(), selection_filter.clone()),
            (self.cases_env.clone(), self.cases_mount.clone()),
        ]);

        SandboxConfig {
            image: self.image.clone(),
            container_name: container_name(&workspace.name()),
            limits: self.limits,
            network: NetworkMode::Disabled,
            root_fs: RootFs::ReadOnly,
            mounts,
            env,
            selection_filter,
        }
    }
}

/// `^Test<id>$` with every character outside `[A-Za-z0-9_]` removed from `id`.
///
/// An id that sanitizes to nothing yields `^Test$`.
pub fn selection_filter(target_id: &str) -> String {
    let sanitized: String = target_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    format!("^Test{sanitized}$")
}

fn container_name(workspace_name: &str) -> String {
    let suffix: String = workspace_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    format!("grader-{suffix}")
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;
    use crate::workspace::WorkspaceManager;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn filter_strips_everything_outside_whitelist() {
        assert_eq!(selection_filter("SaveAndMiss"), "^TestSaveAndMiss$");
        assert_eq!(selection_filter("Save And-Miss!"), "^TestSaveAndMiss$");
        assert_eq!(selection_filter("a_1$|.*"), "^Testa_1$");
        assert_eq!(selection_filter("Ünïcode"), "^Testncode$");
        assert_eq!(selection_filter("!!!"), "^Test$");
    }

    #[test]
    fn filter_shape_is_total() {
        let shape = Regex::new(r"^\^Test[A-Za-z0-9_]*\$$").unwrap();
        let inputs = [
            "",
            "x",
            "$(rm -rf /)",
            "a\nb",
            "^TestX$|.*",
            "日本語",
            "tab\tand space",
            "back\\slash",
        ];
        for input in inputs {
            let filter = selection_filter(input);
            assert!(shape.is_match(&filter), "{input:?} -> {filter:?}");
        }
    }

    #[test]
    fn build_produces_expected_invocation() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path(), "go-tester-", "piscine")
            .create_blocking()
            .unwrap();
        let submission = Submission::new("SaveAndMiss", "saveandmiss.go", "package piscine").unwrap();
        let builder = SandboxInvocationBuilder::from_settings(&SandboxSettings::default());

        let config = builder.build(&submission, Path::new("/srv/cases"), &ws);

        assert_eq!(config.selection_filter, "^TestSaveAndMiss$");
        assert_eq!(config.limits, ResourceLimits::default());
        assert!(config.container_name.starts_with("grader-go-tester-"));

        let student = ws.submission_root();
        assert_eq!(
            strings(&config.run_args()),
            vec![
                "run".to_string(),
                "--rm".into(),
                "--name".into(),
                config.container_name.clone(),
                "--network".into(),
                "none".into(),
                "--cpus".into(),
                "1".into(),
                "--memory".into(),
                "256m".into(),
                "--pids-limit".into(),
                "128".into(),
                "--read-only".into(),
                "-v".into(),
                format!("{}:/app/student:ro", student.display()),
                "-v".into(),
                "/srv/cases:/app/cases:ro".into(),
                "-e".into(),
                "CASES_DIR=/app/cases".into(),
                "-e".into(),
                "RUN_REGEX=^TestSaveAndMiss$".into(),
                "go-tester:latest".into(),
            ]
        );
        assert_eq!(
            strings(&config.kill_args()),
            vec!["kill".to_string(), config.container_name.clone()]
        );
    }

    #[test]
    fn build_is_deterministic() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path(), "go-tester-", "piscine")
            .create_blocking()
            .unwrap();
        let submission = Submission::new("X", "x.go", "package piscine").unwrap();
        let builder = SandboxInvocationBuilder::from_settings(&SandboxSettings::default());

        assert_eq!(
            builder.build(&submission, Path::new("/cases"), &ws),
            builder.build(&submission, Path::new("/cases"), &ws)
        );
    }

    #[test]
    fn container_names_drop_unsafe_characters() {
        assert_eq!(container_name("go tester/.x"), "grader-gotester.x");
    }
}
