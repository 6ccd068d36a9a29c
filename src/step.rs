//! Step definitions
//!
//! A task is an ordered list of these three step kinds.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{DeployError, Result};
use crate::shell;

/// A shell command to run on the remote target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Command line as the remote shell should see it
    pub text: String,
    /// Directory to `cd` into first
    pub workdir: Option<String>,
    /// Run through sudo as this user
    pub run_as: Option<String>,
}

impl RemoteCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            workdir: None,
            run_as: None,
        }
    }

    /// Build a command from separate words, quoting each one
    pub fn words<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(shell::join(words))
    }

    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    /// Render the final command line.
    ///
    /// `fallback_dir` applies when the command has no directory of its own.
    /// `sudo` wraps the command for `run_as`; it comes from the remote
    /// collaborator so each transport decides how privilege switching works.
    pub fn render<F>(&self, fallback_dir: Option<&str>, sudo: F) -> String
    where
        F: Fn(&str, &str) -> String,
    {
        let mut line = match &self.run_as {
            Some(user) => sudo(user, &self.text),
            None => self.text.clone(),
        };
        if let Some(dir) = self.workdir.as_deref().or(fallback_dir) {
            line = format!("cd {} && {}", shell::quote(dir), line);
        }
        line
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One unit of remote work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    RunCommand(RemoteCommand),
    UploadFile { local: PathBuf, remote: String },
    Confirm { prompt: String },
}

impl Step {
    pub fn run(text: impl Into<String>) -> Self {
        Step::RunCommand(RemoteCommand::new(text))
    }

    pub fn upload(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Step::UploadFile {
            local: local.into(),
            remote: remote.into(),
        }
    }

    pub fn confirm(prompt: impl Into<String>) -> Self {
        Step::Confirm {
            prompt: prompt.into(),
        }
    }

    /// Short kind name for logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            Step::RunCommand(_) => "run",
            Step::UploadFile { .. } => "upload",
            Step::Confirm { .. } => "confirm",
        }
    }
}

impl From<RemoteCommand> for Step {
    fn from(command: RemoteCommand) -> Self {
        Step::RunCommand(command)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::RunCommand(cmd) => match (&cmd.workdir, &cmd.run_as) {
                (Some(dir), Some(user)) => write!(f, "run [{dir} as {user}] {}", cmd.text),
                (Some(dir), None) => write!(f, "run [{dir}] {}", cmd.text),
                (None, Some(user)) => write!(f, "run [as {user}] {}", cmd.text),
                (None, None) => write!(f, "run {}", cmd.text),
            },
            Step::UploadFile { local, remote } => {
                write!(f, "upload {} -> {}", local.display(), remote)
            }
            Step::Confirm { prompt } => write!(f, "confirm \"{prompt}\""),
        }
    }
}

/// A single local -> remote file correspondence
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileMappingEntry {
    pub local: PathBuf,
    pub remote: String,
}

/// Ordered table of local -> remote files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMapping {
    entries: Vec<FileMappingEntry>,
}

impl FileMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, local: impl Into<PathBuf>, remote: impl Into<String>) {
        self.entries.push(FileMappingEntry {
            local: local.into(),
            remote: remote.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileMappingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One upload step per entry, in table order
    pub fn upload_steps(&self) -> Vec<Step> {
        self.entries
            .iter()
            .map(|e| Step::upload(e.local.clone(), e.remote.clone()))
            .collect()
    }

    /// Map every regular file directly inside `dir` to `remote_dir/<name>`.
    ///
    /// Files are sorted by name so the upload order is stable across runs.
    /// A missing directory yields an empty mapping.
    pub fn from_dir(dir: &Path, remote_dir: &str) -> Result<Self> {
        let mut mapping = Self::new();
        if !dir.exists() {
            warn!(dir = %dir.display(), "Mods directory not found, no mods will be uploaded");
            return Ok(mapping);
        }

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| DeployError::Config {
                reason: format!("Failed to list {}: {}", dir.display(), e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            mapping.push(entry.path(), remote_join(remote_dir, &name));
        }
        Ok(mapping)
    }
}

impl FromIterator<(PathBuf, String)> for FileMapping {
    fn from_iter<I: IntoIterator<Item = (PathBuf, String)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(local, remote)| FileMappingEntry { local, remote })
                .collect(),
        }
    }
}

/// Join a remote POSIX directory and a relative path
pub fn remote_join(dir: &str, rel: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let rel = rel.trim_start_matches("./");
    if dir.is_empty() {
        format!("/{rel}")
    } else {
        format!("{dir}/{rel}")
    }
}
