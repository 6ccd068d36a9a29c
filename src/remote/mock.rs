//! Mock remote for testing
//!
//! Records every call in order without touching the network.
//! Failures are injected by call index (0-based, commands and uploads
//! counted together).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};

use super::Remote;

/// One recorded interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Command(String),
    Upload { local: PathBuf, remote: String },
}

/// Remote that records calls and returns scripted results
#[derive(Debug, Default)]
pub struct MockRemote {
    calls: Vec<Call>,
    /// Exit status per call index (default 0)
    exit_codes: HashMap<usize, i32>,
    /// Call indices whose upload fails
    failing_uploads: HashSet<usize>,
    /// Call indices whose command cannot be run at all
    failing_transport: HashSet<usize>,
    /// Fail uploads whose local file is missing
    check_local_files: bool,
    workdir: Option<String>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make call `index` exit with `code`
    pub fn with_exit_code(mut self, index: usize, code: i32) -> Self {
        self.exit_codes.insert(index, code);
        self
    }

    /// Make the upload at call `index` fail
    pub fn with_failing_upload(mut self, index: usize) -> Self {
        self.failing_uploads.insert(index);
        self
    }

    /// Make the command at call `index` fail before producing a status
    pub fn with_failing_transport(mut self, index: usize) -> Self {
        self.failing_transport.insert(index);
        self
    }

    /// Check that uploaded local files exist, like a real transfer would
    pub fn checking_local_files(mut self) -> Self {
        self.check_local_files = true;
        self
    }

    pub fn with_workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// All calls made so far
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Only the command lines, in order
    pub fn commands(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Command(cmd) => Some(cmd.as_str()),
                Call::Upload { .. } => None,
            })
            .collect()
    }

    /// Only the uploads as (local, remote) pairs, in order
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Upload { local, remote } => Some((local.clone(), remote.clone())),
                Call::Command(_) => None,
            })
            .collect()
    }
}

impl Remote for MockRemote {
    fn run_command(&mut self, command: &str) -> Result<i32> {
        let index = self.calls.len();
        self.calls.push(Call::Command(command.to_string()));
        if self.failing_transport.contains(&index) {
            bail!("connection reset by peer");
        }
        Ok(self.exit_codes.get(&index).copied().unwrap_or(0))
    }

    fn upload_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        let index = self.calls.len();
        self.calls.push(Call::Upload {
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        if self.failing_uploads.contains(&index) {
            bail!("permission denied");
        }
        if self.check_local_files && !local.is_file() {
            return Err(anyhow!("No such file: {}", local.display()));
        }
        Ok(())
    }

    fn workdir(&self) -> Option<&str> {
        self.workdir.as_deref()
    }
}
