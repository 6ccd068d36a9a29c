//! Dry-run remote: prints instead of executing

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::{Remote, RemoteTarget};

pub struct DryRunRemote {
    target: RemoteTarget,
}

impl DryRunRemote {
    pub fn new(target: RemoteTarget) -> Self {
        Self { target }
    }
}

impl Remote for DryRunRemote {
    fn run_command(&mut self, command: &str) -> Result<i32> {
        println!("  {} [{}] {}", "$".dimmed(), self.target.host, command);
        Ok(0)
    }

    fn upload_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        println!(
            "  {} {} -> {}:{}",
            "put".dimmed(),
            local.display(),
            self.target.host,
            remote
        );
        Ok(())
    }

    fn workdir(&self) -> Option<&str> {
        self.target.workdir.as_deref()
    }
}
