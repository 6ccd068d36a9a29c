//! # Remote Execution Layer
//!
//! The runner never talks to a transport directly; it drives a [`Remote`].
//!
//! - [`SshRemote`] - Production remote over SSH (ssh2), SCP uploads
//! - [`DryRunRemote`] - Prints what would happen, touches nothing
//! - [`MockRemote`] - Records calls in order, injects failures for tests
//!
//! ## Remote Trait
//!
//! ```rust,ignore
//! pub trait Remote {
//!     fn run_command(&mut self, command: &str) -> anyhow::Result<i32>;
//!     fn upload_file(&mut self, local: &Path, remote: &str) -> anyhow::Result<()>;
//!     fn as_sudo(&self, user: &str, command: &str) -> String;
//!     fn workdir(&self) -> Option<&str>;
//! }
//! ```
//!
//! `run_command` returns the remote exit status; `Err` means the command
//! could not be run at all. A non-zero status is not an `Err` here, the
//! runner decides what it means.

mod dry_run;
mod mock;
mod ssh;

pub use dry_run::DryRunRemote;
pub use mock::{Call, MockRemote};
pub use ssh::SshRemote;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{DeployError, Result};
use crate::shell;

/// Remote-execution collaborator
pub trait Remote {
    /// Run `command` in the remote shell and return its exit status
    fn run_command(&mut self, command: &str) -> anyhow::Result<i32>;

    /// Copy `local` to `remote`, overwriting any existing file
    fn upload_file(&mut self, local: &Path, remote: &str) -> anyhow::Result<()>;

    /// Wrap `command` so it runs as `user`
    fn as_sudo(&self, user: &str, command: &str) -> String {
        format!(
            "sudo -u {} -- sh -c {}",
            shell::quote(user),
            shell::quote(command)
        )
    }

    /// Directory commands run in when the step doesn't name one
    fn workdir(&self) -> Option<&str> {
        None
    }
}

/// How to authenticate against the target
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SshAuth {
    /// Keys offered by a running ssh-agent
    #[default]
    Agent,
    KeyFile {
        path: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
    Password {
        password: String,
    },
}

/// Connection parameters for one remote machine
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RemoteTarget {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub auth: SshAuth,
    /// Default working directory for commands
    #[serde(default)]
    pub workdir: Option<String>,
    /// Expected SHA256 host key fingerprint in hex (colons optional).
    /// When set, a different key aborts the connection.
    #[serde(default)]
    pub host_key_sha256: Option<String>,
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: default_user(),
            auth: SshAuth::default(),
            workdir: None,
            host_key_sha256: None,
        }
    }

    /// Parse `[user@]host[:port]`.
    ///
    /// IPv6 addresses take a port only in brackets (`[::1]:2222`); a bare
    /// address with several colons (`fe80::1`) is a host without a port.
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| DeployError::Config {
            reason: format!("Invalid host '{spec}': {reason}"),
        };

        let (user, rest) = match spec.rsplit_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user), rest),
            Some(_) => return Err(invalid("empty user")),
            None => (None, spec),
        };
        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid("bad port"));

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unclosed '['"))?;
            let port = match after {
                "" => default_port(),
                _ => match after.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => return Err(invalid("unexpected text after ']'")),
                },
            };
            if !host.contains(':') {
                return Err(invalid("brackets are only for IPv6 addresses"));
            }
            (host, port)
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host, parse_port(port)?),
                // bare IPv6 address
                Some(_) => (rest, default_port()),
                None => (rest, default_port()),
            }
        };
        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        let mut target = Self::new(host);
        target.port = port;
        if let Some(user) = user {
            target.user = user.to_string();
        }
        Ok(target)
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}@[{}]:{}", self.user, self.host, self.port)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}
