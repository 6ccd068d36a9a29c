//! Deployment configuration
//!
//! Loaded from `deploy.yaml`. Every field has a default matching the
//! stock Forge 1.12.2 server layout, so a missing file is not an error.
//!
//! ```yaml
//! server_dir: /var/minecraft/server
//! service: minecraft
//! upload_files:
//!   - { local: data/server.properties, remote: server.properties }
//!   - { local: data/minecraft.service, remote: /etc/systemd/system/minecraft.service }
//! targets:
//!   production: { host: mc.example.org, user: root }
//!   beta: { host: beta.example.org, port: 2222, auth: { kind: key_file, path: ~/.ssh/beta } }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::{DeployError, Result};
use crate::remote::RemoteTarget;
use crate::step::{remote_join, FileMapping, FileMappingEntry};

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "deploy.yaml";

const DEFAULT_FORGE_URL: &str = "https://files.minecraftforge.net/maven/net/minecraftforge/forge/1.12.2-14.23.5.2854/forge-1.12.2-14.23.5.2854-installer.jar";

/// Where the Java runtime comes from.
///
/// Forge 1.12.2 only runs on Java 8, which means pulling it from an
/// archived backports release.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct JavaConfig {
    /// apt source line to add
    pub apt_source: String,
    /// File the source line is written to
    pub apt_source_file: String,
    /// Release passed to `apt-get install -t`
    pub release: String,
    /// JRE package name
    pub package: String,
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            apt_source: "deb [check-valid-until=no] http://archive.debian.org/debian jessie-backports main".to_string(),
            apt_source_file: "/etc/apt/sources.list.d/jessie-backports.list".to_string(),
            release: "jessie-backports".to_string(),
            package: "openjdk-8-jre-headless".to_string(),
        }
    }
}

/// Full deployment configuration, passed explicitly to the task catalogue
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Server install directory on the remote host (absolute)
    pub server_dir: String,
    /// systemd service name, without `.service`
    pub service: String,
    /// System user that owns the server files
    pub service_user: String,
    /// Forge installer download URL
    pub forge_url: Url,
    pub java: JavaConfig,
    /// Local directory whose files are uploaded as mods
    pub mods_dir: PathBuf,
    /// Config files to upload; relative remote paths land in `server_dir`
    pub upload_files: Vec<FileMappingEntry>,
    /// Named remote hosts
    pub targets: BTreeMap<String, RemoteTarget>,

    /// Directory relative local paths resolve against
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        let upload_files = [
            ("data/server.properties", "server.properties"),
            ("data/banned-ips.json", "banned-ips.json"),
            ("data/banned-players.json", "banned-players.json"),
            ("data/ops.json", "ops.json"),
            ("data/whitelist.json", "whitelist.json"),
            ("data/minecraft.service", "/etc/systemd/system/minecraft.service"),
        ]
        .into_iter()
        .map(|(local, remote)| FileMappingEntry {
            local: PathBuf::from(local),
            remote: remote.to_string(),
        })
        .collect();

        Self {
            server_dir: "/var/minecraft/server".to_string(),
            service: "minecraft".to_string(),
            service_user: "minecraft".to_string(),
            forge_url: Url::parse(DEFAULT_FORGE_URL).expect("default forge URL is valid"),
            java: JavaConfig::default(),
            mods_dir: PathBuf::from("mods"),
            upload_files,
            targets: BTreeMap::new(),
            base_dir: None,
        }
    }
}

impl DeployConfig {
    /// Load configuration from `path`.
    ///
    /// Returns the defaults if the file doesn't exist.
    /// Returns an error if it exists but is malformed or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| DeployError::Config {
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
        debug!(path = %path.display(), targets = config.targets.len(), "Loaded config");
        Ok(config)
    }

    /// Parse and validate YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_dir.trim().is_empty() {
            return Err(DeployError::Config {
                reason: "server_dir must not be empty".to_string(),
            });
        }
        if !self.server_dir.starts_with('/') {
            return Err(DeployError::Config {
                reason: format!("server_dir must be absolute, got '{}'", self.server_dir),
            });
        }
        if self.service.trim().is_empty() || self.service_user.trim().is_empty() {
            return Err(DeployError::Config {
                reason: "service and service_user must not be empty".to_string(),
            });
        }
        self.installer_name()?;
        Ok(())
    }

    /// systemd unit name, e.g. `minecraft.service`
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service)
    }

    /// Installer file name: last segment of the forge URL path
    pub fn installer_name(&self) -> Result<&str> {
        self.forge_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| DeployError::Config {
                reason: format!("forge_url has no file name: {}", self.forge_url),
            })
    }

    /// Remote directory mods are uploaded into
    pub fn mods_remote_dir(&self) -> String {
        remote_join(&self.server_dir, "mods/")
    }

    /// Resolve a local path against the config file's directory
    pub fn resolve_local(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// The config-file table with local and remote paths resolved
    pub fn config_mapping(&self) -> FileMapping {
        self.upload_files
            .iter()
            .map(|entry| {
                let remote = if entry.remote.starts_with('/') {
                    entry.remote.clone()
                } else {
                    remote_join(&self.server_dir, &entry.remote)
                };
                (self.resolve_local(&entry.local), remote)
            })
            .collect()
    }

    /// Current contents of the mods directory
    pub fn mods_mapping(&self) -> Result<FileMapping> {
        FileMapping::from_dir(&self.resolve_local(&self.mods_dir), &self.mods_remote_dir())
    }

    /// Look up a named target, or parse `[user@]host[:port]`
    pub fn resolve_target(&self, name: &str) -> Result<RemoteTarget> {
        match self.targets.get(name) {
            Some(target) => Ok(target.clone()),
            None => RemoteTarget::parse(name),
        }
    }
}
