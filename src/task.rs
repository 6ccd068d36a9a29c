//! Task catalogue
//!
//! Maps task names to step lists. The catalogue is built once at startup
//! from a [`DeployConfig`] and never changes afterwards. Composite tasks
//! such as `install` copy the steps of the tasks they include at build
//! time; nothing is looked up by name while a task runs.

use std::collections::HashMap;

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::shell::quote;
use crate::step::{remote_join, FileMapping, RemoteCommand, Step};

const SYSUSERS_DIR: &str = "/usr/lib/sysusers.d";
const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// A named, ordered list of steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    name: String,
    description: String,
    steps: Vec<Step>,
}

impl Task {
    pub fn new(name: impl Into<String>, description: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Immutable name -> task table, in registration order
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl TaskRegistry {
    /// Build from a list of tasks, rejecting duplicate names
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Result<Self> {
        let mut registry = Self::default();
        for task in tasks {
            if registry.index.contains_key(task.name()) {
                return Err(DeployError::DuplicateTask {
                    name: task.name().to_string(),
                });
            }
            registry.index.insert(task.name().to_string(), registry.tasks.len());
            registry.tasks.push(task);
        }
        Ok(registry)
    }

    /// The server management tasks
    pub fn standard(config: &DeployConfig, mods: &FileMapping) -> Result<Self> {
        let catalogue = Catalogue {
            config,
            config_files: config.config_mapping(),
            mods,
            installer: config.installer_name()?,
            unit: config.unit_name(),
        };

        Self::from_tasks([
            Task::new("install", "Install the server from scratch", catalogue.install()),
            Task::new(
                "upload-config",
                "Upload configuration files",
                catalogue.upload_config(),
            ),
            Task::new(
                "update-config",
                "Upload configuration files and restart the server",
                catalogue.with_restart(catalogue.upload_config()),
            ),
            Task::new("upload-mods", "Upload the mods directory", catalogue.upload_mods()),
            Task::new(
                "update-mods",
                "Upload mods and restart the server",
                catalogue.with_restart(catalogue.upload_mods()),
            ),
            Task::new(
                "clean",
                "Delete all server files from the host",
                catalogue.clean(),
            ),
            Task::new("start", "Start the server", vec![catalogue.systemctl("start")]),
            Task::new("stop", "Stop the server", vec![catalogue.systemctl("stop")]),
            Task::new("restart", "Restart the server", vec![catalogue.systemctl("restart")]),
            Task::new("journalctl", "Follow the server log", catalogue.journalctl()),
            Task::new("screen", "List the server console sessions", catalogue.screen()),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(Task::name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Step builders for the standard tasks
struct Catalogue<'a> {
    config: &'a DeployConfig,
    config_files: FileMapping,
    mods: &'a FileMapping,
    installer: &'a str,
    unit: String,
}

impl Catalogue<'_> {
    fn server_dir(&self) -> &str {
        &self.config.server_dir
    }

    fn sysusers_file(&self) -> String {
        remote_join(SYSUSERS_DIR, &format!("{}.conf", self.config.service))
    }

    fn install(&self) -> Vec<Step> {
        let java = &self.config.java;
        let dir = self.server_dir();
        let user = &self.config.service_user;

        let mut steps = vec![
            Step::run(format!(
                "echo {} > {}",
                quote(&java.apt_source),
                quote(&java.apt_source_file)
            )),
            Step::run("apt-get --yes update"),
            Step::run(format!(
                "apt-get --yes install -t {} {}",
                quote(&java.release),
                quote(&java.package)
            )),
            Step::run(format!("mkdir -p {}", quote(dir))),
            RemoteCommand::new("echo eula=true > eula.txt").in_dir(dir).into(),
            RemoteCommand::words(["wget", "-O", self.installer, self.config.forge_url.as_str()])
                .in_dir(dir)
                .into(),
            RemoteCommand::words(["java", "-jar", self.installer, "--installServer"])
                .in_dir(dir)
                .into(),
            RemoteCommand::words(["rm", self.installer]).in_dir(dir).into(),
        ];

        steps.extend(self.upload_config());
        steps.extend(self.upload_mods());

        let sysusers_entry = format!("u {user} - \"{} server user\"", self.config.service);
        steps.extend([
            Step::run(format!("mkdir -p {SYSUSERS_DIR}")),
            Step::run(format!(
                "echo {} > {}",
                quote(&sysusers_entry),
                quote(&self.sysusers_file())
            )),
            Step::run("systemd-sysusers"),
            Step::run(format!("chown -R {}:{} {}", quote(user), quote(user), quote(dir))),
            Step::run("systemctl daemon-reload"),
            self.systemctl("start"),
        ]);
        steps
    }

    fn upload_config(&self) -> Vec<Step> {
        self.config_files.upload_steps()
    }

    fn upload_mods(&self) -> Vec<Step> {
        let mut steps = vec![Step::run(format!(
            "mkdir -p {}",
            quote(&self.config.mods_remote_dir())
        ))];
        steps.extend(self.mods.upload_steps());
        steps
    }

    /// `steps` followed by a unit reload and a service restart
    fn with_restart(&self, mut steps: Vec<Step>) -> Vec<Step> {
        steps.push(Step::run("systemctl daemon-reload"));
        steps.push(self.systemctl("restart"));
        steps
    }

    fn clean(&self) -> Vec<Step> {
        vec![
            Step::confirm(
                "Really stop the server and delete all files? This cannot be undone",
            ),
            Step::run(format!("rm {}", quote(&self.config.java.apt_source_file))),
            self.systemctl("stop"),
            Step::run(format!("rm -rf {}", quote(self.server_dir()))),
            Step::run(format!(
                "rm {}",
                quote(&remote_join(SYSTEMD_UNIT_DIR, &self.unit))
            )),
            Step::run(format!("rm {}", quote(&self.sysusers_file()))),
        ]
    }

    fn systemctl(&self, verb: &str) -> Step {
        Step::run(format!("systemctl {} {}", verb, quote(&self.unit)))
    }

    fn journalctl(&self) -> Vec<Step> {
        vec![Step::run(format!("journalctl -u {} -f", quote(&self.unit)))]
    }

    fn screen(&self) -> Vec<Step> {
        vec![RemoteCommand::new("screen -list")
            .as_user(&self.config.service_user)
            .into()]
    }
}
