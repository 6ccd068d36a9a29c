//! Error types with fix suggestions

use thiserror::Error;

use crate::runner::TaskState;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Everything that can stop a task or keep one from starting.
///
/// Step numbers are 1-based, matching the order printed by `mcdeploy list`.
#[derive(Error, Debug)]
pub enum DeployError {
    // ─────────────────────────────────────────────────────────────
    // Task resolution
    // ─────────────────────────────────────────────────────────────
    #[error("Unknown task '{name}'")]
    UnknownTask { name: String },

    #[error("Task '{name}' is defined more than once")]
    DuplicateTask { name: String },

    // ─────────────────────────────────────────────────────────────
    // Step failures
    // ─────────────────────────────────────────────────────────────
    #[error("Step {step}: command exited with status {exit_code}: {command}")]
    CommandFailed {
        step: usize,
        exit_code: i32,
        command: String,
    },

    #[error("Step {step}: upload {local} -> {remote} failed: {cause}")]
    TransferFailed {
        step: usize,
        local: String,
        remote: String,
        cause: String,
    },

    #[error("Step {step}: could not run '{command}': {reason}")]
    Transport {
        step: usize,
        command: String,
        reason: String,
    },

    #[error("Step {step}: confirmation failed: {reason}")]
    Confirm { step: usize, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Setup
    // ─────────────────────────────────────────────────────────────
    #[error("Cannot connect to {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("Config error: {reason}")]
    Config { reason: String },

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid task state transition {from:?} -> {to:?}")]
    InvalidTransition { from: TaskState, to: TaskState },
}

impl FixSuggestion for DeployError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            DeployError::UnknownTask { .. } => Some("Run `mcdeploy list` to see available tasks"),
            DeployError::DuplicateTask { .. } => Some("Give every task a unique name"),
            DeployError::CommandFailed { .. } => {
                Some("Check the remote output above, fix the server state and re-run the task")
            }
            DeployError::TransferFailed { .. } => {
                Some("Check the local file exists and the remote directory is writable")
            }
            DeployError::Transport { .. } => Some("Check the SSH connection is still up"),
            DeployError::Confirm { .. } => Some("Pass --yes to answer confirmations non-interactively"),
            DeployError::Connection { .. } => {
                Some("Check host, port and credentials (is ssh-agent running?)")
            }
            DeployError::Config { .. } => Some("Fix the value in deploy.yaml"),
            DeployError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            DeployError::InvalidTransition { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
