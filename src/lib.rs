//! mcdeploy - provision and operate a Forge game server over SSH
//!
//! A deployment is a fixed catalogue of named tasks ([`TaskRegistry`]),
//! each an ordered list of [`Step`]s. The [`Runner`] executes one task
//! against one [`Remote`], stopping at the first failing step.

pub mod config;
pub mod confirm;
pub mod error;
pub mod event_log;
pub mod remote;
pub mod runner;
pub mod shell;
pub mod step;
pub mod task;

pub use config::DeployConfig;
pub use confirm::{AutoConfirm, Confirmer, ScriptedConfirm, TerminalConfirmer};
pub use error::{DeployError, FixSuggestion};
pub use event_log::{Event, EventKind, EventLog};
pub use remote::{Call, DryRunRemote, MockRemote, Remote, RemoteTarget, SshAuth, SshRemote};
pub use runner::{RunOutcome, Runner, TaskState};
pub use step::{FileMapping, FileMappingEntry, RemoteCommand, Step};
pub use task::{Task, TaskRegistry};
