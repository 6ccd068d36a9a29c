//! Task runner
//!
//! Runs one task's steps in order against one remote, stopping at the
//! first failure. Nothing is retried and nothing already done is undone:
//! a failed run leaves the host exactly as far along as it got, and the
//! error says which step to look at.
//!
//! Lifecycle of a run:
//!
//! ```text
//! Pending -> Running -> Completed
//!                    -> Failed
//!                    -> Aborted   (operator answered "no" to a confirm step)
//! ```

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::confirm::Confirmer;
use crate::error::{DeployError, Result};
use crate::event_log::{EventKind, EventLog};
use crate::remote::Remote;
use crate::step::Step;
use crate::task::{Task, TaskRegistry};

/// Where a task run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl TaskState {
    pub fn can_transition(self, to: TaskState) -> bool {
        matches!(
            (self, to),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Running, TaskState::Aborted)
        )
    }

    pub fn transition(self, to: TaskState) -> Result<TaskState> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(DeployError::InvalidTransition { from: self, to })
        }
    }
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The operator declined a confirmation; later steps were skipped
    Aborted,
}

enum StepResult {
    Continue,
    Declined,
}

/// One in-flight task run
struct TaskRun<'a> {
    task: &'a Task,
    state: TaskState,
    log: &'a EventLog,
    started: Instant,
}

impl TaskRun<'_> {
    fn enter(&mut self, to: TaskState) -> Result<()> {
        self.state = self.state.transition(to)?;
        debug!(task = self.task.name(), state = ?self.state, "Task state changed");
        Ok(())
    }

    fn fail(&mut self, step: Option<usize>, error: DeployError) -> DeployError {
        if let Err(e) = self.enter(TaskState::Failed) {
            return e;
        }
        self.log.emit(EventKind::TaskFailed {
            task: self.task.name().to_string(),
            step,
            error: error.to_string(),
        });
        error
    }
}

/// Runs tasks from a fixed catalogue
pub struct Runner {
    registry: TaskRegistry,
    event_log: EventLog,
}

impl Runner {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            registry,
            event_log: EventLog::new(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Run `task_name` against `remote`.
    ///
    /// Unknown names fail before the remote is touched. `Confirm` steps go
    /// to `confirmer`; a "no" answer ends the run with
    /// [`RunOutcome::Aborted`].
    #[instrument(skip(self, remote, confirmer))]
    pub fn run(
        &self,
        task_name: &str,
        remote: &mut dyn Remote,
        confirmer: &mut dyn Confirmer,
    ) -> Result<RunOutcome> {
        let task = self
            .registry
            .get(task_name)
            .ok_or_else(|| DeployError::UnknownTask {
                name: task_name.to_string(),
            })?;

        let mut run = TaskRun {
            task,
            state: TaskState::Pending,
            log: &self.event_log,
            started: Instant::now(),
        };
        run.enter(TaskState::Running)?;

        let total = task.steps().len();
        self.event_log.emit(EventKind::TaskStarted {
            task: task.name().to_string(),
            step_count: total,
        });
        info!(task = task.name(), steps = total, "Task started");

        for (i, step) in task.steps().iter().enumerate() {
            let number = i + 1;
            info!("[{number}/{total}] {step}");
            self.event_log.emit(EventKind::StepStarted {
                step: number,
                kind: step.kind(),
                description: step.to_string(),
            });

            let started = Instant::now();
            match execute_step(number, step, remote, confirmer) {
                Ok(StepResult::Continue) => {
                    self.event_log.emit(EventKind::StepCompleted {
                        step: number,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Ok(StepResult::Declined) => {
                    run.enter(TaskState::Aborted)?;
                    self.event_log.emit(EventKind::TaskAborted {
                        task: task.name().to_string(),
                        step: number,
                    });
                    warn!(task = task.name(), step = number, "Task aborted by operator");
                    return Ok(RunOutcome::Aborted);
                }
                Err(error) => {
                    self.event_log.emit(EventKind::StepFailed {
                        step: number,
                        error: error.to_string(),
                    });
                    return Err(run.fail(Some(number), error));
                }
            }
        }

        run.enter(TaskState::Completed)?;
        self.event_log.emit(EventKind::TaskCompleted {
            task: task.name().to_string(),
            duration_ms: run.started.elapsed().as_millis() as u64,
        });
        info!(task = task.name(), "Task completed");
        Ok(RunOutcome::Completed)
    }
}

fn execute_step(
    number: usize,
    step: &Step,
    remote: &mut dyn Remote,
    confirmer: &mut dyn Confirmer,
) -> Result<StepResult> {
    match step {
        Step::RunCommand(command) => {
            let line = command.render(remote.workdir(), |user, cmd| remote.as_sudo(user, cmd));
            debug!(step = number, command = %line, "Running remote command");
            match remote.run_command(&line) {
                Ok(0) => Ok(StepResult::Continue),
                Ok(exit_code) => Err(DeployError::CommandFailed {
                    step: number,
                    exit_code,
                    command: line,
                }),
                Err(e) => Err(DeployError::Transport {
                    step: number,
                    command: line,
                    reason: format!("{e:#}"),
                }),
            }
        }
        Step::UploadFile { local, remote: dest } => remote
            .upload_file(local, dest)
            .map(|()| StepResult::Continue)
            .map_err(|e| DeployError::TransferFailed {
                step: number,
                local: local.display().to_string(),
                remote: dest.clone(),
                cause: format!("{e:#}"),
            }),
        Step::Confirm { prompt } => {
            let yes = confirmer
                .confirm(prompt)
                .map_err(|e| DeployError::Confirm {
                    step: number,
                    reason: e.to_string(),
                })?;
            Ok(if yes {
                StepResult::Continue
            } else {
                StepResult::Declined
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use TaskState::*;
        assert!(Pending.can_transition(Running));
        assert!(Running.can_transition(Completed));
        assert!(Running.can_transition(Failed));
        assert!(Running.can_transition(Aborted));
    }

    #[test]
    fn test_rejected_transitions() {
        use TaskState::*;
        assert!(!Pending.can_transition(Completed));
        assert!(!Running.can_transition(Running));
        assert!(!Completed.can_transition(Running));
        assert!(!Aborted.can_transition(Failed));
        assert!(matches!(
            Failed.transition(Running),
            Err(DeployError::InvalidTransition { .. })
        ));
    }
}
