//! # Runner Tests
//!
//! Runs tasks against `MockRemote` and checks what reached the remote:
//! - every task runs its steps in declared order
//! - unknown tasks touch nothing
//! - the first failing step stops the run
//! - a declined confirmation aborts without error
//! - file mappings upload exactly their pairs, in table order

use std::fs;
use std::path::PathBuf;

use mcdeploy::{
    AutoConfirm, Call, DeployConfig, DeployError, EventKind, FileMapping, MockRemote, Remote,
    RemoteCommand, RunOutcome, Runner, ScriptedConfirm, Step, Task, TaskRegistry,
};
use tempfile::TempDir;

// ============================================================================
// TEST HELPERS
// ============================================================================

fn standard_runner() -> Runner {
    Runner::new(TaskRegistry::standard(&DeployConfig::default(), &FileMapping::new()).unwrap())
}

fn runner_with(tasks: Vec<Task>) -> Runner {
    Runner::new(TaskRegistry::from_tasks(tasks).unwrap())
}

fn two_file_config() -> DeployConfig {
    DeployConfig::from_yaml(
        r#"
upload_files:
  - { local: a.cfg, remote: /srv/a.cfg }
  - { local: b.json, remote: /srv/b.json }
"#,
    )
    .unwrap()
}

/// What a step should look like once it reached the mock remote
fn expected_call(step: &Step) -> Option<Call> {
    match step {
        Step::RunCommand(cmd) => Some(Call::Command(
            cmd.render(None, |user, text| MockRemote::new().as_sudo(user, text)),
        )),
        Step::UploadFile { local, remote } => Some(Call::Upload {
            local: local.clone(),
            remote: remote.clone(),
        }),
        Step::Confirm { .. } => None,
    }
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn test_every_task_runs_steps_in_declared_order() {
    let runner = standard_runner();

    for task in runner.registry().iter() {
        let mut remote = MockRemote::new();
        let outcome = runner
            .run(task.name(), &mut remote, &mut AutoConfirm(true))
            .unwrap();
        assert_eq!(outcome, RunOutcome::Completed, "task {}", task.name());

        let expected: Vec<Call> = task.steps().iter().filter_map(expected_call).collect();
        assert_eq!(remote.calls(), expected.as_slice(), "task {}", task.name());
    }
}

#[test]
fn test_commands_run_in_their_directory() {
    let runner = standard_runner();
    let mut remote = MockRemote::new();
    runner
        .run("install", &mut remote, &mut AutoConfirm(true))
        .unwrap();

    assert!(remote
        .commands()
        .contains(&"cd /var/minecraft/server && echo eula=true > eula.txt"));
}

#[test]
fn test_remote_workdir_is_fallback_only() {
    let runner = runner_with(vec![Task::new(
        "t",
        "",
        vec![
            Step::run("pwd"),
            RemoteCommand::new("ls").in_dir("/opt").into(),
        ],
    )]);
    let mut remote = MockRemote::new().with_workdir("/home/mc");
    runner.run("t", &mut remote, &mut AutoConfirm(true)).unwrap();

    assert_eq!(remote.commands(), vec!["cd /home/mc && pwd", "cd /opt && ls"]);
}

// ============================================================================
// UNKNOWN TASK
// ============================================================================

#[test]
fn test_unknown_task_touches_nothing() {
    let runner = standard_runner();
    let mut remote = MockRemote::new();
    let mut confirmer = ScriptedConfirm::new(Vec::new());

    let err = runner
        .run("unknown-task", &mut remote, &mut confirmer)
        .unwrap_err();

    assert!(matches!(err, DeployError::UnknownTask { ref name } if name == "unknown-task"));
    assert!(remote.calls().is_empty());
    assert!(confirmer.prompts().is_empty());
    assert!(runner.event_log().is_empty());
}

// ============================================================================
// FAILURE STOPS THE RUN
// ============================================================================

#[test]
fn test_failed_command_stops_remaining_steps() {
    let runner = standard_runner();
    // third remote call: apt-get install
    let mut remote = MockRemote::new().with_exit_code(2, 100);

    let err = runner
        .run("install", &mut remote, &mut AutoConfirm(true))
        .unwrap_err();

    match err {
        DeployError::CommandFailed {
            step,
            exit_code,
            command,
        } => {
            assert_eq!(step, 3);
            assert_eq!(exit_code, 100);
            assert!(command.starts_with("apt-get --yes install -t jessie-backports"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(remote.calls().len(), 3);
}

#[test]
fn test_failed_upload_stops_remaining_steps() {
    let runner = runner_with(vec![Task::new(
        "t",
        "",
        vec![
            Step::upload("a.cfg", "/srv/a.cfg"),
            Step::upload("b.json", "/srv/b.json"),
            Step::run("systemctl daemon-reload"),
        ],
    )]);
    let mut remote = MockRemote::new().with_failing_upload(1);

    let err = runner
        .run("t", &mut remote, &mut AutoConfirm(true))
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::TransferFailed { step: 2, remote: ref dest, .. } if dest == "/srv/b.json"
    ));
    assert_eq!(remote.calls().len(), 2);
}

#[test]
fn test_missing_local_file_is_transfer_failure() {
    let dir = TempDir::new().unwrap();
    let present = dir.path().join("present.cfg");
    fs::write(&present, "x").unwrap();
    let missing = dir.path().join("missing.cfg");

    let runner = runner_with(vec![Task::new(
        "t",
        "",
        vec![
            Step::upload(present, "/srv/present.cfg"),
            Step::upload(missing.clone(), "/srv/missing.cfg"),
            Step::run("true"),
        ],
    )]);
    let mut remote = MockRemote::new().checking_local_files();

    let err = runner
        .run("t", &mut remote, &mut AutoConfirm(true))
        .unwrap_err();

    match err {
        DeployError::TransferFailed {
            step, local, cause, ..
        } => {
            assert_eq!(step, 2);
            assert_eq!(local, missing.display().to_string());
            assert!(cause.contains("No such file"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(remote.commands().is_empty());
}

#[test]
fn test_transport_error_is_not_command_failure() {
    let runner = runner_with(vec![Task::new(
        "t",
        "",
        vec![Step::run("uptime"), Step::run("true")],
    )]);
    let mut remote = MockRemote::new().with_failing_transport(0);

    let err = runner
        .run("t", &mut remote, &mut AutoConfirm(true))
        .unwrap_err();

    assert!(matches!(err, DeployError::Transport { step: 1, .. }));
    assert_eq!(remote.calls().len(), 1);
}

#[test]
fn test_failure_is_recorded_in_event_log() {
    let runner = standard_runner();
    let mut remote = MockRemote::new().with_exit_code(0, 1);
    let _ = runner.run("start", &mut remote, &mut AutoConfirm(true));

    let events = runner.event_log().events();
    let last = &events.last().unwrap().kind;
    assert!(matches!(last, EventKind::TaskFailed { step: Some(1), .. }));
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::StepFailed { step: 1, .. })));
}

// ============================================================================
// CONFIRMATION
// ============================================================================

#[test]
fn test_declined_confirm_aborts_before_next_step() {
    let runner = standard_runner();
    let mut remote = MockRemote::new();
    let mut confirmer = ScriptedConfirm::new([false]);

    let outcome = runner.run("clean", &mut remote, &mut confirmer).unwrap();

    assert_eq!(outcome, RunOutcome::Aborted);
    assert!(remote.calls().is_empty());
    assert_eq!(confirmer.prompts().len(), 1);
    assert!(matches!(
        runner.event_log().events().last().unwrap().kind,
        EventKind::TaskAborted { step: 1, .. }
    ));
}

#[test]
fn test_declined_confirm_mid_task_keeps_earlier_steps() {
    let runner = runner_with(vec![Task::new(
        "t",
        "",
        vec![
            Step::run("first"),
            Step::confirm("Continue?"),
            Step::run("second"),
        ],
    )]);
    let mut remote = MockRemote::new();

    let outcome = runner
        .run("t", &mut remote, &mut ScriptedConfirm::new([false]))
        .unwrap();

    assert_eq!(outcome, RunOutcome::Aborted);
    assert_eq!(remote.commands(), vec!["first"]);
}

#[test]
fn test_accepted_confirm_runs_clean() {
    let runner = standard_runner();
    let mut remote = MockRemote::new();

    let outcome = runner
        .run("clean", &mut remote, &mut ScriptedConfirm::new([true]))
        .unwrap();

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        remote.commands(),
        vec![
            "rm /etc/apt/sources.list.d/jessie-backports.list",
            "systemctl stop minecraft.service",
            "rm -rf /var/minecraft/server",
            "rm /etc/systemd/system/minecraft.service",
            "rm /usr/lib/sysusers.d/minecraft.conf",
        ]
    );
}

// ============================================================================
// FILE MAPPINGS
// ============================================================================

#[test]
fn test_upload_config_issues_exactly_the_table() {
    let config = two_file_config();
    let runner = Runner::new(TaskRegistry::standard(&config, &FileMapping::new()).unwrap());
    let mut remote = MockRemote::new();

    runner
        .run("upload-config", &mut remote, &mut AutoConfirm(true))
        .unwrap();

    assert_eq!(
        remote.calls(),
        &[
            Call::Upload {
                local: PathBuf::from("a.cfg"),
                remote: "/srv/a.cfg".to_string()
            },
            Call::Upload {
                local: PathBuf::from("b.json"),
                remote: "/srv/b.json".to_string()
            },
        ]
    );
}

#[test]
fn test_update_config_is_upload_then_reload_then_restart() {
    let config = two_file_config();
    let runner = Runner::new(TaskRegistry::standard(&config, &FileMapping::new()).unwrap());
    let mut remote = MockRemote::new();

    runner
        .run("update-config", &mut remote, &mut AutoConfirm(true))
        .unwrap();

    assert_eq!(
        remote.uploads(),
        vec![
            (PathBuf::from("a.cfg"), "/srv/a.cfg".to_string()),
            (PathBuf::from("b.json"), "/srv/b.json".to_string()),
        ]
    );
    assert_eq!(remote.calls().len(), 4);
    assert_eq!(
        remote.commands(),
        vec!["systemctl daemon-reload", "systemctl restart minecraft.service"]
    );
    assert!(matches!(remote.calls()[2], Call::Command(_)));
}

#[test]
fn test_update_mods_uploads_directory_listing() {
    let dir = TempDir::new().unwrap();
    let mods = dir.path().join("mods");
    fs::create_dir(&mods).unwrap();
    for name in ["b.jar", "a.jar", "c.jar"] {
        fs::write(mods.join(name), name).unwrap();
    }

    let config_path = dir.path().join("deploy.yaml");
    fs::write(&config_path, "server_dir: /srv/mc\n").unwrap();
    let config = DeployConfig::load(&config_path).unwrap();
    let mapping = config.mods_mapping().unwrap();
    let runner = Runner::new(TaskRegistry::standard(&config, &mapping).unwrap());
    let mut remote = MockRemote::new();

    runner
        .run("update-mods", &mut remote, &mut AutoConfirm(true))
        .unwrap();

    assert_eq!(
        remote.uploads(),
        vec![
            (mods.join("a.jar"), "/srv/mc/mods/a.jar".to_string()),
            (mods.join("b.jar"), "/srv/mc/mods/b.jar".to_string()),
            (mods.join("c.jar"), "/srv/mc/mods/c.jar".to_string()),
        ]
    );
    assert_eq!(
        remote.commands(),
        vec![
            "mkdir -p /srv/mc/mods/",
            "systemctl daemon-reload",
            "systemctl restart minecraft.service",
        ]
    );
}

#[test]
fn test_running_does_not_change_definitions() {
    let config = two_file_config();
    let before = config.config_mapping();
    let runner = Runner::new(TaskRegistry::standard(&config, &FileMapping::new()).unwrap());
    let steps_before = runner.registry().get("install").unwrap().clone();

    let mut remote = MockRemote::new().with_exit_code(5, 1);
    let _ = runner.run("install", &mut remote, &mut AutoConfirm(true));

    assert_eq!(config.config_mapping(), before);
    assert_eq!(runner.registry().get("install").unwrap(), &steps_before);
}

// ============================================================================
// SUDO
// ============================================================================

#[test]
fn test_screen_runs_through_sudo() {
    let runner = standard_runner();
    let mut remote = MockRemote::new();
    runner
        .run("screen", &mut remote, &mut AutoConfirm(true))
        .unwrap();

    assert_eq!(
        remote.commands(),
        vec!["sudo -u minecraft -- sh -c 'screen -list'"]
    );
}
