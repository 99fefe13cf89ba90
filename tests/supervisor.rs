#![cfg(unix)]

mod common;

use std::{sync::Arc, time::Duration};

use common::{DESTINATION, SOURCE, WAIT, script_supervisor, wait_until_empty};
use srt_relay::{
    encoder::{
        Backend, DynLauncher, EncoderOptions, InstallCommand, Installer, SystemLauncher,
        ToolPaths,
    },
    error::AppError,
    supervisor::{JobStatus, Supervisor},
};
use tempfile::tempdir;

const LONG_RUNNING: &str = "exec sleep 30";

fn system_supervisor(ffmpeg: &str, installer: Installer) -> Supervisor {
    let launcher: DynLauncher = Arc::new(SystemLauncher::new(Duration::from_secs(1)));
    let tools = ToolPaths {
        ffmpeg: ffmpeg.to_string(),
        ..ToolPaths::default()
    };
    Supervisor::new(launcher, installer, tools)
}

fn shell_installer(script: String) -> Installer {
    Installer::new(
        true,
        "linux",
        Some(InstallCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script],
        }),
    )
}

#[tokio::test]
async fn start_registers_running_job() -> Result<(), AppError> {
    let (supervisor, launches) = script_supervisor(LONG_RUNNING);

    let handle = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await?;

    let snapshot = supervisor.status(SOURCE).await.expect("job registered");
    assert!(matches!(
        snapshot.status,
        JobStatus::Starting | JobStatus::Running
    ));
    assert_eq!(snapshot.job_id, handle.job_id);
    assert_eq!(snapshot.destination, DESTINATION);
    assert_eq!(snapshot.backend, Backend::Ffmpeg);
    assert!(snapshot.pid.is_some());
    assert_eq!(launches.lock().unwrap().len(), 1);

    assert!(supervisor.stop(SOURCE).await);
    Ok(())
}

#[tokio::test]
async fn stop_removes_entry_before_process_exits() -> Result<(), AppError> {
    let (supervisor, _) = script_supervisor(LONG_RUNNING);
    let handle = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await?;

    assert!(supervisor.stop(SOURCE).await);
    assert!(supervisor.status(SOURCE).await.is_none());

    tokio::time::timeout(WAIT, handle.exited())
        .await
        .expect("process terminated after stop");
    assert_eq!(handle.status(), JobStatus::Exited);
    Ok(())
}

#[tokio::test]
async fn stop_unknown_source_is_noop() {
    let (supervisor, _) = script_supervisor(LONG_RUNNING);
    assert!(!supervisor.stop(SOURCE).await);
    assert!(!supervisor.stop(SOURCE).await);
    assert!(supervisor.list().await.is_empty());
}

#[tokio::test]
async fn process_exit_removes_job() -> Result<(), AppError> {
    let (supervisor, _) = script_supervisor("echo starting; echo 'fatal error' 1>&2; exit 3");
    let handle = supervisor
        .start(SOURCE, DESTINATION, Backend::Gstreamer, EncoderOptions::default())
        .await?;

    tokio::time::timeout(WAIT, handle.exited())
        .await
        .expect("process exited");
    assert!(supervisor.status(SOURCE).await.is_none());
    Ok(())
}

#[tokio::test]
async fn duplicate_source_is_rejected() -> Result<(), AppError> {
    let (supervisor, launches) = script_supervisor(LONG_RUNNING);
    let first = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await?;

    let err = supervisor
        .start(SOURCE, "rtmp://other/live", Backend::Ffmpeg, EncoderOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyRunning(_)));
    assert_eq!(launches.lock().unwrap().len(), 1);

    let snapshot = supervisor.status(SOURCE).await.expect("first job kept");
    assert_eq!(snapshot.job_id, first.job_id);
    assert_eq!(snapshot.destination, DESTINATION);

    supervisor.stop(SOURCE).await;
    Ok(())
}

#[tokio::test]
async fn late_exit_does_not_remove_replacement_job() -> Result<(), AppError> {
    let (supervisor, _) = script_supervisor(LONG_RUNNING);
    let first = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await?;
    supervisor.stop(SOURCE).await;

    let second = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await?;
    assert_ne!(first.job_id, second.job_id);

    tokio::time::timeout(WAIT, first.exited())
        .await
        .expect("first process exited");

    let snapshot = supervisor.status(SOURCE).await.expect("replacement kept");
    assert_eq!(snapshot.job_id, second.job_id);
    assert_eq!(second.status(), JobStatus::Running);

    supervisor.stop(SOURCE).await;
    Ok(())
}

#[tokio::test]
async fn invalid_endpoints_are_rejected_before_spawn() {
    let (supervisor, launches) = script_supervisor(LONG_RUNNING);

    for (source, destination) in [
        ("", DESTINATION),
        (SOURCE, ""),
        ("not a url", DESTINATION),
        (SOURCE, "http://host/live"),
    ] {
        let err = supervisor
            .start(source, destination, Backend::Ffmpeg, EncoderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)), "{source} -> {destination}");
    }

    assert!(launches.lock().unwrap().is_empty());
    assert!(supervisor.list().await.is_empty());
}

#[tokio::test]
async fn invalid_options_are_rejected_before_spawn() {
    let (supervisor, launches) = script_supervisor(LONG_RUNNING);
    let options = EncoderOptions {
        video_bitrate: 0,
        ..EncoderOptions::default()
    };

    let err = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, options)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOptions(_)));
    assert!(launches.lock().unwrap().is_empty());
    assert!(supervisor.status(SOURCE).await.is_none());
}

#[tokio::test]
async fn missing_executable_installs_once_then_gives_up() {
    let temp = tempdir().expect("tempdir");
    let ffmpeg = temp.path().join("missing-ffmpeg");
    let marker = temp.path().join("installs");
    let installer = shell_installer(format!("echo run >> '{}'", marker.display()));
    let supervisor = system_supervisor(&ffmpeg.to_string_lossy(), installer);

    let err = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DependencyUnavailable(_)));
    let installs = std::fs::read_to_string(&marker).expect("installer ran");
    assert_eq!(installs.lines().count(), 1);
    assert!(supervisor.status(SOURCE).await.is_none());
}

#[tokio::test]
async fn missing_executable_with_install_disabled_fails_immediately() {
    let temp = tempdir().expect("tempdir");
    let ffmpeg = temp.path().join("missing-ffmpeg");
    let supervisor = system_supervisor(&ffmpeg.to_string_lossy(), Installer::disabled());

    let err = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DependencyUnavailable(_)));
    assert!(supervisor.list().await.is_empty());
}

#[tokio::test]
async fn retry_after_install_starts_job() -> Result<(), AppError> {
    let temp = tempdir().expect("tempdir");
    let ffmpeg = temp.path().join("ffmpeg");
    let installer = shell_installer(format!(
        "printf '#!/bin/sh\\nexec sleep 30\\n' > '{path}' && chmod +x '{path}'",
        path = ffmpeg.display()
    ));
    let supervisor = system_supervisor(&ffmpeg.to_string_lossy(), installer);

    let handle = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await?;
    assert_eq!(handle.status(), JobStatus::Running);
    assert!(supervisor.status(SOURCE).await.is_some());

    supervisor.stop(SOURCE).await;
    tokio::time::timeout(WAIT, handle.exited())
        .await
        .expect("installed encoder stopped");
    Ok(())
}

#[tokio::test]
async fn stop_while_starting_terminates_spawned_process() -> Result<(), AppError> {
    let temp = tempdir().expect("tempdir");
    let ffmpeg = temp.path().join("ffmpeg");
    let installer = shell_installer(format!(
        "sleep 1; printf '#!/bin/sh\\nexec sleep 30\\n' > '{path}' && chmod +x '{path}'",
        path = ffmpeg.display()
    ));
    let supervisor = system_supervisor(&ffmpeg.to_string_lossy(), installer);

    let starting = supervisor.clone();
    let start = tokio::spawn(async move {
        starting
            .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
            .await
    });

    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(snapshot) = supervisor.status(SOURCE).await {
                assert_eq!(snapshot.status, JobStatus::Starting);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job reserved");
    assert!(supervisor.stop(SOURCE).await);

    let handle = start.await.expect("start task")?;
    assert_ne!(handle.status(), JobStatus::Running);
    assert!(supervisor.status(SOURCE).await.is_none());

    tokio::time::timeout(WAIT, handle.exited())
        .await
        .expect("spawned process terminated");
    assert_eq!(handle.status(), JobStatus::Exited);
    assert!(supervisor.list().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn unlaunchable_executable_is_a_spawn_failure() {
    let temp = tempdir().expect("tempdir");
    let supervisor = system_supervisor(&temp.path().to_string_lossy(), Installer::disabled());

    let err = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::SpawnFailure(_)));
    assert!(supervisor.status(SOURCE).await.is_none());
}

#[tokio::test]
async fn shutdown_stops_every_job() -> Result<(), AppError> {
    let (supervisor, _) = script_supervisor(LONG_RUNNING);
    let first = supervisor
        .start(SOURCE, DESTINATION, Backend::Ffmpeg, EncoderOptions::default())
        .await?;
    let second = supervisor
        .start("srt://host:2", DESTINATION, Backend::Gstreamer, EncoderOptions::default())
        .await?;
    assert_eq!(supervisor.list().await.len(), 2);

    let stopped = supervisor.shutdown(WAIT).await;
    assert_eq!(stopped, 2);
    wait_until_empty(&supervisor).await;
    assert_eq!(first.status(), JobStatus::Exited);
    assert_eq!(second.status(), JobStatus::Exited);
    Ok(())
}
