#![cfg(unix)]

mod common;
use crate::common::builders::SettingsBuilder;
use crate::common::{canonical_root, init_tracing, with_timeout};

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::{tempdir, TempDir};

use devmon::config::Settings;
use devmon::reload::Reloader;
use devmon::types::ReloadState;

type TestResult = Result<(), Box<dyn Error>>;

/// Copies `src/app.sh` to the binary path and makes it executable.
const BUILD_SCRIPT: &str = "#!/bin/sh\nset -e\ncp \"$2/app.sh\" \"$1\"\nchmod +x \"$1\"\n";

struct Project {
    _dir: TempDir,
    root: PathBuf,
}

impl Project {
    /// A project whose program records its pid and then sleeps.
    fn new() -> Result<Self, Box<dyn Error>> {
        let dir = tempdir()?;
        let root = canonical_root(dir.path());
        fs::create_dir(root.join("src"))?;
        fs::write(root.join("build.sh"), BUILD_SCRIPT)?;
        let project = Self { _dir: dir, root };
        project.program(&format!(
            "echo $$ >> \"{}\"\nexec sleep 30",
            project.pid_file().display()
        ))?;
        Ok(project)
    }

    fn program(&self, body: &str) -> std::io::Result<()> {
        fs::write(self.root.join("src/app.sh"), format!("#!/bin/sh\n{body}\n"))
    }

    fn pid_file(&self) -> PathBuf {
        self.root.join("pids")
    }

    fn settings(&self) -> SettingsBuilder {
        SettingsBuilder::new(&self.root)
            .reload("src", "sh ./build.sh")
            .binary("app")
    }

    fn reloader(&self, settings: Settings) -> Reloader {
        Reloader::new(Arc::new(settings))
    }

    fn pids(&self) -> Vec<u32> {
        fs::read_to_string(self.pid_file())
            .unwrap_or_default()
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect()
    }

    async fn wait_for_pids(&self, count: usize) -> Vec<u32> {
        with_timeout(async {
            loop {
                let pids = self.pids();
                if pids.len() >= count {
                    return pids;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
    }
}

fn is_alive(pid: u32) -> bool {
    std::process::Command::new("sh")
        .args(["-c", &format!("kill -0 {pid} 2>/dev/null")])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn wait_dead(pid: u32) {
    with_timeout(async {
        while is_alive(pid) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

fn exists(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}

#[tokio::test]
async fn run_builds_and_launches_then_cleanup_stops() -> TestResult {
    init_tracing();
    let project = Project::new()?;
    let settings = project.settings().build();
    let binary = settings.reload.binary.clone();
    let build_log = settings.reload.build_log.clone();
    let reloader = project.reloader(settings);
    assert_eq!(reloader.state(), ReloadState::Idle);

    let launched = with_timeout(async { reloader.run().await.await }).await;
    assert!(launched.is_ok());
    assert_eq!(reloader.state(), ReloadState::Running);
    assert!(reloader.is_running());
    assert!(exists(&binary));
    assert!(exists(&build_log));

    let pids = project.wait_for_pids(1).await;
    let current = *pids.last().ok_or("no pid recorded")?;
    assert!(is_alive(current));

    with_timeout(reloader.cleanup()).await;
    assert_eq!(reloader.state(), ReloadState::Idle);
    assert!(!reloader.is_running());
    assert!(!exists(&binary));
    wait_dead(current).await;
    Ok(())
}

#[tokio::test]
async fn new_cycle_replaces_the_running_program() -> TestResult {
    init_tracing();
    let project = Project::new()?;
    let reloader = project.reloader(project.settings().build());

    let first = with_timeout(async { reloader.run().await.await }).await;
    assert!(first.is_ok());
    let first_pid = project.wait_for_pids(1).await[0];

    let second = with_timeout(async { reloader.run().await.await }).await;
    assert!(second.is_ok());
    let pids = project.wait_for_pids(2).await;
    assert_eq!(pids.len(), 2);

    wait_dead(first_pid).await;
    assert!(is_alive(pids[1]));

    with_timeout(reloader.cleanup()).await;
    wait_dead(pids[1]).await;
    Ok(())
}

#[tokio::test]
async fn back_to_back_runs_leave_one_instance() -> TestResult {
    init_tracing();
    let project = Project::new()?;
    let reloader = project.reloader(project.settings().build());

    let first = with_timeout(reloader.run()).await;
    let second = with_timeout(reloader.run()).await;

    assert!(with_timeout(second).await.is_ok());
    // The first cycle was superseded before it could launch.
    assert!(with_timeout(first).await.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let pids = project.wait_for_pids(1).await;
    let alive: Vec<_> = pids.iter().copied().filter(|p| is_alive(*p)).collect();
    assert_eq!(alive.len(), 1);

    with_timeout(reloader.cleanup()).await;
    wait_dead(alive[0]).await;
    Ok(())
}

#[tokio::test]
async fn failed_build_reports_no_launch() -> TestResult {
    init_tracing();
    let project = Project::new()?;
    let settings = project
        .settings()
        .reload("src", "echo compile error >&2; false")
        .build();
    let binary = settings.reload.binary.clone();
    let build_log = settings.reload.build_log.clone();
    let reloader = project.reloader(settings);

    let launched = with_timeout(async { reloader.run().await.await }).await;
    assert!(launched.is_err());
    assert_eq!(reloader.state(), ReloadState::Idle);
    assert!(!reloader.is_running());
    assert!(!exists(&binary));

    let log = fs::read_to_string(build_log)?;
    assert!(log.contains("compile error"));
    Ok(())
}

#[tokio::test]
async fn missing_binary_reports_no_launch() -> TestResult {
    let project = Project::new()?;
    let reloader = project.reloader(project.settings().reload("src", "true").build());

    let launched = with_timeout(async { reloader.run().await.await }).await;
    assert!(launched.is_err());
    assert_eq!(reloader.state(), ReloadState::Idle);
    Ok(())
}

#[tokio::test]
async fn cleanup_cancels_an_in_flight_build() -> TestResult {
    init_tracing();
    let project = Project::new()?;
    let marker = project.root.join("still_building");
    fs::write(
        project.root.join("slow_build.sh"),
        format!("sleep 1\ntouch \"{}\"\n{BUILD_SCRIPT}", marker.display()),
    )?;
    let settings = project.settings().reload("src", "sh ./slow_build.sh").build();
    let binary = settings.reload.binary.clone();
    let reloader = project.reloader(settings);

    let launched = with_timeout(reloader.run()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(reloader.state(), ReloadState::Building);

    with_timeout(reloader.cleanup()).await;
    assert!(with_timeout(launched).await.is_err());
    assert_eq!(reloader.state(), ReloadState::Idle);
    assert!(!exists(&binary));
    assert!(project.pids().is_empty());

    // Nothing the build script started may outlive the cancellation.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!exists(&marker));
    assert!(!exists(&binary));
    Ok(())
}

#[tokio::test]
async fn program_exiting_on_its_own_is_still_cleaned_up() -> TestResult {
    init_tracing();
    let project = Project::new()?;
    project.program("exit 0")?;
    let settings = project.settings().build();
    let binary = settings.reload.binary.clone();
    let reloader = project.reloader(settings);

    let launched = with_timeout(async { reloader.run().await.await }).await;
    assert!(launched.is_ok());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Idle again, but the slot stays taken until the next cleanup.
    with_timeout(async {
        while reloader.state() != ReloadState::Idle {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reloader.is_running());
    with_timeout(reloader.cleanup()).await;
    assert!(!reloader.is_running());
    assert!(!exists(&binary));
    Ok(())
}

#[tokio::test]
async fn background_children_of_an_exited_program_are_stopped() -> TestResult {
    init_tracing();
    let project = Project::new()?;
    project.program(&format!(
        "sleep 30 &\necho $! >> \"{}\"\nexit 0",
        project.pid_file().display()
    ))?;
    let reloader = project.reloader(project.settings().build());

    let launched = with_timeout(async { reloader.run().await.await }).await;
    assert!(launched.is_ok());
    let orphan = project.wait_for_pids(1).await[0];

    // Let the program itself exit first.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(is_alive(orphan));

    with_timeout(reloader.cleanup()).await;
    wait_dead(orphan).await;
    assert!(!reloader.is_running());
    Ok(())
}

#[tokio::test]
async fn custom_run_command_is_stopped_with_its_children() -> TestResult {
    init_tracing();
    let project = Project::new()?;
    let script = project.root.join("src/app.sh");
    let settings = project
        .settings()
        .reload("src", "true")
        .run_command(&format!("sh {} && echo unreachable", script.display()))
        .build();
    let reloader = project.reloader(settings);

    let launched = with_timeout(async { reloader.run().await.await }).await;
    assert!(launched.is_ok());
    let pid = project.wait_for_pids(1).await[0];
    assert!(is_alive(pid));

    with_timeout(reloader.cleanup()).await;
    wait_dead(pid).await;
    Ok(())
}
