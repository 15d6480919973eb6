mod common;
use crate::common::builders::SettingsBuilder;
use crate::common::{canonical_root, changes_within, init_tracing, next_change, with_timeout};

use std::error::Error;
use std::fs;
use std::time::Duration;

use tempfile::tempdir;

use devmon::Devmon;

type TestResult = Result<(), Box<dyn Error>>;

const DETECT_WITHIN: Duration = Duration::from_secs(3);
const QUIET_WINDOW: Duration = Duration::from_millis(600);

#[tokio::test]
async fn default_config_reports_a_new_go_file_once() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let root = canonical_root(dir.path());
    let mut devmon = Devmon::new(SettingsBuilder::new(&root).build());
    let mut rx = devmon.subscribe();
    let running = devmon.spawn().await?;

    fs::write(root.join("test.go"), "test")?;

    let change = next_change(&mut rx, DETECT_WITHIN)
        .await
        .ok_or("expected a change notification for test.go")?;
    assert_eq!(change.paths, vec![root.join("test.go")]);
    assert!(changes_within(&mut rx, QUIET_WINDOW).await.is_empty());

    with_timeout(running.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn custom_extension_list_filters_other_files() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let root = canonical_root(dir.path());
    let mut devmon = Devmon::new(SettingsBuilder::new(&root).include_exts(&["custom"]).build());
    let mut rx = devmon.subscribe();
    let running = devmon.spawn().await?;

    fs::write(root.join("test.go"), "test")?;
    assert!(changes_within(&mut rx, QUIET_WINDOW).await.is_empty());

    fs::write(root.join("test.custom"), "test")?;
    let change = next_change(&mut rx, DETECT_WITHIN)
        .await
        .ok_or("expected a change notification for test.custom")?;
    assert_eq!(change.paths, vec![root.join("test.custom")]);

    with_timeout(running.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn excluded_directory_is_ignored() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let root = canonical_root(dir.path());
    fs::create_dir(root.join("ignored"))?;

    let mut devmon = Devmon::new(
        SettingsBuilder::new(&root)
            .exclude_dirs(&["ignored"])
            .include_exts(&["go"])
            .build(),
    );
    let mut rx = devmon.subscribe();
    let running = devmon.spawn().await?;

    fs::write(root.join("ignored/test.go"), "test")?;
    assert!(changes_within(&mut rx, QUIET_WINDOW).await.is_empty());

    fs::write(root.join("test.go"), "test")?;
    let change = next_change(&mut rx, DETECT_WITHIN)
        .await
        .ok_or("expected a change notification for test.go")?;
    assert_eq!(change.paths, vec![root.join("test.go")]);

    with_timeout(running.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn rewriting_identical_content_is_silent() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let root = canonical_root(dir.path());
    fs::write(root.join("main.go"), "package main")?;

    let mut devmon = Devmon::new(SettingsBuilder::new(&root).build());
    let mut rx = devmon.subscribe();
    let running = devmon.spawn().await?;

    fs::write(root.join("main.go"), "package main")?;
    assert!(changes_within(&mut rx, QUIET_WINDOW).await.is_empty());

    fs::write(root.join("main.go"), "package main\n")?;
    let change = next_change(&mut rx, DETECT_WITHIN)
        .await
        .ok_or("expected a change notification for main.go")?;
    assert_eq!(change.paths, vec![root.join("main.go")]);

    with_timeout(running.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn directories_created_after_start_are_watched() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let root = canonical_root(dir.path());
    let mut devmon = Devmon::new(SettingsBuilder::new(&root).build());
    let mut rx = devmon.subscribe();
    let running = devmon.spawn().await?;

    fs::create_dir_all(root.join("pkg/inner"))?;
    fs::write(root.join("pkg/inner/inner.go"), "package inner")?;

    let change = next_change(&mut rx, DETECT_WITHIN)
        .await
        .ok_or("expected a change notification from the new directory")?;
    assert_eq!(change.paths, vec![root.join("pkg/inner/inner.go")]);

    // Give the new watch a batch to settle, then write again.
    tokio::time::sleep(Duration::from_millis(300)).await;
    fs::write(root.join("pkg/inner/inner.go"), "package inner // v2")?;
    let change = next_change(&mut rx, DETECT_WITHIN)
        .await
        .ok_or("expected a change notification for the rewritten file")?;
    assert_eq!(change.paths, vec![root.join("pkg/inner/inner.go")]);

    with_timeout(running.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn removed_directories_stay_silent() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let root = canonical_root(dir.path());
    fs::create_dir(root.join("gone"))?;
    fs::write(root.join("gone/a.go"), "package gone")?;

    let mut devmon = Devmon::new(SettingsBuilder::new(&root).build());
    let mut rx = devmon.subscribe();
    let running = devmon.spawn().await?;

    fs::remove_dir_all(root.join("gone"))?;
    assert!(changes_within(&mut rx, QUIET_WINDOW).await.is_empty());

    // The rest of the tree is still watched.
    fs::write(root.join("main.go"), "package main")?;
    assert!(next_change(&mut rx, DETECT_WITHIN).await.is_some());

    with_timeout(running.shutdown()).await;
    Ok(())
}
