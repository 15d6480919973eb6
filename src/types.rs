// src/types.rs

//! Small shared value types.

use std::fmt;
use std::path::PathBuf;

/// Lifecycle of the user's program as driven by the reloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadState {
    #[default]
    Idle,
    Building,
    Running,
    Killing,
}

impl fmt::Display for ReloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReloadState::Idle => "idle",
            ReloadState::Building => "building",
            ReloadState::Running => "running",
            ReloadState::Killing => "killing",
        };
        f.write_str(s)
    }
}

/// One notification per evaluated batch.
///
/// `changed` is false when the batch touched files but none of them had
/// different content; `paths` then is empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeNotification {
    pub changed: bool,
    pub paths: Vec<PathBuf>,
}

impl ChangeNotification {
    pub fn changed(paths: Vec<PathBuf>) -> Self {
        Self {
            changed: true,
            paths,
        }
    }

    pub fn unchanged() -> Self {
        Self::default()
    }
}
