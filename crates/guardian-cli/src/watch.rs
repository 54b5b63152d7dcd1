//! Reload the running proxy when a user list changes on disk.
//!
//! `guardian edit` only rewrites the file; a running `guardian run` notices
//! the new size or modification time on its next poll and reloads.

use crate::blocklist::Blocklists;
use guardian::Category;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tracing::debug;

/// How often the user lists are checked for changes.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    mtime_nanos: u128,
    size: u64,
}

fn stamp(path: &Path) -> Option<Stamp> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime_nanos = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos());
    Some(Stamp {
        mtime_nanos,
        size: meta.len(),
    })
}

/// Tracks the metadata of both user lists.
#[derive(Debug)]
pub struct UserListWatcher {
    files: Vec<(PathBuf, Option<Stamp>)>,
}

impl UserListWatcher {
    #[must_use]
    pub fn new(lists: &Blocklists) -> Self {
        let files = [Category::Blacklist, Category::Whitelist]
            .into_iter()
            .map(|category| {
                let path = lists.path_for(category);
                let current = stamp(&path);
                (path, current)
            })
            .collect();
        Self { files }
    }

    /// Whether any user list changed since the previous call.
    pub fn changed(&mut self) -> bool {
        let mut changed = false;
        for (path, last) in &mut self.files {
            let current = stamp(path);
            if current != *last {
                debug!("{} changed on disk", path.display());
                *last = current;
                changed = true;
            }
        }
        changed
    }
}

/// Call `reload` after each poll that sees a changed user list. Never returns.
pub async fn reload_on_change(mut watcher: UserListWatcher, period: Duration, reload: impl Fn()) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        if watcher.changed() {
            reload();
        }
    }
}
