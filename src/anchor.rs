//! Freshness anchors: external content whose last-modified time bounds how
//! long a cached translation stays valid.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[async_trait]
pub trait FreshnessAnchor: std::fmt::Debug + Send + Sync {
    /// Last modification time in Unix seconds, or `None` if it cannot be
    /// determined (the content is gone or unreadable).
    async fn last_modified(&self) -> Option<i64>;
}

/// Anchor with a timestamp supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAnchor(pub i64);

#[async_trait]
impl FreshnessAnchor for FixedAnchor {
    async fn last_modified(&self) -> Option<i64> {
        Some(self.0)
    }
}

/// Anchor backed by a content file; its mtime is the freshness bound.
#[derive(Debug, Clone)]
pub struct FileAnchor {
    path: PathBuf,
}

impl FileAnchor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Build an anchor for `relative` under `root`, refusing paths that could
    /// escape the content root.
    pub fn within(root: &Path, relative: &str) -> Option<Self> {
        let relative = Path::new(relative);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || relative.as_os_str().is_empty() {
            return None;
        }
        Some(Self::new(root.join(relative)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FreshnessAnchor for FileAnchor {
    async fn last_modified(&self) -> Option<i64> {
        match tokio::fs::metadata(&self.path).await.and_then(|m| m.modified()) {
            Ok(modified) => Some(DateTime::<Utc>::from(modified).timestamp()),
            Err(e) => {
                debug!("Anchor {} has no mtime: {}", self.path.display(), e);
                None
            }
        }
    }
}
