//! Per-group index lifecycle: building, persisting, loading and the atomic
//! swap that lets in-flight queries keep their snapshot while a rebuild
//! replaces the active index.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use log::{debug, warn};

use crate::index::builder::{build_and_save_index, build_index, IndexWriteError};
use crate::index::matcher::RulesIndex;
use crate::index::SourceRules;
use crate::sources::RuleGroup;

/// What to do when a persisted index cannot be trusted. The default is to
/// fail open: the group behaves as if empty until a rebuild completes,
/// since a missing filter costs less than a broken page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorruptIndexPolicy {
    /// Drop the index and request a rebuild.
    FailOpen,
    /// Surface the load error to the caller instead.
    FailClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexLoadError {
    #[error("failed to read index file")]
    Io(#[from] std::io::Error),
    #[error("index file rejected")]
    Invalid(#[from] crate::data_format::DeserializationError),
}

/// Result of [`RulesIndexManager::load`]: whether an index is now being
/// served and whether the caller should schedule a rebuild.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    NeedsRebuild,
}

/// Owns the active [`RulesIndex`] of one rule group.
///
/// Readers obtain an `Arc` snapshot and are never invalidated by a
/// concurrent rebuild; the swap is atomic from their perspective. Building
/// and file I/O are expected to run off any latency-sensitive path.
pub struct RulesIndexManager {
    group: RuleGroup,
    index_path: Option<PathBuf>,
    policy: CorruptIndexPolicy,
    index: RwLock<Option<Arc<RulesIndex>>>,
}

impl RulesIndexManager {
    pub fn new(group: RuleGroup, index_path: Option<PathBuf>) -> Self {
        RulesIndexManager {
            group,
            index_path,
            policy: CorruptIndexPolicy::FailOpen,
            index: RwLock::new(None),
        }
    }

    pub fn with_policy(mut self, policy: CorruptIndexPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn group(&self) -> RuleGroup {
        self.group
    }

    /// The currently active index, if any. The returned handle stays valid
    /// across rebuilds.
    pub fn rules_index(&self) -> Option<Arc<RulesIndex>> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap_in(&self, index: RulesIndex) {
        let mut active = self
            .index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *active = Some(Arc::new(index));
    }

    /// Loads the persisted index from `index_path`. A corrupt or unreadable
    /// file leaves the group empty and asks for a rebuild under the
    /// fail-open policy.
    pub fn load(&self) -> Result<LoadOutcome, IndexLoadError> {
        let path = match &self.index_path {
            Some(path) => path,
            None => return Ok(LoadOutcome::NeedsRebuild),
        };

        let attempt = std::fs::read(path)
            .map_err(IndexLoadError::from)
            .and_then(|bytes| {
                crate::data_format::deserialize_index(&bytes).map_err(IndexLoadError::from)
            });

        match attempt {
            Ok(data) => {
                self.swap_in(RulesIndex::new(data));
                Ok(LoadOutcome::Loaded)
            }
            Err(error) => match self.policy {
                CorruptIndexPolicy::FailOpen => {
                    warn!(
                        "discarding rules index for {:?}, rebuild required: {}",
                        self.group, error
                    );
                    Ok(LoadOutcome::NeedsRebuild)
                }
                CorruptIndexPolicy::FailClosed => Err(error),
            },
        }
    }

    /// True when the active index matches the given per-source checksums;
    /// false also when no index is loaded.
    pub fn is_up_to_date<'a>(
        &self,
        current: impl ExactSizeIterator<Item = (u32, &'a str)>,
    ) -> bool {
        match self.rules_index() {
            Some(index) => index.is_up_to_date(current),
            None => false,
        }
    }

    /// Rebuilds the index from freshly parsed sources and swaps it in. With
    /// an index path configured, the new index is persisted first and the
    /// previous one stays active if the write fails.
    pub fn rebuild(
        &self,
        rule_buffers: BTreeMap<u32, SourceRules>,
    ) -> Result<(), IndexWriteError> {
        let index = match &self.index_path {
            Some(path) => {
                let (index, checksum) = build_and_save_index(rule_buffers, path)?;
                debug!(
                    "saved rules index for {:?} to {} (checksum {})",
                    self.group,
                    path.display(),
                    checksum
                );
                index
            }
            None => build_index(rule_buffers),
        };

        self.swap_in(RulesIndex::new(index));
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/engine.rs"]
mod unit_tests;
