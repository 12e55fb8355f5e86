//! Bookkeeping for the filter lists feeding the engine: which group a list
//! belongs to, where it came from, and what the last fetch/parse produced.
//!
//! Fetch scheduling itself lives with the embedder; this module only models
//! the state it needs to persist per source.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::utils::fast_hash;

/// The two independently toggleable filtering categories. Each group gets
/// its own index, built from its own set of rule sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleGroup {
    Tracking,
    AdBlocking,
}

impl RuleGroup {
    pub const ALL: [RuleGroup; 2] = [RuleGroup::Tracking, RuleGroup::AdBlocking];
}

/// Outcome of the most recent attempt at fetching a source's list text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchResult {
    Success,
    DownloadFailed,
    FileNotFound,
    FileReadError,
    FileUnsupported,
    FailedSavingParsedRules,
    Unknown,
}

/// Per-source counters maintained while parsing a list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesInfo {
    pub valid_rules: u32,
    pub unsupported_rules: u32,
    pub invalid_rules: u32,
}

/// Metadata read from `!`-comment directives at the top of a list. Pulled
/// directly from the list text with minimal validation; later occurrences of
/// the same key overwrite earlier ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListMetadata {
    pub homepage: Option<String>,
    pub title: Option<String>,
    pub expires: Option<Duration>,
    pub license: Option<String>,
    pub redirect: Option<String>,
    pub version: u64,
}

/// Where a rule list comes from. Exactly one of URL or file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Url(String),
    File(PathBuf),
}

/// Identity of one filter list within a rule group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleSourceBase {
    pub source: SourceKind,
    pub group: RuleGroup,
    /// Stable id derived from the source identity; used to key rule buffers
    /// and the per-source checksums inside the index.
    pub id: u32,
}

impl RuleSourceBase {
    pub fn from_url(url: &str, group: RuleGroup) -> Self {
        Self {
            source: SourceKind::Url(url.to_string()),
            group,
            id: source_id(url),
        }
    }

    pub fn from_file(path: PathBuf, group: RuleGroup) -> Self {
        let id = source_id(&path.to_string_lossy());
        Self {
            source: SourceKind::File(path),
            group,
            id,
        }
    }
}

fn source_id(identity: &str) -> u32 {
    // Truncation keeps ids compact in the serialized index; collisions across
    // a handful of configured lists are not a practical concern.
    (fast_hash(identity) & 0xffff_ffff) as u32
}

/// A rule source plus its mutable fetch and parse state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleSource {
    pub base: RuleSourceBase,
    pub rules_list_checksum: String,
    /// Read from the list itself; treat as untrusted input.
    pub unsafe_adblock_metadata: ListMetadata,
    pub last_update: Option<SystemTime>,
    pub next_fetch: Option<SystemTime>,
    pub is_fetching: bool,
    pub last_fetch_result: FetchResult,
    pub rules_info: RulesInfo,
}

impl RuleSource {
    pub fn new(base: RuleSourceBase) -> Self {
        Self {
            base,
            rules_list_checksum: String::new(),
            unsafe_adblock_metadata: ListMetadata::default(),
            last_update: None,
            next_fetch: None,
            is_fetching: false,
            last_fetch_result: FetchResult::Unknown,
            rules_info: RulesInfo::default(),
        }
    }
}
