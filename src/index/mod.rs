//! The compiled rule index: built in batch from all sources of a rule
//! group, persisted as one versioned artifact, then served read-only.

pub mod builder;
pub mod matcher;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::filters::cosmetic::CosmeticRule;
use crate::filters::network::FilterRule;
use crate::parser::ParseResult;
use crate::utils::Hash;

/// Identifies one rule within one source's parsed buffer. Doubles as the
/// insertion-order tie-breaker for equal-priority rules.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RuleId {
    pub source_id: u32,
    pub rule_nr: u32,
}

/// N-gram bucket map plus the fallback list for rules with no extractable
/// n-gram. Buckets are kept sorted by priority descending (stable), so the
/// first post-filter match in a bucket is that bucket's best.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesMap {
    pub(crate) ngram_map: HashMap<Hash, Vec<RuleId>>,
    pub(crate) fallback: Vec<RuleId>,
}

impl RulesMap {
    pub fn is_empty(&self) -> bool {
        self.ngram_map.is_empty() && self.fallback.is_empty()
    }

    /// Every rule lands in exactly one bucket; total size equals the number
    /// of rules inserted.
    pub fn len(&self) -> usize {
        self.ngram_map.values().map(Vec::len).sum::<usize>() + self.fallback.len()
    }
}

/// One node of the flattened cosmetic rule tree. A node's children occupy a
/// contiguous run starting at `first_child`, in the order of the sorted
/// `subdomains` label table, so traversal needs indices only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosmeticTreeNode {
    /// (rule, allow-for-domain) pairs attached to this node, at most one per
    /// selector.
    pub(crate) rules: Vec<(RuleId, bool)>,
    pub(crate) first_child: u32,
    pub(crate) subdomains: Vec<String>,
}

pub(crate) const NO_CHILDREN: u32 = u32::MAX;

/// The parsed rules of one source, embedded in the index so the artifact is
/// self-contained, along with the checksum of the list text they came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRules {
    pub checksum: String,
    pub filter_rules: Vec<FilterRule>,
    pub cosmetic_rules: Vec<CosmeticRule>,
}

impl SourceRules {
    pub fn new(checksum: String, parsed: ParseResult) -> Self {
        SourceRules {
            checksum,
            filter_rules: parsed.filter_rules,
            cosmetic_rules: parsed.cosmetic_rules,
        }
    }
}

/// The serialized form of a rule group's index. Immutable once built;
/// [`matcher::RulesIndex`] wraps it for querying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesIndexData {
    pub sources: BTreeMap<u32, SourceRules>,
    pub activation_rules: RulesMap,
    pub before_request_rules: RulesMap,
    pub headers_received_rules: RulesMap,
    pub default_stylesheet: String,
    pub cosmetic_tree: Vec<CosmeticTreeNode>,
    pub cosmetic_tree_root: u32,
}

impl RulesIndexData {
    pub fn source_checksums(&self) -> impl Iterator<Item = (u32, &str)> {
        self.sources
            .iter()
            .map(|(&id, rules)| (id, rules.checksum.as_str()))
    }
}

/// Joins hiding selectors into one stylesheet block.
pub(crate) fn build_stylesheet<'a>(selectors: impl Iterator<Item = &'a str>) -> String {
    let joined = itertools::join(selectors, ", ");
    if joined.is_empty() {
        String::new()
    } else {
        format!("{} {{display: none !important;}}\n", joined)
    }
}
