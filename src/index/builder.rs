//! Batch construction of a rule group's index from all of its parsed
//! sources. Runs off the query path; the output is immutable.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use log::debug;

use crate::filters::cosmetic::CosmeticRule;
use crate::filters::network::FilterRule;
use crate::index::{
    build_stylesheet, CosmeticTreeNode, RuleId, RulesIndexData, RulesMap, SourceRules,
    NO_CHILDREN,
};
use crate::utils::{self, Hash};

/// Transient builder state for one of the three request-stage maps: buckets
/// keyed by n-gram, rules carried with their priority until the final sort.
#[derive(Default)]
struct IndexBuildData {
    map: BTreeMap<Hash, Vec<(RuleId, u8)>>,
    fallback: Vec<(RuleId, u8)>,
}

impl IndexBuildData {
    /// Picks the candidate n-gram whose bucket currently holds the fewest
    /// rules (first-seen wins ties) and inserts the rule there; rules with
    /// no candidate go to the fallback list. Keeping buckets balanced is
    /// what bounds query cost by bucket size rather than rule count.
    fn add_rule(&mut self, rule: &FilterRule, rule_id: RuleId) {
        let mut best_ngram = None;
        let mut min_bucket_size = usize::MAX;
        for ngram in utils::ngrams(rule.ngram_source()) {
            let bucket_size = self.map.get(&ngram).map_or(0, Vec::len);
            if bucket_size < min_bucket_size {
                min_bucket_size = bucket_size;
                best_ngram = Some(ngram);
                if bucket_size == 0 {
                    break;
                }
            }
        }

        let entry = (rule_id, rule.priority());
        match best_ngram {
            Some(ngram) => self.map.entry(ngram).or_default().push(entry),
            None => self.fallback.push(entry),
        }
    }

    /// Orders every bucket by priority descending; the stable sort preserves
    /// source/rule insertion order between equal priorities, which is what
    /// lets the matcher stop at the first hit.
    fn into_rules_map(mut self) -> RulesMap {
        let by_priority =
            |a: &(RuleId, u8), b: &(RuleId, u8)| b.1.cmp(&a.1);

        let mut ngram_map = std::collections::HashMap::with_capacity(self.map.len());
        for (ngram, mut bucket) in self.map {
            bucket.sort_by(by_priority);
            ngram_map.insert(ngram, bucket.into_iter().map(|(id, _)| id).collect());
        }
        self.fallback.sort_by(by_priority);
        RulesMap {
            ngram_map,
            fallback: self.fallback.into_iter().map(|(id, _)| id).collect(),
        }
    }
}

/// Mutable cosmetic rule tree used during construction; flattened into the
/// index-only array form before serialization.
#[derive(Default)]
struct CosmeticTreeBuildNode {
    rules_from_selectors: BTreeMap<String, (RuleId, bool)>,
    subdomains: BTreeMap<String, CosmeticTreeBuildNode>,
}

impl CosmeticTreeBuildNode {
    /// Same-selector precedence within a node: allow beats block, otherwise
    /// the first write wins.
    fn add_rule(&mut self, selector: &str, rule_id: RuleId, allow: bool) {
        if let Some(&(_, existing_allow)) = self.rules_from_selectors.get(selector) {
            if existing_allow || !allow {
                return;
            }
        }
        self.rules_from_selectors
            .insert(selector.to_string(), (rule_id, allow));
    }

    fn add_rule_at_domain(&mut self, domain: &str, selector: &str, rule_id: RuleId, allow: bool) {
        let mut node = self;
        for label in domain.split('.').rev().filter(|l| !l.is_empty()) {
            node = node.subdomains.entry(label.to_string()).or_default();
        }
        node.add_rule(selector, rule_id, allow);
    }
}

/// Inserts one cosmetic rule at every tree node it affects. A domain
/// exclusion on a block rule acts as an allow rule on that domain, and vice
/// versa.
fn add_rule_to_cosmetic_tree(root: &mut CosmeticTreeBuildNode, rule: &CosmeticRule, rule_id: RuleId) {
    if rule.domains_included.is_none() {
        root.add_rule(&rule.selector, rule_id, rule.is_allow_rule);
    }

    if let Some(excluded) = &rule.domains_excluded {
        for domain in excluded {
            root.add_rule_at_domain(domain, &rule.selector, rule_id, !rule.is_allow_rule);
        }
    }

    if let Some(included) = &rule.domains_included {
        for domain in included {
            root.add_rule_at_domain(domain, &rule.selector, rule_id, rule.is_allow_rule);
        }
    }
}

fn flatten_node(node: &CosmeticTreeBuildNode, first_child: u32) -> CosmeticTreeNode {
    CosmeticTreeNode {
        rules: node.rules_from_selectors.values().copied().collect(),
        first_child,
        subdomains: node.subdomains.keys().cloned().collect(),
    }
}

/// Emits `node`'s descendants into `tree`, children after grandchildren, so
/// every node can refer to its children as one contiguous run. Returns the
/// index of `node`'s first child.
fn flatten_descendants(tree: &mut Vec<CosmeticTreeNode>, node: &CosmeticTreeBuildNode) -> u32 {
    let mut first_child_of: Vec<u32> = Vec::with_capacity(node.subdomains.len());
    for child in node.subdomains.values() {
        if child.subdomains.is_empty() {
            first_child_of.push(NO_CHILDREN);
        } else {
            first_child_of.push(flatten_descendants(tree, child));
        }
    }

    let first_child_index = tree.len() as u32;
    for (child, &first_child) in node.subdomains.values().zip(&first_child_of) {
        tree.push(flatten_node(child, first_child));
    }
    first_child_index
}

fn flatten_cosmetic_tree(root: &CosmeticTreeBuildNode) -> (Vec<CosmeticTreeNode>, u32) {
    let mut tree = Vec::new();
    let first_child = if root.subdomains.is_empty() {
        NO_CHILDREN
    } else {
        flatten_descendants(&mut tree, root)
    };
    let root_index = tree.len() as u32;
    tree.push(flatten_node(root, first_child));
    (tree, root_index)
}

/// Builds the index for one rule group from the parsed buffers of all its
/// sources. Pure; all I/O lives in [`build_and_save_index`].
pub fn build_index(rule_buffers: BTreeMap<u32, SourceRules>) -> RulesIndexData {
    let mut activation_rules = IndexBuildData::default();
    let mut before_request = IndexBuildData::default();
    let mut headers_received = IndexBuildData::default();

    // Generic cosmetic block rules not cancelled by any other rule on any
    // domain end up in the default stylesheet instead of the tree.
    let mut default_cosmetic_block: BTreeMap<String, RuleId> = BTreeMap::new();
    // Selectors that are potentially unblocked somewhere; generic blocks for
    // these go straight to the tree.
    let mut cosmetic_allow_selectors: BTreeSet<String> = BTreeSet::new();
    let mut cosmetic_tree_root = CosmeticTreeBuildNode::default();

    for (&source_id, buffer) in &rule_buffers {
        for (rule_nr, rule) in buffer.filter_rules.iter().enumerate() {
            let rule_id = RuleId {
                source_id,
                rule_nr: rule_nr as u32,
            };

            if !rule.activation_types.is_empty() {
                activation_rules.add_rule(rule, rule_id);
            }
            if !rule.resource_types.is_empty() {
                before_request.add_rule(rule, rule_id);
            }
            if rule.is_csp_rule {
                headers_received.add_rule(rule, rule_id);
            }
        }

        for (rule_nr, rule) in buffer.cosmetic_rules.iter().enumerate() {
            let rule_id = RuleId {
                source_id,
                rule_nr: rule_nr as u32,
            };

            if rule.is_allow_rule || rule.domains_excluded.is_some() {
                // This selector now has exceptions. If a generic block for
                // it was pending as a default, promote that block into the
                // tree so the exception can take effect per-domain.
                if let Some(pending_id) = default_cosmetic_block.remove(&rule.selector) {
                    let pending_rule = &rule_buffers[&pending_id.source_id].cosmetic_rules
                        [pending_id.rule_nr as usize];
                    add_rule_to_cosmetic_tree(&mut cosmetic_tree_root, pending_rule, pending_id);
                }
                cosmetic_allow_selectors.insert(rule.selector.clone());
            } else if rule.is_generic()
                && !rule.is_script_inject
                && !cosmetic_allow_selectors.contains(&rule.selector)
            {
                default_cosmetic_block
                    .entry(rule.selector.clone())
                    .or_insert(rule_id);
                continue;
            }

            add_rule_to_cosmetic_tree(&mut cosmetic_tree_root, rule, rule_id);
        }
    }

    let default_stylesheet =
        build_stylesheet(default_cosmetic_block.keys().map(String::as_str));
    let (cosmetic_tree, cosmetic_tree_root) = flatten_cosmetic_tree(&cosmetic_tree_root);

    let index = RulesIndexData {
        sources: rule_buffers,
        activation_rules: activation_rules.into_rules_map(),
        before_request_rules: before_request.into_rules_map(),
        headers_received_rules: headers_received.into_rules_map(),
        default_stylesheet,
        cosmetic_tree,
        cosmetic_tree_root,
    };
    debug!(
        "built rules index: {} before-request, {} activation, {} csp, {} cosmetic tree nodes",
        index.before_request_rules.len(),
        index.activation_rules.len(),
        index.headers_received_rules.len(),
        index.cosmetic_tree.len(),
    );
    index
}

/// Errors from writing the serialized index to storage. The caller keeps
/// serving the previous index when this fails.
#[derive(Debug, thiserror::Error)]
pub enum IndexWriteError {
    #[error("failed to serialize index")]
    Serialization(#[from] crate::data_format::SerializationError),
    #[error("failed to write index file")]
    Io(#[from] std::io::Error),
}

/// Builds the group's index, serializes it and writes it to `index_path`.
/// Returns the checksum of the written payload on success.
pub fn build_and_save_index(
    rule_buffers: BTreeMap<u32, SourceRules>,
    index_path: &Path,
) -> Result<(RulesIndexData, String), IndexWriteError> {
    let index = build_index(rule_buffers);
    let serialized = crate::data_format::serialize_index(&index)?;

    let mut output = std::fs::File::create(index_path)?;
    output.write_all(&serialized.bytes)?;
    output.flush()?;

    Ok((index, serialized.checksum))
}

#[cfg(test)]
#[path = "../../tests/unit/index/builder.rs"]
mod unit_tests;
