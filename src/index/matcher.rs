//! Query-time access to a built index. A [`RulesIndex`] is immutable: the
//! only mutation after construction is the atomic handle swap performed by
//! the engine, so any number of requests can probe it concurrently.

use std::collections::{HashMap, HashSet};

use crate::filters::cosmetic::CosmeticRule;
use crate::filters::network::{
    ActivationTypes, CompiledRegex, FilterRule, PatternType,
};
use crate::index::{build_stylesheet, CosmeticTreeNode, RuleId, RulesIndexData, RulesMap, NO_CHILDREN};
use crate::request::Request;
use crate::utils::{self, Hash};

/// Activation masks aggregated over every rule matching a frame, split by
/// rule polarity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivationsFound {
    pub in_allow_rules: ActivationTypes,
    pub in_block_rules: ActivationTypes,
}

impl ActivationsFound {
    pub fn merge(&mut self, other: ActivationsFound) {
        self.in_allow_rules |= other.in_allow_rules;
        self.in_block_rules |= other.in_block_rules;
    }
}

/// A scriptlet injection requested for a document: resource name plus its
/// arguments, still unexpanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptletInjection {
    pub scriptlet: String,
    pub arguments: Vec<String>,
}

/// Cosmetic payload computed for one document origin.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InjectionData {
    pub stylesheet: String,
    pub scriptlet_injections: Vec<ScriptletInjection>,
}

/// The queryable form of [`RulesIndexData`]. Regex rules are compiled once
/// here so the request path never mutates shared state.
pub struct RulesIndex {
    data: RulesIndexData,
    regexes: HashMap<RuleId, CompiledRegex>,
}

impl RulesIndex {
    pub fn new(data: RulesIndexData) -> RulesIndex {
        let mut regexes = HashMap::new();
        for (&source_id, source) in &data.sources {
            for (rule_nr, rule) in source.filter_rules.iter().enumerate() {
                if rule.pattern_type == PatternType::Regex {
                    let rule_id = RuleId {
                        source_id,
                        rule_nr: rule_nr as u32,
                    };
                    regexes.insert(rule_id, CompiledRegex::compile(rule));
                }
            }
        }
        RulesIndex { data, regexes }
    }

    pub fn data(&self) -> &RulesIndexData {
        &self.data
    }

    /// True when the index was built from exactly the given set of source
    /// checksums; used to detect stale caches without re-parsing lists.
    pub fn is_up_to_date<'a>(
        &self,
        current: impl ExactSizeIterator<Item = (u32, &'a str)>,
    ) -> bool {
        if current.len() != self.data.sources.len() {
            return false;
        }
        current.into_iter().all(|(id, checksum)| {
            self.data
                .sources
                .get(&id)
                .map(|source| source.checksum == checksum)
                .unwrap_or(false)
        })
    }

    fn rule(&self, rule_id: RuleId) -> Option<&FilterRule> {
        self.data
            .sources
            .get(&rule_id.source_id)?
            .filter_rules
            .get(rule_id.rule_nr as usize)
    }

    fn cosmetic_rule(&self, rule_id: RuleId) -> Option<&CosmeticRule> {
        self.data
            .sources
            .get(&rule_id.source_id)?
            .cosmetic_rules
            .get(rule_id.rule_nr as usize)
    }

    /// Runs `visit` over every bucket the request's n-grams select, plus the
    /// fallback list, each at most once.
    fn probe_buckets<'a>(
        &'a self,
        map: &'a RulesMap,
        request: &Request,
        mut visit: impl FnMut(&'a [RuleId]),
    ) {
        if !map.ngram_map.is_empty() {
            let mut probed: HashSet<Hash> = HashSet::new();
            utils::each_ngram(&request.url_lower_cased, |ngram| {
                if probed.insert(ngram) {
                    if let Some(bucket) = map.ngram_map.get(&ngram) {
                        visit(bucket);
                    }
                }
            });
        }
        if !map.fallback.is_empty() {
            visit(&map.fallback);
        }
    }

    /// Returns the best matching rule in the map, if any: highest priority
    /// first, insertion order breaking ties. The n-gram probe is only a
    /// pre-filter; every candidate is checked against the full predicates.
    fn best_match<'a>(
        &'a self,
        map: &'a RulesMap,
        request: &Request,
        accept: impl Fn(&FilterRule) -> bool,
    ) -> Option<&'a FilterRule> {
        let mut best: Option<(u8, RuleId, &FilterRule)> = None;
        self.probe_buckets(map, request, |bucket| {
            for &rule_id in bucket {
                let rule = match self.rule(rule_id) {
                    Some(rule) => rule,
                    None => continue,
                };
                if !accept(rule) || !rule.matches(request, self.regexes.get(&rule_id)) {
                    continue;
                }
                // Buckets are sorted, so the first hit is this bucket's best.
                let candidate = (rule.priority(), rule_id, rule);
                match best {
                    Some((priority, id, _))
                        if (priority, std::cmp::Reverse(id))
                            >= (candidate.0, std::cmp::Reverse(candidate.1)) => {}
                    _ => best = Some(candidate),
                }
                break;
            }
        });
        best.map(|(_, _, rule)| rule)
    }

    /// Visits every matching rule in the map; used where each match carries
    /// its own information (activations, CSP directives).
    fn for_each_match<'a>(
        &'a self,
        map: &'a RulesMap,
        request: &Request,
        accept: impl Fn(&FilterRule) -> bool,
        mut found: impl FnMut(&'a FilterRule),
    ) {
        self.probe_buckets(map, request, |bucket| {
            for &rule_id in bucket {
                if let Some(rule) = self.rule(rule_id) {
                    if accept(rule) && rule.matches(request, self.regexes.get(&rule_id)) {
                        found(rule);
                    }
                }
            }
        });
    }

    /// Aggregates the activation rules matching one frame's document
    /// request.
    pub fn find_matching_activations(&self, request: &Request) -> ActivationsFound {
        let mut activations = ActivationsFound::default();
        self.for_each_match(
            &self.data.activation_rules,
            request,
            |rule| !rule.activation_types.is_empty(),
            |rule| {
                if rule.is_allow_rule {
                    activations.in_allow_rules |= rule.activation_types;
                } else {
                    activations.in_block_rules |= rule.activation_types;
                }
            },
        );
        activations
    }

    /// Allow-activations inherited from ancestor frames: an allow activation
    /// on a parent silences its children, so only allow bits propagate.
    pub fn activations_for_frame_chain<'a>(
        &self,
        ancestors: impl Iterator<Item = &'a Request>,
    ) -> ActivationsFound {
        let mut inherited = ActivationsFound::default();
        for ancestor in ancestors {
            inherited.in_allow_rules |= self.find_matching_activations(ancestor).in_allow_rules;
        }
        inherited
    }

    /// Finds the authoritative rule for a resource load, if any. The caller
    /// decides between block/allow/redirect from the returned rule. With
    /// `only_specific` (a GENERIC_BLOCK allow activation is in effect),
    /// generic rules are skipped.
    pub fn find_matching_before_request_rule(
        &self,
        request: &Request,
        only_specific: bool,
    ) -> Option<&FilterRule> {
        self.best_match(&self.data.before_request_rules, request, |rule| {
            rule.matches_resource_type(request.resource_type)
                && (!only_specific || !rule.included_domains.is_empty())
        })
    }

    /// Collects the CSP directives to inject for a document response. An
    /// allow rule with no directive lifts all CSP injection for the
    /// document; otherwise allow rules cancel their specific directive.
    pub fn get_csp_directives(&self, request: &Request) -> Option<String> {
        let mut directives: Vec<&str> = Vec::new();
        let mut exceptions: Vec<&str> = Vec::new();
        let mut allow_all = false;
        self.for_each_match(
            &self.data.headers_received_rules,
            request,
            |rule| rule.is_csp_rule,
            |rule| {
                if rule.is_allow_rule {
                    if rule.csp.is_empty() {
                        allow_all = true;
                    } else {
                        exceptions.push(&rule.csp);
                    }
                } else if !rule.csp.is_empty() {
                    directives.push(&rule.csp);
                }
            },
        );
        if allow_all {
            return None;
        }
        directives.retain(|directive| !exceptions.contains(directive));
        directives.sort_unstable();
        directives.dedup();
        if directives.is_empty() {
            None
        } else {
            Some(directives.join(", "))
        }
    }

    fn node(&self, index: u32) -> Option<&CosmeticTreeNode> {
        self.data.cosmetic_tree.get(index as usize)
    }

    /// Walks the tree along the reversed labels of `origin_host`, resolving
    /// each selector to its most specific rule: a deeper node overrides an
    /// ancestor for the same selector. Root (generic) contributions are
    /// skipped when `skip_generic` is set.
    fn collect_cosmetic_rules(
        &self,
        origin_host: &str,
        skip_generic: bool,
    ) -> HashMap<&str, (bool, &CosmeticRule)> {
        let mut collected: HashMap<&str, (bool, &CosmeticRule)> = HashMap::new();
        fn visit<'a>(
            this: &'a RulesIndex,
            node: &CosmeticTreeNode,
            collected: &mut HashMap<&'a str, (bool, &'a CosmeticRule)>,
        ) {
            for &(rule_id, allow) in &node.rules {
                if let Some(rule) = this.cosmetic_rule(rule_id) {
                    // Nodes are visited root-first, so a later write is
                    // always the more specific one.
                    collected.insert(&rule.selector, (allow, rule));
                }
            }
        }

        let mut node = match self.node(self.data.cosmetic_tree_root) {
            Some(root) => root,
            None => return collected,
        };
        if !skip_generic {
            visit(self, node, &mut collected);
        }

        for label in origin_host.split('.').rev().filter(|l| !l.is_empty()) {
            if node.first_child == NO_CHILDREN {
                break;
            }
            match node
                .subdomains
                .binary_search_by(|subdomain| subdomain.as_str().cmp(label))
            {
                Ok(position) => {
                    node = match self.node(node.first_child + position as u32) {
                        Some(child) => child,
                        None => break,
                    };
                    visit(self, node, &mut collected);
                }
                Err(_) => break,
            }
        }
        collected
    }

    /// The stylesheet hiding generic selectors; applies to every document
    /// unless a GENERIC_HIDE activation excludes it.
    pub fn get_default_stylesheet(&self) -> &str {
        &self.data.default_stylesheet
    }

    /// Stylesheet of the selectors hidden specifically for this origin.
    pub fn get_stylesheet_for_origin(&self, origin_host: &str, skip_generic: bool) -> String {
        let collected = self.collect_cosmetic_rules(origin_host, skip_generic);
        let mut selectors: Vec<&str> = collected
            .iter()
            .filter(|(_, (allow, rule))| !*allow && !rule.is_script_inject)
            .map(|(&selector, _)| selector)
            .collect();
        selectors.sort_unstable();
        build_stylesheet(selectors.into_iter())
    }

    /// Full cosmetic payload for one origin: stylesheet plus the scriptlet
    /// injections that survive allow precedence.
    pub fn get_injection_data_for_origin(
        &self,
        origin_host: &str,
        skip_generic: bool,
    ) -> InjectionData {
        let collected = self.collect_cosmetic_rules(origin_host, skip_generic);

        let mut selectors: Vec<&str> = Vec::new();
        let mut scriptlet_injections: Vec<ScriptletInjection> = Vec::new();
        for (selector, (allow, rule)) in &collected {
            if *allow {
                continue;
            }
            if rule.is_script_inject {
                let mut arguments = rule.selector.split(',').map(|a| a.trim().to_string());
                let scriptlet = arguments.next().unwrap_or_default();
                if !scriptlet.is_empty() {
                    scriptlet_injections.push(ScriptletInjection {
                        scriptlet,
                        arguments: arguments.collect(),
                    });
                }
            } else {
                selectors.push(*selector);
            }
        }
        selectors.sort_unstable();
        scriptlet_injections.sort_by(|a, b| a.scriptlet.cmp(&b.scriptlet));

        InjectionData {
            stylesheet: build_stylesheet(selectors.into_iter()),
            scriptlet_injections,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/index/matcher.rs"]
mod unit_tests;
