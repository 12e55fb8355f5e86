//! Filters that take effect at the network request level: blocking,
//! allow/exception rules, CSP injection and scope-wide activations.

use memchr::memmem;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::{Request, ResourceType};

bitflags::bitflags! {
    /// Resource kinds a rule can select on with `$image`-style options.
    #[derive(Serialize, Deserialize)]
    pub struct ResourceTypes: u16 {
        const STYLESHEET = 1;
        const IMAGE = 1 << 1;
        const OBJECT = 1 << 2;
        const SCRIPT = 1 << 3;
        const XMLHTTPREQUEST = 1 << 4;
        const SUBDOCUMENT = 1 << 5;
        const FONT = 1 << 6;
        const MEDIA = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const WEBRTC = 1 << 9;
        const PING = 1 << 10;
        const WEBTRANSPORT = 1 << 11;
        const WEBBUNDLE = 1 << 12;
        const DOCUMENT = 1 << 13;
        const OTHER = 1 << 14;

        const ALL = (1 << 15) - 1;
    }
}

bitflags::bitflags! {
    /// Scope-wide switches a rule can toggle for a document and its
    /// descendants instead of (or in addition to) blocking resources.
    #[derive(Serialize, Deserialize)]
    pub struct ActivationTypes: u8 {
        const DOCUMENT = 1;
        const ELEMENT_HIDE = 1 << 1;
        const GENERIC_HIDE = 1 << 2;
        const GENERIC_BLOCK = 1 << 3;
        const POPUP = 1 << 4;
    }
}

impl Default for ActivationTypes {
    fn default() -> Self {
        ActivationTypes::empty()
    }
}

bitflags::bitflags! {
    #[derive(Serialize, Deserialize)]
    pub struct PartyTypes: u8 {
        const FIRST_PARTY = 1;
        const THIRD_PARTY = 1 << 1;

        const ALL = Self::FIRST_PARTY.bits | Self::THIRD_PARTY.bits;
    }
}

bitflags::bitflags! {
    #[derive(Serialize, Deserialize)]
    pub struct AnchorTypes: u8 {
        const START = 1;
        const END = 1 << 1;
        const HOST = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternType {
    Plain,
    Wildcarded,
    Regex,
}

/// Errors produced while parsing a single network rule line. `Error` and
/// `Unsupported` outcomes are both expressed here; [`FilterParseError::is_unsupported`]
/// separates the two for the per-source counters.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum FilterParseError {
    #[error("pattern carries no usable signal")]
    BarePattern,
    #[error("host anchor immediately followed by a separator")]
    AnchoredSeparator,
    #[error("unrecognised option")]
    UnrecognisedOption,
    #[error("invalid domain in domain option")]
    InvalidDomain,
    #[error("invalid host option value")]
    InvalidHost,
    #[error("host option specified more than once")]
    DuplicateHost,
    #[error("host option conflicts with a host-anchored pattern")]
    HostAnchorConflict,
    #[error("unsupported csp directive")]
    UnsupportedCspDirective,
    #[error("csp rule with resource type options")]
    CspWithResourceTypes,
    #[error("more than one redirect resource")]
    DuplicateRedirect,
    #[error("empty redirect resource")]
    EmptyRedirect,
    #[error("rewrite must name an abp-resource")]
    InvalidRewrite,
    #[error("negated match-case")]
    NegatedMatchCase,
    #[error("activation option requires an allow rule")]
    ActivationRequiresAllow,
    #[error("contradictory activation options")]
    ContradictoryActivations,
    #[error("punycode conversion failed")]
    PunycodeError,
}

impl FilterParseError {
    /// Unsupported rules are syntactically valid but deliberately not
    /// implemented; they are counted separately from malformed ones.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            FilterParseError::BarePattern | FilterParseError::AnchoredSeparator
        )
    }
}

/// One network-filtering rule, as parsed from a single list line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub pattern: String,
    /// Set when the indexable text differs from `pattern`: the lowercased
    /// copy for `$match-case` rules, the longest literal run for regex
    /// rules. Empty otherwise.
    pub ngram_search_string: String,
    pub pattern_type: PatternType,
    pub anchor_type: AnchorTypes,
    pub host: Option<String>,
    pub resource_types: ResourceTypes,
    pub activation_types: ActivationTypes,
    pub party: PartyTypes,
    pub included_domains: Vec<String>,
    pub excluded_domains: Vec<String>,
    pub is_allow_rule: bool,
    pub is_case_sensitive: bool,
    pub is_csp_rule: bool,
    pub csp: String,
    pub redirect: Option<String>,
}

impl Default for FilterRule {
    fn default() -> Self {
        FilterRule {
            pattern: String::new(),
            ngram_search_string: String::new(),
            pattern_type: PatternType::Plain,
            anchor_type: AnchorTypes::empty(),
            host: None,
            resource_types: ResourceTypes::empty(),
            activation_types: ActivationTypes::empty(),
            party: PartyTypes::empty(),
            included_domains: Vec::new(),
            excluded_domains: Vec::new(),
            is_allow_rule: false,
            is_case_sensitive: false,
            is_csp_rule: false,
            csp: String::new(),
            redirect: None,
        }
    }
}

/// Any option that appears on the right side of a rule after `$`. Bool
/// arguments are `true` for the plain option and `false` when negated with
/// a `~` prefix.
enum FilterOption {
    Resource(ResourceTypes, bool),
    Activation(ActivationTypes, bool),
    ThirdParty(bool),
    Domain(Vec<(bool, String)>),
    MatchCase,
    Csp(Option<String>),
    Redirect(String),
    Rewrite(String),
    Host(String),
}

fn parse_domain_entry(entry: &str) -> Result<String, FilterParseError> {
    if entry.is_empty() {
        return Err(FilterParseError::InvalidDomain);
    }
    match url::Host::parse(entry) {
        Ok(url::Host::Domain(domain)) => Ok(domain),
        _ => Err(FilterParseError::InvalidDomain),
    }
}

fn parse_filter_options(raw_options: &str) -> Result<Vec<FilterOption>, FilterParseError> {
    let mut result = vec![];

    for raw_option in raw_options.split(',') {
        if raw_option.is_empty() {
            continue;
        }
        let negation = raw_option.starts_with('~');
        let maybe_negated_option = raw_option.trim_start_matches('~');

        let mut option_and_values = maybe_negated_option.splitn(2, '=');
        let (option, value) = (
            option_and_values.next().unwrap_or_default(),
            option_and_values.next().unwrap_or_default(),
        );

        result.push(match (option, negation) {
            ("stylesheet", negated) => FilterOption::Resource(ResourceTypes::STYLESHEET, !negated),
            ("image", negated) => FilterOption::Resource(ResourceTypes::IMAGE, !negated),
            ("object", negated) | ("object-subrequest", negated) => {
                FilterOption::Resource(ResourceTypes::OBJECT, !negated)
            }
            ("script", negated) => FilterOption::Resource(ResourceTypes::SCRIPT, !negated),
            ("xmlhttprequest", negated) | ("xhr", negated) => {
                FilterOption::Resource(ResourceTypes::XMLHTTPREQUEST, !negated)
            }
            ("subdocument", negated) | ("frame", negated) => {
                FilterOption::Resource(ResourceTypes::SUBDOCUMENT, !negated)
            }
            ("font", negated) => FilterOption::Resource(ResourceTypes::FONT, !negated),
            ("media", negated) => FilterOption::Resource(ResourceTypes::MEDIA, !negated),
            ("websocket", negated) => FilterOption::Resource(ResourceTypes::WEBSOCKET, !negated),
            ("webrtc", negated) => FilterOption::Resource(ResourceTypes::WEBRTC, !negated),
            ("ping", negated) | ("beacon", negated) => {
                FilterOption::Resource(ResourceTypes::PING, !negated)
            }
            ("webtransport", negated) => {
                FilterOption::Resource(ResourceTypes::WEBTRANSPORT, !negated)
            }
            ("webbundle", negated) => FilterOption::Resource(ResourceTypes::WEBBUNDLE, !negated),
            ("other", negated) => FilterOption::Resource(ResourceTypes::OTHER, !negated),
            ("document", negated) | ("doc", negated) => {
                FilterOption::Activation(ActivationTypes::DOCUMENT, !negated)
            }
            ("popup", negated) => FilterOption::Activation(ActivationTypes::POPUP, !negated),
            ("elemhide", negated) => {
                FilterOption::Activation(ActivationTypes::ELEMENT_HIDE, !negated)
            }
            ("generichide", negated) | ("ghide", negated) => {
                FilterOption::Activation(ActivationTypes::GENERIC_HIDE, !negated)
            }
            ("genericblock", negated) => {
                FilterOption::Activation(ActivationTypes::GENERIC_BLOCK, !negated)
            }
            ("third-party", negated) | ("3p", negated) => FilterOption::ThirdParty(!negated),
            ("match-case", true) => return Err(FilterParseError::NegatedMatchCase),
            ("match-case", false) => FilterOption::MatchCase,
            ("domain", _) | ("from", _) => {
                let mut domains = Vec::new();
                for domain in value.split('|') {
                    if let Some(negated_domain) = domain.strip_prefix('~') {
                        domains.push((false, parse_domain_entry(negated_domain)?));
                    } else {
                        domains.push((true, parse_domain_entry(domain)?));
                    }
                }
                FilterOption::Domain(domains)
            }
            ("csp", _) => {
                if value.contains("report-uri") || value.contains("upgrade-insecure-requests") {
                    return Err(FilterParseError::UnsupportedCspDirective);
                }
                FilterOption::Csp(if value.is_empty() {
                    None
                } else {
                    Some(String::from(value))
                })
            }
            ("redirect", false) => {
                if value.is_empty() {
                    return Err(FilterParseError::EmptyRedirect);
                }
                FilterOption::Redirect(String::from(value))
            }
            ("rewrite", false) => match value.strip_prefix("abp-resource:") {
                Some(resource) if !resource.is_empty() => {
                    FilterOption::Rewrite(String::from(resource))
                }
                _ => return Err(FilterParseError::InvalidRewrite),
            },
            ("host", false) => match url::Host::parse(value) {
                Ok(url::Host::Domain(domain)) if !domain.is_empty() => FilterOption::Host(domain),
                _ => return Err(FilterParseError::InvalidHost),
            },
            (_, _) => return Err(FilterParseError::UnrecognisedOption),
        });
    }
    Ok(result)
}

/// Punycode-encodes the non-ASCII labels of a hostname fragment, keeping
/// empty labels (leading/trailing dots) intact.
fn punycode_fragment(fragment: &str) -> Result<String, FilterParseError> {
    if fragment.is_ascii() {
        return Ok(fragment.to_string());
    }
    let mut labels = Vec::new();
    for label in fragment.split('.') {
        if label.is_ascii() {
            labels.push(label.to_string());
        } else {
            labels.push(
                idna::domain_to_ascii(label).map_err(|_| FilterParseError::PunycodeError)?,
            );
        }
    }
    Ok(labels.join("."))
}

/// Extracts the longest run of literal characters from a regex body; used
/// as the indexable stand-in for patterns that cannot be scanned directly.
fn regex_literal_run(body: &str) -> String {
    let mut best = String::new();
    let mut current = String::new();
    let mut flush = |current: &mut String| {
        if current.len() > best.len() {
            std::mem::swap(&mut best, current);
        }
        current.clear();
    };

    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                // Escapes of punctuation stand for the literal character.
                Some(escaped) if !escaped.is_ascii_alphanumeric() => current.push(escaped),
                _ => flush(&mut current),
            },
            // Character classes and counted repetitions contribute nothing
            // literal; skip to their closing bracket.
            '[' => {
                flush(&mut current);
                let mut escaped = false;
                for c in chars.by_ref() {
                    match c {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        ']' => break,
                        _ => {}
                    }
                }
            }
            '{' => {
                flush(&mut current);
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                }
            }
            // A quantifier that can drop to zero repetitions makes the
            // preceding character non-guaranteed.
            '*' | '?' => {
                current.pop();
                flush(&mut current);
            }
            '(' | ')' | ']' | '}' | '|' | '+' | '^' | '$' | '.' => flush(&mut current),
            c => current.push(c),
        }
    }
    flush(&mut current);
    best
}

fn find_host_boundary(pattern: &str) -> usize {
    pattern
        .find(|c| c == '/' || c == '^' || c == '*')
        .unwrap_or(pattern.len())
}

impl FilterRule {
    /// Parses the body of one network rule line (comments and cosmetic rules
    /// are dispatched before this is reached).
    pub fn parse(line: &str) -> Result<FilterRule, FilterParseError> {
        let mut rule = FilterRule::default();

        let mut body = line;
        if let Some(rest) = body.strip_prefix("@@") {
            rule.is_allow_rule = true;
            body = rest;
        }

        let options = if let Some(parsed) = Self::parse_regex_body(body, &mut rule)? {
            parsed
        } else {
            Self::parse_plain_body(body, &mut rule)?
        };

        if let Some(options) = options {
            rule.apply_options(parse_filter_options(options)?)?;
        }

        // A one-character pattern with nothing else to narrow it down is too
        // ambiguous to act on.
        if rule.pattern_type == PatternType::Plain
            && rule.pattern.chars().count() == 1
            && rule.anchor_type.is_empty()
            && rule.host.is_none()
            && rule.resource_types.is_empty()
            && rule.activation_types.is_empty()
            && rule.party.is_empty()
            && !rule.is_csp_rule
        {
            return Err(FilterParseError::BarePattern);
        }

        if rule.pattern_type != PatternType::Regex {
            if rule.is_case_sensitive {
                rule.ngram_search_string = rule.pattern.to_lowercase();
            } else {
                rule.pattern = rule.pattern.to_lowercase();
            }
        }

        if rule.resource_types.is_empty()
            && rule.activation_types.is_empty()
            && !rule.is_csp_rule
        {
            rule.resource_types = ResourceTypes::ALL;
        }
        if rule.party.is_empty() {
            rule.party = PartyTypes::ALL;
        }

        Ok(rule)
    }

    /// Handles `/regex/` bodies, with an optional trailing `/$options`
    /// portion. Returns `None` when the body is not a regex rule.
    fn parse_regex_body<'a>(
        body: &'a str,
        rule: &mut FilterRule,
    ) -> Result<Option<Option<&'a str>>, FilterParseError> {
        if !body.starts_with('/') || body.len() < 2 {
            return Ok(None);
        }
        let (regex_body, options) = if let Some(split) = body.rfind("/$") {
            if split == 0 {
                return Ok(None);
            }
            (&body[1..split], Some(&body[split + 2..]))
        } else if body.ends_with('/') {
            (&body[1..body.len() - 1], None)
        } else {
            return Ok(None);
        };

        rule.pattern = regex_body.to_string();
        rule.pattern_type = PatternType::Regex;
        rule.ngram_search_string = regex_literal_run(regex_body).to_lowercase();
        Ok(Some(options))
    }

    /// Handles everything that is not a regex rule: anchors, wildcard
    /// normalization and host extraction.
    fn parse_plain_body<'a>(
        body: &'a str,
        rule: &mut FilterRule,
    ) -> Result<Option<&'a str>, FilterParseError> {
        let (mut pattern_str, options) = match body.rfind('$') {
            Some(index) => (&body[..index], Some(&body[index + 1..])),
            None => (body, None),
        };

        let had_host_anchor_prefix;
        if let Some(rest) = pattern_str.strip_prefix("||") {
            had_host_anchor_prefix = true;
            rule.anchor_type.insert(AnchorTypes::HOST);
            pattern_str = rest;
            if pattern_str.starts_with('^') {
                return Err(FilterParseError::AnchoredSeparator);
            }
        } else {
            had_host_anchor_prefix = false;
            if let Some(rest) = pattern_str.strip_prefix('|') {
                rule.anchor_type.insert(AnchorTypes::START);
                pattern_str = rest;
            }
        }
        if let Some(rest) = pattern_str.strip_suffix('|') {
            rule.anchor_type.insert(AnchorTypes::END);
            pattern_str = rest;
        }

        // Collapse runs of wildcards, then strip the redundant leading and
        // trailing ones. An anchor next to a stripped wildcard is
        // meaningless and is dropped with it.
        let mut pattern = String::with_capacity(pattern_str.len());
        let mut last_was_wildcard = false;
        for c in pattern_str.chars() {
            if c == '*' {
                if last_was_wildcard {
                    continue;
                }
                last_was_wildcard = true;
            } else {
                last_was_wildcard = false;
            }
            pattern.push(c);
        }
        if pattern.starts_with('*') {
            pattern.remove(0);
            rule.anchor_type.remove(AnchorTypes::START);
            rule.anchor_type.remove(AnchorTypes::HOST);
        }
        if pattern.ends_with('*') {
            pattern.pop();
            rule.anchor_type.remove(AnchorTypes::END);
        }

        if had_host_anchor_prefix {
            let boundary = find_host_boundary(&pattern);
            let host_part = punycode_fragment(&pattern[..boundary].to_lowercase())?;
            let remainder = &pattern[boundary..];
            let is_pure_host = remainder.is_empty() || remainder == "^";
            if rule.anchor_type.contains(AnchorTypes::HOST)
                && is_pure_host
                && !host_part.is_empty()
                && !host_part.starts_with('.')
                && !host_part.ends_with('.')
            {
                rule.host = Some(host_part.clone());
            }
            pattern = format!("{}{}", host_part, remainder);
        }

        if pattern.contains('*') {
            rule.pattern_type = PatternType::Wildcarded;
        }
        rule.pattern = pattern;
        Ok(options)
    }

    fn apply_options(&mut self, options: Vec<FilterOption>) -> Result<(), FilterParseError> {
        let mut positive_types = ResourceTypes::empty();
        let mut negative_types = ResourceTypes::empty();
        let mut saw_activation_token = false;
        let mut saw_host_option = false;

        for option in options {
            match option {
                FilterOption::Resource(flag, true) => positive_types.insert(flag),
                FilterOption::Resource(flag, false) => negative_types.insert(flag),
                FilterOption::Activation(flag, enabled) => {
                    // Activations are an ordered add/remove set: a later
                    // negation cancels an earlier positive.
                    saw_activation_token = true;
                    if enabled {
                        self.activation_types.insert(flag);
                    } else {
                        self.activation_types.remove(flag);
                    }
                }
                FilterOption::ThirdParty(true) => self.party.insert(PartyTypes::THIRD_PARTY),
                FilterOption::ThirdParty(false) => self.party.insert(PartyTypes::FIRST_PARTY),
                FilterOption::Domain(domains) => {
                    for (included, domain) in domains {
                        if included {
                            self.included_domains.push(domain);
                        } else {
                            self.excluded_domains.push(domain);
                        }
                    }
                }
                FilterOption::MatchCase => self.is_case_sensitive = true,
                FilterOption::Csp(directive) => {
                    self.is_csp_rule = true;
                    self.csp = directive.unwrap_or_default();
                }
                FilterOption::Redirect(resource) | FilterOption::Rewrite(resource) => {
                    if self.redirect.is_some() {
                        return Err(FilterParseError::DuplicateRedirect);
                    }
                    self.redirect = Some(resource);
                }
                FilterOption::Host(host) => {
                    if self.anchor_type.contains(AnchorTypes::HOST) {
                        return Err(FilterParseError::HostAnchorConflict);
                    }
                    if saw_host_option {
                        return Err(FilterParseError::DuplicateHost);
                    }
                    saw_host_option = true;
                    self.host = Some(host);
                }
            }
        }

        if saw_activation_token && self.activation_types.is_empty() {
            return Err(FilterParseError::ContradictoryActivations);
        }
        if self
            .activation_types
            .intersects(
                ActivationTypes::GENERIC_BLOCK
                    | ActivationTypes::GENERIC_HIDE
                    | ActivationTypes::ELEMENT_HIDE,
            )
            && !self.is_allow_rule
        {
            return Err(FilterParseError::ActivationRequiresAllow);
        }

        if self.is_csp_rule && !(positive_types.is_empty() && negative_types.is_empty()) {
            return Err(FilterParseError::CspWithResourceTypes);
        }

        // A positive always wins over its own negation, regardless of the
        // order the two were written in.
        if !negative_types.is_empty() {
            self.resource_types = (ResourceTypes::ALL - negative_types) | positive_types;
        } else {
            self.resource_types = positive_types;
        }

        Ok(())
    }

    /// The text n-grams are extracted from when indexing this rule. Always
    /// lowercase; URLs are lowercased for probing to match. Regex rules use
    /// their literal run (possibly empty, sending them to the fallback
    /// list) since a regex body cannot be scanned directly.
    pub fn ngram_source(&self) -> &str {
        if self.pattern_type == PatternType::Regex || self.is_case_sensitive {
            &self.ngram_search_string
        } else {
            &self.pattern
        }
    }

    /// Index/query ordering: allow rules outrank block rules, domain-scoped
    /// rules outrank generic ones.
    pub(crate) fn priority(&self) -> u8 {
        let mut priority = 0;
        if self.is_allow_rule {
            priority += 2;
        }
        if !self.included_domains.is_empty() {
            priority += 1;
        }
        priority
    }

    pub(crate) fn matches_resource_type(&self, resource_type: ResourceType) -> bool {
        self.resource_types.contains(resource_type.to_flag())
    }

    /// The hostname prefix a host-anchored pattern is anchored by.
    fn anchor_host_part(&self) -> &str {
        match &self.host {
            Some(host) => host,
            None => &self.pattern[..find_host_boundary(&self.pattern)],
        }
    }

    /// Full predicate check for one candidate rule against a request. The
    /// n-gram pre-filter is necessary but never sufficient; this is the
    /// authoritative test. `compiled` must be supplied for regex rules.
    pub fn matches(&self, request: &Request, compiled: Option<&CompiledRegex>) -> bool {
        check_options(self, request) && check_pattern(self, request, compiled)
    }
}

// ---------------------------------------------------------------------------
// Filter matching
// ---------------------------------------------------------------------------

/// A `/regex/` rule compiled for matching. Compilation happens once per
/// index load; a pattern the regex engine rejects simply never matches.
#[derive(Debug, Clone)]
pub enum CompiledRegex {
    Compiled(regex::Regex),
    Error,
}

impl CompiledRegex {
    pub fn compile(rule: &FilterRule) -> CompiledRegex {
        match regex::RegexBuilder::new(&rule.pattern)
            .case_insensitive(!rule.is_case_sensitive)
            .build()
        {
            Ok(re) => CompiledRegex::Compiled(re),
            Err(_) => CompiledRegex::Error,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            CompiledRegex::Compiled(re) => re.is_match(text),
            CompiledRegex::Error => false,
        }
    }
}

/// In filter patterns `^` stands for any URL separator: anything that is
/// not alphanumeric or one of `_`, `-`, `.`, `%`.
#[inline]
fn is_separator_char(b: u8) -> bool {
    !(b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.' || b == b'%')
}

/// Matches `pattern[p..]` against `url[u..]`, interpreting `*` as any run
/// of characters and `^` as a separator or the end of the URL.
fn match_here(pattern: &[u8], url: &[u8], p: usize, u: usize, anchor_end: bool) -> bool {
    if p == pattern.len() {
        return !anchor_end || u == url.len();
    }
    match pattern[p] {
        b'*' => (u..=url.len()).any(|next| match_here(pattern, url, p + 1, next, anchor_end)),
        b'^' => {
            if u == url.len() {
                // The separator may match the end of the URL, after which
                // only wildcards can remain.
                return pattern[p + 1..].iter().all(|&c| c == b'*');
            }
            is_separator_char(url[u]) && match_here(pattern, url, p + 1, u + 1, anchor_end)
        }
        c => u < url.len() && url[u] == c && match_here(pattern, url, p + 1, u + 1, anchor_end),
    }
}

fn match_at(pattern: &str, url: &str, position: usize, anchor_end: bool) -> bool {
    match_here(pattern.as_bytes(), url.as_bytes(), 0, position, anchor_end)
}

fn match_anywhere(pattern: &str, url: &str, anchor_end: bool) -> bool {
    (0..=url.len()).any(|position| match_at(pattern, url, position, anchor_end))
}

/// Checks whether a host-anchored filter's hostname fragment lines up with
/// the request hostname on label boundaries.
fn is_anchored_by_hostname(filter_hostname: &str, hostname: &str) -> bool {
    let filter_hostname_len = filter_hostname.len();
    if filter_hostname_len == 0 {
        return true;
    }
    let hostname_len = hostname.len();

    if filter_hostname_len > hostname_len {
        false
    } else if filter_hostname_len == hostname_len {
        filter_hostname == hostname
    } else if let Some(match_index) =
        memmem::find(hostname.as_bytes(), filter_hostname.as_bytes())
    {
        if match_index == 0 {
            // Prefix match must cover whole labels, e.g. (foo, foo.com) or
            // (always.bad.subdomain., always.bad.subdomain.evil).
            filter_hostname.ends_with('.') || hostname[filter_hostname_len..].starts_with('.')
        } else if match_index == hostname_len - filter_hostname_len {
            // Suffix match, e.g. (foo.com, sub.foo.com).
            filter_hostname.starts_with('.') || hostname[match_index - 1..].starts_with('.')
        } else {
            // Infix match needs label boundaries on both sides.
            (filter_hostname.ends_with('.') || hostname[filter_hostname_len..].starts_with('.'))
                && (filter_hostname.starts_with('.')
                    || hostname[match_index - 1..].starts_with('.'))
        }
    } else {
        false
    }
}

// pattern, no anchors
fn check_pattern_plain_filter(rule: &FilterRule, request: &Request) -> bool {
    let url = request.get_url(rule.is_case_sensitive);
    memmem::find(url.as_bytes(), rule.pattern.as_bytes()).is_some()
}

// |pattern
fn check_pattern_left_anchor_filter(rule: &FilterRule, request: &Request) -> bool {
    request
        .get_url(rule.is_case_sensitive)
        .starts_with(&rule.pattern)
}

// pattern|
fn check_pattern_right_anchor_filter(rule: &FilterRule, request: &Request) -> bool {
    request
        .get_url(rule.is_case_sensitive)
        .ends_with(&rule.pattern)
}

// |pattern|
fn check_pattern_left_right_anchor_filter(rule: &FilterRule, request: &Request) -> bool {
    request.get_url(rule.is_case_sensitive) == rule.pattern
}

// ||pattern, possibly with wildcards or separators in the remainder
fn check_pattern_hostname_anchor_filter(rule: &FilterRule, request: &Request) -> bool {
    let host_part = rule.anchor_host_part();
    if !is_anchored_by_hostname(host_part, &request.hostname) {
        return false;
    }
    let url = request.get_url(rule.is_case_sensitive);
    // The pattern embeds the hostname fragment; match it where the fragment
    // occurs in the URL so the remainder lines up right after the host.
    match memmem::find(url.as_bytes(), host_part.as_bytes()) {
        Some(start) => match_at(
            &rule.pattern,
            url,
            start,
            rule.anchor_type.contains(AnchorTypes::END),
        ),
        None => false,
    }
}

fn check_pattern(rule: &FilterRule, request: &Request, compiled: Option<&CompiledRegex>) -> bool {
    if rule.pattern_type == PatternType::Regex {
        return match compiled {
            Some(re) => re.is_match(&request.url),
            None => false,
        };
    }
    if rule.anchor_type.contains(AnchorTypes::HOST) {
        return check_pattern_hostname_anchor_filter(rule, request);
    }

    let needs_scan = rule.pattern_type == PatternType::Wildcarded || rule.pattern.contains('^');
    let anchor_start = rule.anchor_type.contains(AnchorTypes::START);
    let anchor_end = rule.anchor_type.contains(AnchorTypes::END);
    if needs_scan {
        let url = request.get_url(rule.is_case_sensitive);
        if anchor_start {
            match_at(&rule.pattern, url, 0, anchor_end)
        } else {
            match_anywhere(&rule.pattern, url, anchor_end)
        }
    } else if anchor_start && anchor_end {
        check_pattern_left_right_anchor_filter(rule, request)
    } else if anchor_start {
        check_pattern_left_anchor_filter(rule, request)
    } else if anchor_end {
        check_pattern_right_anchor_filter(rule, request)
    } else {
        check_pattern_plain_filter(rule, request)
    }
}

fn check_options(rule: &FilterRule, request: &Request) -> bool {
    let request_party = if request.is_third_party {
        PartyTypes::THIRD_PARTY
    } else {
        PartyTypes::FIRST_PARTY
    };
    if !rule.party.contains(request_party) {
        return false;
    }

    // `$host=` restricts by request hostname without anchoring the pattern.
    if !rule.anchor_type.contains(AnchorTypes::HOST) {
        if let Some(host) = &rule.host {
            if !crate::utils::host_matches_domain(&request.hostname, host) {
                return false;
            }
        }
    }

    // Domain options constrain the document origin; requests without a known
    // origin are not constrained by them.
    if !request.source_hostname.is_empty() {
        if !rule.included_domains.is_empty()
            && !rule
                .included_domains
                .iter()
                .any(|d| crate::utils::host_matches_domain(&request.source_hostname, d))
        {
            return false;
        }
        if rule
            .excluded_domains
            .iter()
            .any(|d| crate::utils::host_matches_domain(&request.source_hostname, d))
        {
            return false;
        }
    }

    true
}

#[cfg(test)]
#[path = "../../tests/unit/filters/network.rs"]
mod unit_tests;
