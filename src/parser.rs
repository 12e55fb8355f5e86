//! Line-oriented parser for Adblock-Plus-compatible filter lists.
//!
//! Each line yields one of six outcomes; rules accumulate into a shared
//! [`ParseResult`] in input order, along with per-source counters and the
//! list metadata read from `!`-comment directives.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::filters::cosmetic::{self, CosmeticRule};
use crate::filters::network::FilterRule;
use crate::sources::{ListMetadata, RulesInfo};

/// Classification of a single parsed line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    Comment,
    Metadata,
    FilterRule,
    CosmeticRule,
    Unsupported,
    Error,
}

/// Accumulated output of parsing one list. Rule order mirrors input order;
/// metadata keys are last-writer-wins.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParseResult {
    pub metadata: ListMetadata,
    pub filter_rules: Vec<FilterRule>,
    pub cosmetic_rules: Vec<CosmeticRule>,
    pub rules_info: RulesInfo,
}

pub struct RuleParser<'a> {
    result: &'a mut ParseResult,
}

static METADATA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!\s*([A-Za-z][A-Za-z ]*?)\s*:\s*(.*?)\s*$").unwrap());
static EXPIRES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s*days?$").unwrap());

impl<'a> RuleParser<'a> {
    pub fn new(result: &'a mut ParseResult) -> Self {
        RuleParser { result }
    }

    /// Parses one line, updating the shared result. Errors and unsupported
    /// rules only affect that line; the rest of the list parses normally.
    pub fn parse(&mut self, line: &str) -> ParseOutcome {
        let line = line.trim();
        if line.is_empty() {
            return ParseOutcome::Comment;
        }
        if line.starts_with('!') {
            return self.parse_comment(line);
        }
        // `[Adblock Plus 2.0]`-style headers.
        if line.starts_with('[') && line.ends_with(']') {
            return ParseOutcome::Comment;
        }
        // AdGuard HTML filtering rules.
        if line.contains("$$") {
            self.result.rules_info.unsupported_rules += 1;
            return ParseOutcome::Unsupported;
        }

        match cosmetic::find_separator(line) {
            Ok(Some(_)) => return self.parse_cosmetic(line),
            Ok(None) => {}
            Err(_) => {
                self.result.rules_info.unsupported_rules += 1;
                return ParseOutcome::Unsupported;
            }
        }

        match FilterRule::parse(line) {
            Ok(rule) => {
                self.result.rules_info.valid_rules += 1;
                self.result.filter_rules.push(rule);
                ParseOutcome::FilterRule
            }
            Err(e) if e.is_unsupported() => {
                self.result.rules_info.unsupported_rules += 1;
                ParseOutcome::Unsupported
            }
            Err(_) => {
                self.result.rules_info.invalid_rules += 1;
                ParseOutcome::Error
            }
        }
    }

    fn parse_cosmetic(&mut self, line: &str) -> ParseOutcome {
        match CosmeticRule::parse(line) {
            Ok(rule) => {
                self.result.rules_info.valid_rules += 1;
                self.result.cosmetic_rules.push(rule);
                ParseOutcome::CosmeticRule
            }
            Err(e) if e.is_unsupported() => {
                self.result.rules_info.unsupported_rules += 1;
                ParseOutcome::Unsupported
            }
            Err(_) => {
                self.result.rules_info.invalid_rules += 1;
                ParseOutcome::Error
            }
        }
    }

    /// Recognized metadata directives become [`ParseOutcome::Metadata`];
    /// anything else stays a plain comment.
    fn parse_comment(&mut self, line: &str) -> ParseOutcome {
        let captures = match METADATA_RE.captures(line) {
            Some(c) => c,
            None => return ParseOutcome::Comment,
        };
        let key = &captures[1];
        let value = &captures[2];
        let metadata = &mut self.result.metadata;

        match key {
            "Homepage" => match url::Url::parse(value) {
                Ok(u) => metadata.homepage = Some(u.to_string()),
                Err(_) => return ParseOutcome::Comment,
            },
            "Title" => metadata.title = Some(value.to_string()),
            "Licence" | "License" => match url::Url::parse(value) {
                Ok(u) => metadata.license = Some(u.to_string()),
                Err(_) => return ParseOutcome::Comment,
            },
            "Redirect" => match url::Url::parse(value) {
                Ok(u) => metadata.redirect = Some(u.to_string()),
                Err(_) => return ParseOutcome::Comment,
            },
            "Expires" => match EXPIRES_RE
                .captures(value)
                .and_then(|c| c[1].parse::<u64>().ok())
            {
                Some(days) => metadata.expires = Some(Duration::from_secs(days * 24 * 60 * 60)),
                None => return ParseOutcome::Comment,
            },
            "Version" => match value.parse::<u64>() {
                Ok(version) => metadata.version = version,
                Err(_) => return ParseOutcome::Comment,
            },
            _ => return ParseOutcome::Comment,
        }
        ParseOutcome::Metadata
    }
}

/// Parses a whole list in one pass.
pub fn parse_filter_list(text: &str) -> ParseResult {
    let mut result = ParseResult::default();
    let mut parser = RuleParser::new(&mut result);
    for line in text.lines() {
        parser.parse(line);
    }
    result
}

#[cfg(test)]
#[path = "../tests/unit/parser.rs"]
mod unit_tests;
