//! Selector-based rules that act on page content after load: element hiding
//! (`##`), hiding exceptions (`#@#`) and scriptlet injection (`##+js(…)`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum CosmeticParseError {
    #[error("not a cosmetic rule")]
    NotCosmetic,
    #[error("unsupported cosmetic rule variant")]
    UnsupportedVariant,
    #[error("empty selector")]
    EmptySelector,
    #[error("invalid domain prefix")]
    InvalidDomain,
}

impl CosmeticParseError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CosmeticParseError::UnsupportedVariant)
    }
}

/// One cosmetic rule. A rule with neither included nor excluded domains is
/// generic and applies everywhere unless excepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosmeticRule {
    /// CSS selector, or the scriptlet name and arguments for `+js(…)` rules.
    pub selector: String,
    pub domains_included: Option<Vec<String>>,
    pub domains_excluded: Option<Vec<String>>,
    pub is_allow_rule: bool,
    pub is_script_inject: bool,
}

/// Locates the `##`/`#@#` separator of a cosmetic line, if any. AdGuard
/// variants (`#?#`, `#$#`, `#%#` and their `#@…#` forms) are recognized but
/// unsupported.
pub(crate) fn find_separator(line: &str) -> Result<Option<(usize, usize, bool)>, CosmeticParseError> {
    let sharp_index = match line.find('#') {
        Some(i) => i,
        None => return Ok(None),
    };
    let after_sharp = &line[sharp_index + 1..];
    if let Some(rest) = after_sharp.strip_prefix('@') {
        if rest.starts_with('#') {
            return Ok(Some((sharp_index, sharp_index + 3, true)));
        }
        if rest.starts_with("$#") || rest.starts_with("%#") || rest.starts_with("?#") {
            return Err(CosmeticParseError::UnsupportedVariant);
        }
    } else {
        if after_sharp.starts_with('#') {
            return Ok(Some((sharp_index, sharp_index + 2, false)));
        }
        if after_sharp.starts_with("$#") || after_sharp.starts_with("%#") || after_sharp.starts_with("?#") {
            return Err(CosmeticParseError::UnsupportedVariant);
        }
    }
    Ok(None)
}

fn parse_domain_prefix(
    prefix: &str,
) -> Result<(Option<Vec<String>>, Option<Vec<String>>), CosmeticParseError> {
    let mut included = Vec::new();
    let mut excluded = Vec::new();

    for part in prefix.split(',') {
        let (negated, domain) = match part.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, part),
        };
        let normalized = match url::Host::parse(domain) {
            Ok(url::Host::Domain(d)) if !d.is_empty() => d,
            _ => return Err(CosmeticParseError::InvalidDomain),
        };
        if negated {
            excluded.push(normalized);
        } else {
            included.push(normalized);
        }
    }

    let to_option = |v: Vec<String>| if v.is_empty() { None } else { Some(v) };
    Ok((to_option(included), to_option(excluded)))
}

impl CosmeticRule {
    /// Parses one cosmetic rule line. Returns `NotCosmetic` when the line
    /// carries no `##`-family separator, so the caller can fall through to
    /// the network-rule parser.
    pub fn parse(line: &str) -> Result<CosmeticRule, CosmeticParseError> {
        let (sharp_index, selector_start, is_allow_rule) =
            find_separator(line)?.ok_or(CosmeticParseError::NotCosmetic)?;

        let (domains_included, domains_excluded) = if sharp_index > 0 {
            parse_domain_prefix(&line[..sharp_index])?
        } else {
            (None, None)
        };

        let raw_selector = line[selector_start..].trim();
        if raw_selector.is_empty() {
            return Err(CosmeticParseError::EmptySelector);
        }

        let (selector, is_script_inject) = match raw_selector
            .strip_prefix("+js(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            Some(inner) => (inner.trim().to_string(), true),
            None => {
                if raw_selector.starts_with("+js(") {
                    return Err(CosmeticParseError::UnsupportedVariant);
                }
                (raw_selector.to_string(), false)
            }
        };
        if selector.is_empty() {
            return Err(CosmeticParseError::EmptySelector);
        }

        Ok(CosmeticRule {
            selector,
            domains_included,
            domains_excluded,
            is_allow_rule,
            is_script_inject,
        })
    }

    /// A rule with no included domains applies everywhere (exclusions can
    /// still carve domains out of it).
    pub fn is_generic(&self) -> bool {
        self.domains_included.is_none()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/filters/cosmetic.rs"]
mod unit_tests;
