use super::*;

use std::time::Duration;

#[test]
fn nothing_parsed() {
    let result = ParseResult::default();
    assert_eq!(result.metadata, crate::sources::ListMetadata::default());
    assert!(result.filter_rules.is_empty());
    assert!(result.cosmetic_rules.is_empty());
}

#[test]
fn metadata_directives() {
    let mut result = ParseResult::default();
    let mut parser = RuleParser::new(&mut result);

    assert_eq!(
        parser.parse("! Homepage: https://vivaldi.com"),
        ParseOutcome::Metadata
    );
    assert_eq!(parser.parse("! Title: Test filter"), ParseOutcome::Metadata);
    assert_eq!(
        parser.parse("! Licence: http://www.wtfpl.net/"),
        ParseOutcome::Metadata
    );
    // Unrecognized keys stay comments.
    assert_eq!(
        parser.parse("! Last modified: 2019-10-08 15:54"),
        ParseOutcome::Comment
    );
    assert_eq!(parser.parse("! Expires: 2 days"), ParseOutcome::Metadata);
    assert_eq!(parser.parse("! Version: 13"), ParseOutcome::Metadata);
    assert_eq!(parser.parse("! Some other comment"), ParseOutcome::Comment);

    assert_eq!(
        result.metadata.homepage.as_deref(),
        Some("https://vivaldi.com/")
    );
    assert_eq!(
        result.metadata.license.as_deref(),
        Some("http://www.wtfpl.net/")
    );
    assert_eq!(result.metadata.title.as_deref(), Some("Test filter"));
    assert_eq!(result.metadata.version, 13);
    assert_eq!(
        result.metadata.expires,
        Some(Duration::from_secs(2 * 24 * 60 * 60))
    );
    assert!(result.filter_rules.is_empty());
}

#[test]
fn later_metadata_wins() {
    let result = parse_filter_list("! Version: 1\n! Version: 7\n");
    assert_eq!(result.metadata.version, 7);
}

#[test]
fn malformed_metadata_values_stay_comments() {
    let mut result = ParseResult::default();
    let mut parser = RuleParser::new(&mut result);
    assert_eq!(parser.parse("! Expires: soon"), ParseOutcome::Comment);
    assert_eq!(parser.parse("! Version: twelve"), ParseOutcome::Comment);
    assert_eq!(parser.parse("! Homepage: not a url"), ParseOutcome::Comment);
    assert_eq!(result.metadata, crate::sources::ListMetadata::default());
}

#[test]
fn line_classification() {
    let mut result = ParseResult::default();
    let mut parser = RuleParser::new(&mut result);

    assert_eq!(parser.parse(""), ParseOutcome::Comment);
    assert_eq!(parser.parse("[Adblock Plus 2.0]"), ParseOutcome::Comment);
    assert_eq!(parser.parse("badword"), ParseOutcome::FilterRule);
    assert_eq!(parser.parse("##.ad-banner"), ParseOutcome::CosmeticRule);
    assert_eq!(parser.parse("x"), ParseOutcome::Unsupported);
    assert_eq!(parser.parse("||^nonsense"), ParseOutcome::Unsupported);
    assert_eq!(
        parser.parse("bad-resource$domain=inv/alid"),
        ParseOutcome::Error
    );
    assert_eq!(parser.parse("example.com#?#.ad"), ParseOutcome::Unsupported);
    assert_eq!(parser.parse("example.com$$script[src]"), ParseOutcome::Unsupported);

    assert_eq!(result.rules_info.valid_rules, 2);
    assert_eq!(result.rules_info.unsupported_rules, 4);
    assert_eq!(result.rules_info.invalid_rules, 1);
    assert_eq!(result.filter_rules.len(), 1);
    assert_eq!(result.cosmetic_rules.len(), 1);
}

#[test]
fn errors_do_not_abort_the_list() {
    let list = "\
badword
bad-resource$domain=wrong]
tracker.jpg$image
contradictory-activations$popup,~popup
##.ad
";
    let result = parse_filter_list(list);
    assert_eq!(result.filter_rules.len(), 2);
    assert_eq!(result.cosmetic_rules.len(), 1);
    assert_eq!(result.rules_info.invalid_rules, 2);
}

#[test]
fn rule_order_mirrors_input_order() {
    let result = parse_filter_list("first\nsecond\nthird\n");
    let patterns: Vec<&str> = result
        .filter_rules
        .iter()
        .map(|r| r.pattern.as_str())
        .collect();
    assert_eq!(patterns, vec!["first", "second", "third"]);
}

#[test]
fn parsing_is_chunking_independent() {
    let list = "\
! Title: Chunked
badword
tracker.jpg$image
example.com##.ad
@@allowed$document
";
    let all_at_once = parse_filter_list(list);

    let mut incremental = ParseResult::default();
    {
        let mut parser = RuleParser::new(&mut incremental);
        for line in list.lines() {
            parser.parse(line);
        }
    }
    assert_eq!(all_at_once, incremental);

    // Parsing the same cumulative input twice produces the same rules.
    let again = parse_filter_list(list);
    assert_eq!(all_at_once, again);
}

#[test]
fn whitespace_is_trimmed() {
    let result = parse_filter_list("   badword   \n");
    assert_eq!(result.filter_rules[0].pattern, "badword");
}
