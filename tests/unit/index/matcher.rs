use super::*;

use std::collections::BTreeMap;

use crate::index::builder::build_index;
use crate::index::SourceRules;
use crate::parser::parse_filter_list;
use crate::request::ResourceType;
use crate::utils;

fn index_from(list: &str) -> RulesIndex {
    let mut buffers = BTreeMap::new();
    buffers.insert(
        1,
        SourceRules::new(
            utils::buffer_checksum(list.as_bytes()),
            parse_filter_list(list),
        ),
    );
    RulesIndex::new(build_index(buffers))
}

fn request(url: &str, source: &str, resource_type: ResourceType) -> Request {
    Request::new(url, source, resource_type).expect("request should parse")
}

fn is_blocked(index: &RulesIndex, request: &Request) -> bool {
    index
        .find_matching_before_request_rule(request, false)
        .map(|rule| !rule.is_allow_rule)
        .unwrap_or(false)
}

#[test]
fn build_then_query_round_trip() {
    let index = index_from(
        "\
||ads.example.com^
tracker.jpg$image
banner$domain=news.example
ads
",
    );

    assert!(is_blocked(
        &index,
        &request("https://ads.example.com/x.png", "https://news.example/", ResourceType::Image)
    ));
    assert!(is_blocked(
        &index,
        &request("https://cdn.example/tracker.jpg", "https://news.example/", ResourceType::Image)
    ));
    // Same URL, wrong resource type.
    assert!(!is_blocked(
        &index,
        &request("https://cdn.example/tracker.jpg", "https://news.example/", ResourceType::Script)
    ));
    assert!(is_blocked(
        &index,
        &request("https://cdn.example/banner.png", "https://news.example/", ResourceType::Image)
    ));
    // Domain-scoped rule does not fire elsewhere.
    assert!(!is_blocked(
        &index,
        &request("https://cdn.example/banner.png", "https://other.example/", ResourceType::Image)
    ));
    // Fallback-list rule (pattern shorter than an n-gram) still matches.
    assert!(is_blocked(
        &index,
        &request("https://cdn.example/ads/img.png", "https://news.example/", ResourceType::Image)
    ));
    assert!(!is_blocked(
        &index,
        &request("https://clean.example/img.png", "https://news.example/", ResourceType::Image)
    ));
}

#[test]
fn allow_rule_outranks_block_rule() {
    let index = index_from(
        "\
||ads.example.com^
@@||ads.example.com/acceptable$image
",
    );
    let blocked = request(
        "https://ads.example.com/banner.png",
        "https://news.example/",
        ResourceType::Image,
    );
    let allowed = request(
        "https://ads.example.com/acceptable/x.png",
        "https://news.example/",
        ResourceType::Image,
    );

    assert!(is_blocked(&index, &blocked));
    let rule = index
        .find_matching_before_request_rule(&allowed, false)
        .expect("allow rule should match");
    assert!(rule.is_allow_rule);
}

#[test]
fn only_specific_skips_generic_rules() {
    let index = index_from(
        "\
||ads.example.com^
banner$domain=news.example
",
    );
    let generic_hit = request(
        "https://ads.example.com/x.png",
        "https://news.example/",
        ResourceType::Image,
    );
    let specific_hit = request(
        "https://cdn.example/banner.png",
        "https://news.example/",
        ResourceType::Image,
    );

    assert!(index
        .find_matching_before_request_rule(&generic_hit, true)
        .is_none());
    assert!(index
        .find_matching_before_request_rule(&specific_hit, true)
        .is_some());
}

#[test]
fn regex_rules_match_after_compilation() {
    let index = index_from("/(evil|bad)-tracker/\n");
    assert!(is_blocked(
        &index,
        &request("https://cdn.example/evil-tracker", "https://news.example/", ResourceType::Image)
    ));
    assert!(!is_blocked(
        &index,
        &request("https://cdn.example/nice-tracker", "https://news.example/", ResourceType::Image)
    ));
}

#[test]
fn activations_aggregate_by_polarity() {
    let index = index_from(
        "\
@@||trusted.example^$document,generichide
||popups.example^$popup
",
    );

    let trusted = request(
        "https://trusted.example/page",
        "https://trusted.example/",
        ResourceType::Document,
    );
    let found = index.find_matching_activations(&trusted);
    assert_eq!(
        found.in_allow_rules,
        ActivationTypes::DOCUMENT | ActivationTypes::GENERIC_HIDE
    );
    assert_eq!(found.in_block_rules, ActivationTypes::empty());

    let popup = request(
        "https://popups.example/win",
        "https://popups.example/",
        ResourceType::Document,
    );
    let found = index.find_matching_activations(&popup);
    assert_eq!(found.in_block_rules, ActivationTypes::POPUP);
    assert_eq!(found.in_allow_rules, ActivationTypes::empty());
}

#[test]
fn ancestor_allow_activations_are_inherited() {
    let index = index_from("@@||trusted.example^$document\n");
    let parent = request(
        "https://trusted.example/outer",
        "https://trusted.example/",
        ResourceType::Document,
    );
    let inherited = index.activations_for_frame_chain([parent].iter());
    assert!(inherited.in_allow_rules.contains(ActivationTypes::DOCUMENT));
    assert_eq!(inherited.in_block_rules, ActivationTypes::empty());
}

#[test]
fn csp_directives_are_collected_and_excepted() {
    let index = index_from(
        "\
||csp.example^$csp=script-src 'none'
||csp.example^$csp=worker-src 'none'
@@||csp.example/safe$csp=worker-src 'none'
@@||csp.example/trusted$csp
",
    );

    let page = request(
        "https://csp.example/page",
        "https://csp.example/",
        ResourceType::Document,
    );
    assert_eq!(
        index.get_csp_directives(&page).as_deref(),
        Some("script-src 'none', worker-src 'none'")
    );

    // A matching exception removes its directive.
    let safe = request(
        "https://csp.example/safe/page",
        "https://csp.example/",
        ResourceType::Document,
    );
    assert_eq!(
        index.get_csp_directives(&safe).as_deref(),
        Some("script-src 'none'")
    );

    // A bare exception lifts everything.
    let trusted = request(
        "https://csp.example/trusted/page",
        "https://csp.example/",
        ResourceType::Document,
    );
    assert_eq!(index.get_csp_directives(&trusted), None);
}

const COSMETIC_LIST: &str = "\
##.generic-ad
##.excepted-ad
example.com#@#.excepted-ad
~optout.example##.everywhere-but
example.com##.site-ad
sub.example.com##.sub-ad
example.com##+js(noop, first-arg)
";

#[test]
fn cosmetic_selectors_union_over_ancestors() {
    let index = index_from(COSMETIC_LIST);

    assert!(index.get_default_stylesheet().contains(".generic-ad"));
    assert!(!index.get_default_stylesheet().contains(".excepted-ad"));

    let stylesheet = index.get_stylesheet_for_origin("sub.example.com", false);
    assert!(stylesheet.contains(".site-ad"), "ancestor selector missing");
    assert!(stylesheet.contains(".sub-ad"));
    assert!(stylesheet.contains(".everywhere-but"));
    assert!(
        !stylesheet.contains(".excepted-ad"),
        "deeper allow should shadow the root block"
    );

    let stylesheet = index.get_stylesheet_for_origin("example.com", false);
    assert!(stylesheet.contains(".site-ad"));
    assert!(!stylesheet.contains(".sub-ad"));

    let stylesheet = index.get_stylesheet_for_origin("other.example", false);
    assert!(stylesheet.contains(".excepted-ad"));
    assert!(!stylesheet.contains(".site-ad"));

    let stylesheet = index.get_stylesheet_for_origin("optout.example", false);
    assert!(!stylesheet.contains(".everywhere-but"));
}

#[test]
fn generic_hide_restricts_to_specific_rules() {
    let index = index_from(COSMETIC_LIST);
    let stylesheet = index.get_stylesheet_for_origin("sub.example.com", true);
    assert!(stylesheet.contains(".site-ad"));
    assert!(stylesheet.contains(".sub-ad"));
    assert!(
        !stylesheet.contains(".everywhere-but"),
        "root contributions must be skipped under generichide"
    );
}

#[test]
fn injection_data_includes_scriptlets() {
    let index = index_from(COSMETIC_LIST);

    let data = index.get_injection_data_for_origin("example.com", false);
    assert!(data.stylesheet.contains(".site-ad"));
    assert_eq!(
        data.scriptlet_injections,
        vec![ScriptletInjection {
            scriptlet: "noop".to_string(),
            arguments: vec!["first-arg".to_string()],
        }]
    );

    let data = index.get_injection_data_for_origin("other.example", false);
    assert!(data.scriptlet_injections.is_empty());
}

#[test]
fn staleness_detection_compares_checksums() {
    let list = "||ads.example^\n";
    let index = index_from(list);
    let checksum = utils::buffer_checksum(list.as_bytes());

    let current = [(1u32, checksum.as_str())];
    assert!(index.is_up_to_date(current.iter().copied()));

    let changed = [(1u32, "0000000000000000")];
    assert!(!index.is_up_to_date(changed.iter().copied()));

    let extra = [(1u32, checksum.as_str()), (2u32, checksum.as_str())];
    assert!(!index.is_up_to_date(extra.iter().copied()));
}
