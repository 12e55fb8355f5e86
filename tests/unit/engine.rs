use super::*;

use crate::parser::parse_filter_list;
use crate::request::{Request, ResourceType};
use crate::utils;

fn rule_buffers(list: &str) -> BTreeMap<u32, SourceRules> {
    let mut buffers = BTreeMap::new();
    buffers.insert(
        1,
        SourceRules::new(
            utils::buffer_checksum(list.as_bytes()),
            parse_filter_list(list),
        ),
    );
    buffers
}

fn image_request(url: &str) -> Request {
    Request::new(url, "https://news.example/", ResourceType::Image).unwrap()
}

#[test]
fn starts_empty() {
    let manager = RulesIndexManager::new(RuleGroup::AdBlocking, None);
    assert!(manager.rules_index().is_none());
    assert_eq!(manager.group(), RuleGroup::AdBlocking);
}

#[test]
fn rebuild_swaps_in_a_queryable_index() {
    let manager = RulesIndexManager::new(RuleGroup::AdBlocking, None);
    manager.rebuild(rule_buffers("||ads.example.com^\n")).unwrap();

    let index = manager.rules_index().expect("index should be active");
    assert!(index
        .find_matching_before_request_rule(&image_request("https://ads.example.com/x.png"), false)
        .is_some());
}

#[test]
fn readers_keep_their_snapshot_across_rebuilds() {
    let manager = RulesIndexManager::new(RuleGroup::Tracking, None);
    manager.rebuild(rule_buffers("||old.example^\n")).unwrap();

    let snapshot = manager.rules_index().unwrap();
    manager.rebuild(rule_buffers("||new.example^\n")).unwrap();

    // The old handle still answers from the old index.
    assert!(snapshot
        .find_matching_before_request_rule(&image_request("https://old.example/a.png"), false)
        .is_some());
    // New readers see the new one.
    let fresh = manager.rules_index().unwrap();
    assert!(fresh
        .find_matching_before_request_rule(&image_request("https://old.example/a.png"), false)
        .is_none());
    assert!(fresh
        .find_matching_before_request_rule(&image_request("https://new.example/a.png"), false)
        .is_some());
}

#[test]
fn load_round_trips_through_the_index_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.dat");

    let writer = RulesIndexManager::new(RuleGroup::AdBlocking, Some(path.clone()));
    writer.rebuild(rule_buffers("||ads.example.com^\n")).unwrap();

    let reader = RulesIndexManager::new(RuleGroup::AdBlocking, Some(path));
    assert_eq!(reader.load().unwrap(), LoadOutcome::Loaded);
    assert!(reader
        .rules_index()
        .unwrap()
        .find_matching_before_request_rule(&image_request("https://ads.example.com/x.png"), false)
        .is_some());
}

#[test]
fn corrupt_index_fails_open_and_requests_a_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.dat");
    std::fs::write(&path, b"not an index at all").unwrap();

    let manager = RulesIndexManager::new(RuleGroup::AdBlocking, Some(path.clone()));
    assert_eq!(manager.load().unwrap(), LoadOutcome::NeedsRebuild);
    assert!(manager.rules_index().is_none());

    let strict = RulesIndexManager::new(RuleGroup::AdBlocking, Some(path))
        .with_policy(CorruptIndexPolicy::FailClosed);
    assert!(strict.load().is_err());
}

#[test]
fn missing_index_file_requests_a_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        RulesIndexManager::new(RuleGroup::AdBlocking, Some(dir.path().join("absent.dat")));
    assert_eq!(manager.load().unwrap(), LoadOutcome::NeedsRebuild);
}

#[test]
fn failed_save_keeps_the_previous_index() {
    let dir = tempfile::tempdir().unwrap();
    let subdir = dir.path().join("indexes");
    std::fs::create_dir(&subdir).unwrap();
    let manager =
        RulesIndexManager::new(RuleGroup::AdBlocking, Some(subdir.join("index.dat")));
    manager.rebuild(rule_buffers("||old.example^\n")).unwrap();

    // Make the save fail by removing the target directory.
    std::fs::remove_dir_all(&subdir).unwrap();
    manager
        .rebuild(rule_buffers("||new.example^\n"))
        .unwrap_err();

    // No partial replacement: the old index is still the active one.
    let index = manager.rules_index().expect("previous index must survive");
    assert!(index
        .find_matching_before_request_rule(&image_request("https://old.example/a.png"), false)
        .is_some());
    assert!(index
        .find_matching_before_request_rule(&image_request("https://new.example/a.png"), false)
        .is_none());
}

#[test]
fn staleness_check_uses_source_checksums() {
    let list = "||ads.example.com^\n";
    let manager = RulesIndexManager::new(RuleGroup::AdBlocking, None);
    assert!(!manager.is_up_to_date(std::iter::empty::<(u32, &str)>()));

    manager.rebuild(rule_buffers(list)).unwrap();
    let checksum = utils::buffer_checksum(list.as_bytes());
    let current = [(1u32, checksum.as_str())];
    assert!(manager.is_up_to_date(current.iter().copied()));

    let changed = [(1u32, "ffffffffffffffff")];
    assert!(!manager.is_up_to_date(changed.iter().copied()));
}
