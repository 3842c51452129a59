//! Settings load errors, validation, and per-backend roundtrip tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rstest::rstest;
use std::collections::BTreeMap;
use std::path::PathBuf;
use taskhub_core::{
    settings::{self, RetrySettings},
    GithubSettings, JiraSettings, MarkdownSettings, Settings, SettingsError, SourceSettings,
    StorageSettings, TodoistSettings, TrelloSettings,
};

fn base(storage: StorageSettings) -> Settings {
    let mut lists = BTreeMap::new();
    lists.insert("Review".to_string(), "review-requested:@me".to_string());
    Settings {
        sync_interval: 5,
        parallelism: 2,
        commit_cooldown_secs: 0,
        search_prefix: Some("is:open".to_string()),
        retry: RetrySettings::default(),
        lists,
        source: SourceSettings::Github(GithubSettings {
            token: "gh".to_string(),
            api_url: "https://api.github.com".to_string(),
        }),
        storage,
    }
}

fn trello() -> StorageSettings {
    StorageSettings::Trello(TrelloSettings {
        appkey: "key".to_string(),
        token: "tok".to_string(),
        boardid: "board".to_string(),
        api_url: "https://api.trello.com".to_string(),
    })
}

fn todoist() -> StorageSettings {
    StorageSettings::Todoist(TodoistSettings {
        token: "tok".to_string(),
        project_name: Some("Work".to_string()),
        project_id: None,
        endpoint: "https://api.todoist.com/sync/v9/sync".to_string(),
    })
}

fn markdown() -> StorageSettings {
    StorageSettings::Markdown(MarkdownSettings {
        dir: PathBuf::from("/tmp/lists"),
    })
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".taskhub/config.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = settings::load_at(home.path()).unwrap_err();
    assert!(matches!(err, SettingsError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_missing_source_is_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".taskhub/config.yaml")
        .write_str("lists:\n  A: q\nstorage:\n  kind: markdown\n  dir: /tmp\n")
        .expect("write");

    let err = settings::load_at(home.path()).unwrap_err();
    assert!(matches!(err, SettingsError::Parse { .. }), "got: {err}");
}

#[test]
fn not_found_message_points_at_init() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = settings::load_at(home.path()).unwrap_err();
    assert!(err.to_string().contains("taskhub init"));
}

#[test]
fn load_from_explicit_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("custom.yaml");
    let yaml = settings::to_yaml(&base(markdown())).expect("yaml");
    file.write_str(&yaml).expect("write");

    let loaded = settings::load_from(file.path()).expect("load");
    assert_eq!(loaded, base(markdown()));
}

#[test]
fn init_writes_starter_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    settings::init_at(home.path(), false).expect("init");
    home.child(".taskhub/config.yaml")
        .assert(predicate::str::contains("kind: github"));
}

// ---------------------------------------------------------------------------
// 2. Validation
// ---------------------------------------------------------------------------

#[rstest]
#[case("empty_lists", |s: &mut Settings| s.lists.clear(), "lists")]
#[case("blank_container", |s: &mut Settings| { s.lists.insert(" ".to_string(), "q".to_string()); }, "empty")]
#[case("zero_interval", |s: &mut Settings| s.sync_interval = 0, "sync_interval")]
#[case("zero_parallelism", |s: &mut Settings| s.parallelism = 0, "parallelism")]
#[case("zero_attempts", |s: &mut Settings| s.retry.max_attempts = 0, "max_attempts")]
#[case("inverted_backoff", |s: &mut Settings| s.retry.initial_backoff_ms = s.retry.max_backoff_ms + 1, "initial_backoff_ms")]
fn invalid_settings_rejected(
    #[case] label: &str,
    #[case] mutate: fn(&mut Settings),
    #[case] needle: &str,
) {
    let mut s = base(trello());
    mutate(&mut s);
    let reason = s.validate().expect_err(label);
    assert!(reason.contains(needle), "[{label}] reason was: {reason}");
}

#[test]
fn invalid_settings_on_disk_report_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut s = base(trello());
    s.parallelism = 0;
    home.child(".taskhub/config.yaml")
        .write_str(&settings::to_yaml(&s).expect("yaml"))
        .expect("write");

    let err = settings::load_at(home.path()).unwrap_err();
    assert!(matches!(err, SettingsError::Invalid { .. }), "got: {err}");
    assert!(err.to_string().contains("parallelism"));
}

// ---------------------------------------------------------------------------
// 3. Backend selection roundtrip
// ---------------------------------------------------------------------------

#[rstest]
#[case("trello", trello())]
#[case("todoist", todoist())]
#[case("markdown", markdown())]
fn storage_kind_roundtrip(#[case] kind: &str, #[case] storage: StorageSettings) {
    let original = base(storage);
    let yaml = settings::to_yaml(&original).expect("serialize");
    assert!(yaml.contains(&format!("kind: {kind}")), "[{kind}] yaml: {yaml}");
    let back = settings::from_yaml(&yaml).expect("deserialize");
    assert_eq!(back, original);
    assert_eq!(back.storage.kind(), kind);
}

#[test]
fn jira_source_roundtrip() {
    let mut original = base(trello());
    original.source = SourceSettings::Jira(JiraSettings {
        endpoint: "https://issues.example.com".to_string(),
        token: "t".to_string(),
    });
    let yaml = settings::to_yaml(&original).expect("serialize");
    let back = settings::from_yaml(&yaml).expect("deserialize");
    assert_eq!(back.source.kind(), "jira");
    assert_eq!(back, original);
}
