//! Integration tests for the CLI command layer.
//!
//! These run the commands against an in-memory backend wired from a real
//! config file.

use std::io::Write;
use std::path::PathBuf;

use tempfile::{NamedTempFile, TempDir};

use memory_cli::{load_settings, MemorySystem};
use memory_types::{MemoryTier, Role, SearchRequest};

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("Failed to create file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write file");
    path
}

async fn system_with_config(toml: &str) -> MemorySystem {
    let mut file = NamedTempFile::with_suffix(".toml").expect("Failed to create config");
    file.write_all(toml.as_bytes()).expect("Failed to write config");
    let settings =
        load_settings(Some(file.path().to_str().unwrap()), Some("warn")).expect("settings");
    assert_eq!(settings.log_level, "warn");
    MemorySystem::build(settings).await.expect("system")
}

const SMALL_CONFIG: &str = r#"
[tiers]
working_memory_size = 4
short_term_slots = 2

[embedding]
provider = "hash"
dimension = 64
"#;

#[tokio::test]
async fn test_store_retrieve_clear() {
    let system = system_with_config(SMALL_CONFIG).await;

    let outcomes = system
        .store(
            "s1",
            Role::User,
            &["first".to_string(), "second".to_string(), "third".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.long_term_persisted && o.embedded));
    assert!(outcomes[2].evicted.is_some());

    let messages = system.retrieve("s1", "second", 6).await.unwrap();
    assert!(messages.len() <= 6);
    assert!(messages.iter().any(|m| m.tier == MemoryTier::Working));
    assert!(messages.iter().any(|m| m.tier == MemoryTier::LongTerm));

    let cleared = system.clear("s1").await.unwrap();
    assert_eq!(cleared.long_term_deleted, Some(3));
    assert!(system.retrieve("s1", "second", 6).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_seed_and_events_files() {
    let dir = TempDir::new().unwrap();
    let seed = write_file(
        &dir,
        "seed.json",
        r#"[
            {"session_id": "s1", "content": "deep learning research notes"},
            {"session_id": "s1", "role": "assistant", "content": "machine learning model tips"},
            {"session_id": "s2", "content": "pasta recipe with basil"}
        ]"#,
    );
    let events = write_file(
        &dir,
        "events.json",
        r#"[
            {"action": "view", "content": "machine learning", "category": "technology"},
            {"action": "like", "content": "deep learning", "category": "technology", "weight": 2.0},
            {"action": "search", "content": "market strategy", "category": "business", "weight": 0.5}
        ]"#,
    );

    let system = system_with_config(SMALL_CONFIG).await;
    assert_eq!(system.seed(&seed).await.unwrap(), 3);
    assert_eq!(system.load_events("u1", &events).await.unwrap(), 3);

    let profile = system.interest("u1").await.unwrap();
    assert_eq!(profile.interest_vector.len(), 64);
    assert_eq!(profile.categories, vec!["technology", "business"]);

    let request = SearchRequest::new("learning", profile).with_limits(2, 10);
    let results = system.search(request).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= 2);
    assert!(results[0].content.contains("learning"));
}

#[tokio::test]
async fn test_malformed_seed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let seed = write_file(&dir, "seed.json", r#"{"not": "a list"}"#);
    let system = system_with_config(SMALL_CONFIG).await;
    assert!(system.seed(&seed).await.is_err());
}

#[test]
fn test_invalid_config_rejected() {
    let mut file = NamedTempFile::with_suffix(".toml").unwrap();
    file.write_all(b"[tiers]\nshort_term_slots = 0\n").unwrap();
    assert!(load_settings(Some(file.path().to_str().unwrap()), None).is_err());
}
