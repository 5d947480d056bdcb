//! Storage backend and migration tests.

use super::*;
use crate::test_support::{legacy_store, sample_snippet, seed_legacy, setup_temp_config};
use serde_json::json;
use tokio::task::JoinSet;

fn ids(snippets: &[Snippet]) -> Vec<&str> {
    snippets.iter().map(|s| s.id.as_str()).collect()
}

#[tokio::test]
async fn probe_selects_document_store_when_available() {
    let (config, _temp) = setup_temp_config();
    let store = SnippetStore::open(&config);
    assert_eq!(store.backend_kind(), Some(BackendKind::Document));

    let fallback = SnippetStore::open(&config.clone().without_document_store());
    assert_eq!(fallback.backend_kind(), Some(BackendKind::KeyValue));
}

#[tokio::test]
async fn missing_backends_surface_capability_errors() {
    let (config, _temp) = setup_temp_config();
    let store = SnippetStore::open(&config.without_document_store().without_key_value());
    assert_eq!(store.backend_kind(), None);

    assert!(matches!(
        store.load_snippets().await,
        Err(AppError::BackendUnavailable(_))
    ));
    assert!(matches!(
        store.save_snippets(&[sample_snippet("a", 1)]).await,
        Err(AppError::BackendUnavailable(_))
    ));
}

#[tokio::test]
async fn key_value_backend_round_trips_in_recency_order() {
    let (config, _temp) = setup_temp_config();
    let store = SnippetStore::open(&config.clone().without_document_store());

    let mut blank = sample_snippet("blank", 9);
    blank.code = "   ".to_string();
    store
        .save_snippets(&[sample_snippet("old", 1), blank, sample_snippet("new", 5)])
        .await
        .expect("save");

    let loaded = store.load_snippets().await.expect("load");
    assert_eq!(ids(&loaded), vec!["new", "old"]);

    let raw = legacy_store(&config)
        .get(SNIPPETS_STORAGE_KEY)
        .expect("raw get")
        .expect("key present");
    assert_eq!(raw[0]["id"], json!("new"), "persisted ordering is recency-first");
}

#[tokio::test]
async fn key_value_backend_drops_malformed_entries() {
    let (config, _temp) = setup_temp_config();
    legacy_store(&config)
        .set(
            SNIPPETS_STORAGE_KEY,
            json!([
                {"id": "ok", "title": "t", "code": "c", "category": "g", "language": "l",
                 "createdAt": 1, "updatedAt": 1},
                {"id": "broken", "title": 5},
                42
            ]),
        )
        .expect("seed");

    let store = SnippetStore::open(&config.without_document_store());
    let loaded = store.load_snippets().await.expect("load");
    assert_eq!(ids(&loaded), vec!["ok"]);
}

#[tokio::test]
async fn document_backend_save_replaces_whole_set() {
    let (config, _temp) = setup_temp_config();
    let store = SnippetStore::open(&config);

    store
        .save_snippets(&[sample_snippet("a", 1), sample_snippet("b", 2)])
        .await
        .expect("first save");
    store
        .save_snippets(&[sample_snippet("c", 3)])
        .await
        .expect("second save");

    let loaded = store.load_snippets().await.expect("load");
    assert_eq!(ids(&loaded), vec!["c"]);
}

#[tokio::test]
async fn document_backend_never_persists_blank_code() {
    let (config, _temp) = setup_temp_config();
    let store = SnippetStore::open(&config);

    let mut blank = sample_snippet("blank", 2);
    blank.code = String::new();
    store
        .save_snippets(&[sample_snippet("a", 1), blank])
        .await
        .expect("save");

    assert_eq!(ids(&store.load_snippets().await.expect("load")), vec!["a"]);
    assert_eq!(store.document_store().await.len().expect("len"), 1);
}

#[tokio::test]
async fn document_backend_persists_across_reopen() {
    let (config, _temp) = setup_temp_config();
    {
        let store = SnippetStore::open(&config);
        store
            .save_snippets(&[sample_snippet("a", 1), sample_snippet("b", 2)])
            .await
            .expect("save");
    }
    let reopened = SnippetStore::open(&config);
    let loaded = reopened.load_snippets().await.expect("load");
    assert_eq!(ids(&loaded), vec!["b", "a"]);
    assert_eq!(
        reopened.migration_outcome(),
        Some(MigrationOutcome::AlreadyPopulated)
    );
}

#[tokio::test]
async fn migration_moves_legacy_snippets_once_and_deletes_legacy_key() {
    let (config, _temp) = setup_temp_config();
    seed_legacy(
        &config,
        &[sample_snippet("a", 1), sample_snippet("b", 3), sample_snippet("c", 2)],
    );

    let store = SnippetStore::open(&config);
    let first = store.load_snippets().await.expect("first load");
    assert_eq!(ids(&first), vec!["b", "c", "a"]);
    assert_eq!(store.migration_outcome(), Some(MigrationOutcome::Migrated(3)));
    assert_eq!(
        legacy_store(&config).get(SNIPPETS_STORAGE_KEY).expect("legacy get"),
        None,
        "legacy key must be removed after migration"
    );

    let second = store.load_snippets().await.expect("second load");
    assert_eq!(first, second);
    assert_eq!(store.migration_runs(), 1);
    assert_eq!(store.document_store().await.len().expect("len"), 3);
}

#[tokio::test]
async fn migration_skips_invalid_legacy_records() {
    let (config, _temp) = setup_temp_config();
    legacy_store(&config)
        .set(
            SNIPPETS_STORAGE_KEY,
            json!([
                {"id": "ok", "title": "t", "code": "c", "category": "g", "language": "l",
                 "createdAt": 1, "updatedAt": 1},
                {"id": "empty", "title": "t", "code": "", "category": "g", "language": "l",
                 "createdAt": 1, "updatedAt": 1},
                {"id": "bad"}
            ]),
        )
        .expect("seed");

    let store = SnippetStore::open(&config);
    let loaded = store.load_snippets().await.expect("load");
    assert_eq!(ids(&loaded), vec!["ok"]);
    assert_eq!(store.migration_outcome(), Some(MigrationOutcome::Migrated(1)));
}

#[tokio::test]
async fn concurrent_loads_share_one_migration() {
    let (config, _temp) = setup_temp_config();
    let legacy: Vec<Snippet> = (0..20).map(|i| sample_snippet(&format!("s{}", i), i)).collect();
    seed_legacy(&config, &legacy);

    let store = Arc::new(SnippetStore::open(&config));
    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let store = store.clone();
        tasks.spawn(async move { store.load_snippets().await });
    }

    while let Some(joined) = tasks.join_next().await {
        let loaded = joined.expect("task join").expect("load");
        assert_eq!(loaded.len(), 20);
    }
    assert_eq!(store.migration_runs(), 1);
    assert_eq!(store.migration_outcome(), Some(MigrationOutcome::Migrated(20)));
    assert_eq!(store.document_store().await.len().expect("len"), 20);
}

#[tokio::test]
async fn failed_migration_keeps_legacy_copy_and_retries() {
    let (config, _temp) = setup_temp_config();
    seed_legacy(&config, &[sample_snippet("a", 1), sample_snippet("b", 2)]);

    let store = SnippetStore::open(&config);
    store.document_store().await.fail_next_replace();

    assert!(store.load_snippets().await.is_err());
    assert_eq!(store.migration_outcome(), None);
    assert!(store.document_store().await.is_empty().expect("is_empty"));
    assert!(
        legacy_store(&config)
            .get(SNIPPETS_STORAGE_KEY)
            .expect("legacy get")
            .is_some(),
        "legacy copy must survive a failed migration"
    );

    let loaded = store.load_snippets().await.expect("retry load");
    assert_eq!(ids(&loaded), vec!["b", "a"]);
    assert_eq!(store.migration_outcome(), Some(MigrationOutcome::Migrated(2)));
    assert_eq!(store.migration_runs(), 2);
}

#[tokio::test]
async fn fresh_install_migrates_nothing() {
    let (config, _temp) = setup_temp_config();
    let store = SnippetStore::open(&config);
    assert!(store.load_snippets().await.expect("load").is_empty());
    assert_eq!(
        store.migration_outcome(),
        Some(MigrationOutcome::NothingToMigrate)
    );
}

#[tokio::test]
async fn populated_document_store_leaves_legacy_untouched() {
    let (config, _temp) = setup_temp_config();
    {
        let store = SnippetStore::open(&config);
        store
            .save_snippets(&[sample_snippet("current", 10)])
            .await
            .expect("save");
    }
    seed_legacy(&config, &[sample_snippet("stale", 1)]);

    let store = SnippetStore::open(&config);
    let loaded = store.load_snippets().await.expect("load");
    assert_eq!(ids(&loaded), vec!["current"]);
    assert_eq!(
        store.migration_outcome(),
        Some(MigrationOutcome::AlreadyPopulated)
    );
    assert!(legacy_store(&config)
        .get(SNIPPETS_STORAGE_KEY)
        .expect("legacy get")
        .is_some());
}

#[tokio::test]
async fn leftover_legacy_key_is_removed_once_its_snippets_are_stored() {
    let (config, _temp) = setup_temp_config();
    let legacy = [sample_snippet("a", 1), sample_snippet("b", 2)];
    {
        let store = SnippetStore::open(&config);
        store.save_snippets(&legacy).await.expect("save");
    }
    seed_legacy(&config, &legacy);

    let store = SnippetStore::open(&config);
    let loaded = store.load_snippets().await.expect("load");
    assert_eq!(ids(&loaded), vec!["b", "a"]);
    assert_eq!(
        store.migration_outcome(),
        Some(MigrationOutcome::AlreadyPopulated)
    );
    assert_eq!(
        legacy_store(&config).get(SNIPPETS_STORAGE_KEY).expect("legacy get"),
        None
    );
}

#[tokio::test]
async fn dropped_load_still_completes_migration() {
    let (config, _temp) = setup_temp_config();
    seed_legacy(&config, &[sample_snippet("a", 1), sample_snippet("b", 2)]);

    let store = SnippetStore::open(&config);
    store.document_store().await;
    tokio::select! {
        biased;
        _ = store.load_snippets() => {}
        _ = std::future::ready(()) => {}
    }

    let loaded = store.load_snippets().await.expect("load after drop");
    assert_eq!(ids(&loaded), vec!["b", "a"]);
    assert_eq!(store.document_store().await.len().expect("len"), 2);
    assert_eq!(
        legacy_store(&config).get(SNIPPETS_STORAGE_KEY).expect("legacy get"),
        None
    );
}

#[tokio::test]
async fn save_keeps_newest_copy_of_duplicate_ids() {
    let (config, _temp) = setup_temp_config();
    let mut older = sample_snippet("dup", 1);
    older.code = "old body".to_string();
    let mut newer = sample_snippet("dup", 5);
    newer.code = "new body".to_string();

    {
        let store = SnippetStore::open(&config);
        store
            .save_snippets(&[older, newer, sample_snippet("other", 3)])
            .await
            .expect("save");
    }

    let store = SnippetStore::open(&config);
    let loaded = store.load_snippets().await.expect("load");
    assert_eq!(ids(&loaded), vec!["dup", "other"]);
    assert_eq!(loaded[0].code, "new body");
}

#[tokio::test]
async fn migration_without_key_value_backend_is_a_no_op() {
    let (config, _temp) = setup_temp_config();
    seed_legacy(&config, &[sample_snippet("a", 1)]);

    let store = SnippetStore::open(&config.without_key_value());
    assert!(store.load_snippets().await.expect("load").is_empty());
    assert_eq!(
        store.migration_outcome(),
        Some(MigrationOutcome::NothingToMigrate)
    );
}
