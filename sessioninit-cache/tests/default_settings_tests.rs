//! Integration tests for cached default-settings lookups
//!
//! Tests verify:
//! - Four-level precedence order and session default resolution
//! - All-or-nothing hits
//! - Database name resolution (unknown and empty names)
//! - Independence from the auth watermarks
//! - Coalescing, caller-behind bypass and discarded write-backs

use std::sync::Arc;

use sessioninit_core::resolve_session_defaults;
use sessioninit_test_utils::assertions::*;
use sessioninit_test_utils::fixtures::*;
use sessioninit_test_utils::*;

/// A view frozen at the catalog's current state.
fn frozen_view(catalog: &MockCatalog) -> Arc<MockCatalog> {
    Arc::new(catalog.snapshot())
}

fn bob_in_shop() -> SettingsCacheKey {
    SettingsCacheKey::new(DescriptorId(7), bob())
}

fn pairs(resolved: &[(String, String)]) -> Vec<(&str, &str)> {
    resolved
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect()
}

#[tokio::test]
async fn test_bob_gets_all_levels_in_precedence_order() {
    let stopper = Stopper::new();
    let cache = cache(&stopper);
    let view = Arc::new(bob_settings_catalog());
    let fetcher = MockSettingsFetcher::new();
    let ctx = RequestContext::background();

    let entries = cache
        .get_default_settings(&ctx, &view, &bob(), "shop", &fetcher)
        .await
        .expect("settings");
    assert_precedence_order(&entries, DescriptorId(7), &bob());

    let resolved = resolve_session_defaults(&entries);
    assert_eq!(
        pairs(&resolved),
        vec![
            ("search_path", "shop"),
            ("timezone", "UTC"),
            ("statement_timeout", "30s"),
            ("application_name", "app"),
        ]
    );

    let again = cache
        .get_default_settings(&ctx, &view, &bob(), "shop", &fetcher)
        .await
        .expect("cached settings");
    assert_eq!(again, entries);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.stats().settings_entries, 4);
}

#[tokio::test]
async fn test_unknown_database_uses_role_wide_settings() {
    let stopper = Stopper::new();
    let cache = cache(&stopper);
    let view = Arc::new(bob_settings_catalog());
    let fetcher = MockSettingsFetcher::new();
    let ctx = RequestContext::background();

    for database in ["no_such_db", ""] {
        let entries = cache
            .get_default_settings(&ctx, &view, &bob(), database, &fetcher)
            .await
            .expect("settings");
        assert_precedence_order(&entries, DescriptorId::DEFAULT_DATABASE, &bob());
        let resolved = resolve_session_defaults(&entries);
        assert_eq!(
            pairs(&resolved),
            vec![
                ("timezone", "UTC"),
                ("search_path", "public"),
                ("application_name", "app"),
            ]
        );
    }
    // Both names resolve to the same keys; the second call is a hit.
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_partial_entries_are_a_miss() {
    let stopper = Stopper::new();
    let cache = cache(&stopper);
    let catalog = bob_settings_catalog();
    catalog.add_database("warehouse", DescriptorId(9));
    let view = Arc::new(catalog);
    let fetcher = MockSettingsFetcher::new();
    let ctx = RequestContext::background();

    // Warms (0,bob) and (0,"") only.
    cache
        .get_default_settings(&ctx, &view, &bob(), "", &fetcher)
        .await
        .expect("role-wide");
    assert_eq!(cache.stats().settings_entries, 2);

    // (9,bob) and (9,"") are missing, so this reads through.
    let entries = cache
        .get_default_settings(&ctx, &view, &bob(), "warehouse", &fetcher)
        .await
        .expect("warehouse");
    assert_precedence_order(&entries, DescriptorId(9), &bob());
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(cache.stats().settings_entries, 4);
}

#[tokio::test]
async fn test_settings_version_change_invalidates() {
    let stopper = Stopper::new();
    let cache = cache(&stopper);
    let catalog = bob_settings_catalog();
    let view = Arc::new(catalog.clone());
    let fetcher = MockSettingsFetcher::new();
    let ctx = RequestContext::background();

    cache
        .get_default_settings(&ctx, &view, &bob(), "shop", &fetcher)
        .await
        .expect("warm");

    catalog.put_settings(DescriptorId(7), &bob(), vec!["search_path=archive".to_string()]);
    catalog.bump(SystemTable::DatabaseRoleSettings);

    let entries = cache
        .get_default_settings(&ctx, &view, &bob(), "shop", &fetcher)
        .await
        .expect("after change");
    assert_eq!(entries[0].settings, vec!["search_path=archive".to_string()]);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_settings_and_auth_share_one_store() {
    let stopper = Stopper::new();
    let cache = cache(&stopper);
    let catalog = bob_settings_catalog();
    catalog.put_user(&bob(), AuthInfo::login_user(None));
    let view = Arc::new(catalog.clone());
    let auth_fetcher = MockAuthInfoFetcher::new();
    let settings_fetcher = MockSettingsFetcher::new();
    let ctx = RequestContext::background();

    cache
        .get_auth_info(&ctx, &view, &bob(), &auth_fetcher)
        .await
        .expect("auth");
    cache
        .get_default_settings(&ctx, &view, &bob(), "shop", &settings_fetcher)
        .await
        .expect("settings");

    // A newer users table clears the settings map too.
    catalog.bump(SystemTable::Users);
    cache
        .get_auth_info(&ctx, &view, &bob(), &auth_fetcher)
        .await
        .expect("auth after bump");
    assert_eq!(cache.stats().settings_entries, 0);

    cache
        .get_default_settings(&ctx, &view, &bob(), "shop", &settings_fetcher)
        .await
        .expect("settings after bump");
    assert_eq!(settings_fetcher.calls(), 2);
    assert_eq!(auth_fetcher.calls(), 2);
}

#[tokio::test]
async fn test_zero_budget_settings_still_served() {
    let stopper = Stopper::new();
    let cache = cache_with_budget(&stopper, 0);
    let view = Arc::new(bob_settings_catalog());
    let fetcher = MockSettingsFetcher::new();
    let ctx = RequestContext::background();

    for _ in 0..2 {
        let entries = cache
            .get_default_settings(&ctx, &view, &bob(), "shop", &fetcher)
            .await
            .expect("settings");
        assert_eq!(entries.len(), 4);
    }
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(cache.stats().settings_entries, 0);
    assert_eq!(cache.stats().grants_rejected, 2);
}

#[tokio::test]
async fn test_uncommitted_settings_table_bypasses_cache() {
    let stopper = Stopper::new();
    let cache = cache(&stopper);
    let catalog = bob_settings_catalog();
    catalog.set_uncommitted(SystemTable::DatabaseRoleSettings, true);
    let view = Arc::new(catalog);
    let fetcher = MockSettingsFetcher::new();
    let ctx = RequestContext::background();

    for _ in 0..2 {
        assert_ok(
            &cache
                .get_default_settings(&ctx, &view, &bob(), "shop", &fetcher)
                .await,
        );
    }
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(cache.stats().bypasses, 2);
}

#[tokio::test]
async fn test_settings_read_error_is_propagated() {
    let stopper = Stopper::new();
    let cache = cache(&stopper);
    let catalog = bob_settings_catalog();
    catalog.fail_reads_with(CatalogError::ReadFailed {
        reason: "timeout".to_string(),
    });
    let view = Arc::new(catalog);
    let fetcher = MockSettingsFetcher::new();

    let res = cache
        .get_default_settings(&RequestContext::background(), &view, &bob(), "shop", &fetcher)
        .await;
    assert_catalog_error(&res);
    assert_eq!(cache.stats().settings_entries, 0);
}

#[tokio::test]
async fn test_settings_write_back_discarded_when_version_moves_during_fetch() {
    let stopper = Stopper::new();
    let cache = Arc::new(cache(&stopper));
    let catalog = bob_settings_catalog();
    let bob_view = frozen_view(&catalog);
    let bob_fetcher = MockSettingsFetcher::new();
    bob_fetcher.gate().hold();

    let bob_lookup = {
        let cache = Arc::clone(&cache);
        let view = Arc::clone(&bob_view);
        let fetcher = Arc::clone(&bob_fetcher);
        tokio::spawn(async move {
            cache
                .get_default_settings(&RequestContext::background(), &view, &bob(), "shop", &fetcher)
                .await
        })
    };
    bob_fetcher.gate().wait_entered().await;

    // Another session reads after database_role_settings moved on.
    catalog.bump(SystemTable::DatabaseRoleSettings);
    let newer = frozen_view(&catalog);
    cache
        .get_default_settings(
            &RequestContext::background(),
            &newer,
            &alice(),
            "",
            &MockSettingsFetcher::new(),
        )
        .await
        .expect("alice");
    assert_eq!(cache.store().watermarks().db_role_settings, DescriptorVersion(2));

    bob_fetcher.gate().release();
    let entries = bob_lookup.await.expect("task").expect("bob");
    assert_precedence_order(&entries, DescriptorId(7), &bob());
    assert!(!cache.store().contains_settings(&bob_in_shop()));
    assert_eq!(cache.stats().write_backs_discarded, 1);
}

#[tokio::test]
async fn test_settings_caller_behind_reads_directly() {
    let stopper = Stopper::new();
    let cache = cache(&stopper);
    let catalog = bob_settings_catalog();
    let older = frozen_view(&catalog);
    catalog.bump(SystemTable::DatabaseRoleSettings);
    let newer = frozen_view(&catalog);
    let fetcher = MockSettingsFetcher::new();
    let ctx = RequestContext::background();

    cache
        .get_default_settings(&ctx, &newer, &bob(), "shop", &fetcher)
        .await
        .expect("newer");
    let watermarks = cache.store().watermarks();

    let entries = cache
        .get_default_settings(&ctx, &older, &bob(), "shop", &fetcher)
        .await
        .expect("older");
    assert_eq!(entries.len(), 4);
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(cache.store().watermarks(), watermarks);
    assert!(cache.store().contains_settings(&bob_in_shop()));
    assert_eq!(cache.stats().bypasses, 1);

    cache
        .get_default_settings(&ctx, &newer, &bob(), "shop", &fetcher)
        .await
        .expect("newer again");
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_concurrent_settings_misses_share_one_read() {
    const CALLERS: u64 = 8;
    let stopper = Stopper::new();
    let cache = Arc::new(cache(&stopper));
    let view = Arc::new(bob_settings_catalog());
    let fetcher = MockSettingsFetcher::new();
    fetcher.gate().hold();

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let cache = Arc::clone(&cache);
        let view = Arc::clone(&view);
        let fetcher = Arc::clone(&fetcher);
        handles.push(tokio::spawn(async move {
            cache
                .get_default_settings(&RequestContext::background(), &view, &bob(), "shop", &fetcher)
                .await
        }));
    }
    fetcher.gate().wait_entered().await;
    while cache.stats().misses < CALLERS {
        tokio::task::yield_now().await;
    }
    fetcher.gate().release();

    for handle in handles {
        let entries = handle.await.expect("task").expect("settings");
        assert_precedence_order(&entries, DescriptorId(7), &bob());
    }
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.stats().loads_started, 1);
    assert_eq!(cache.stats().write_backs, 1);
    assert_eq!(cache.stats().settings_entries, 4);
}
