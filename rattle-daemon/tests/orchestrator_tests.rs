//! Orchestrator assembly tests with the in-memory configuration store.

use std::sync::Arc;

use rattle_core::config::RattleConfig;
use rattle_core::types::{ContainerIdentity, FilterMode};
use rattle_daemon::orchestrator::{Caches, build_store};

#[tokio::test]
async fn test_memory_store_is_seeded_and_caches_load() {
    // Given: default configuration (memory backend, default seed)
    let config = RattleConfig::default();

    // When: building the store and loading every cache
    let store = build_store(&config).await.expect("memory store");
    let caches = Caches::new(&store);
    caches.load_all().await.expect("caches load");

    // Then: default patterns, blacklist mode and the self-exclusion rule are active
    assert_eq!(caches.mode.mode(), FilterMode::Blacklist);
    assert_eq!(caches.patterns.classify("2024-01-01 ERROR boom").as_deref(), Some("error"));
    assert!(caches.rules.rules().len() >= 3);

    let filter = caches.filter();
    assert!(filter.should_ignore(&ContainerIdentity::new("1", "rattle", "rattle:latest")));
    assert!(!filter.should_ignore(&ContainerIdentity::new("2", "web-1", "app:latest")));
}

#[tokio::test]
async fn test_seeded_targets_and_whitelist() {
    let mut config = RattleConfig::default();
    config.seed.filter_mode = "whitelist".to_owned();
    config.seed.whitelist.names = vec!["api".to_owned()];
    config.seed.targets = vec!["-1001".to_owned()];

    let store = build_store(&config).await.unwrap();
    let caches = Caches::new(&store);
    caches.load_all().await.unwrap();

    assert_eq!(caches.targets.active_ids(), vec!["-1001".to_owned()]);
    let filter = caches.filter();
    assert!(!filter.should_ignore(&ContainerIdentity::new("1", "api-gw", "gw:1")));
    assert!(filter.should_ignore(&ContainerIdentity::new("2", "worker", "worker:1")));
}

#[tokio::test]
async fn test_every_cache_is_watched() {
    let store = build_store(&RattleConfig::default()).await.unwrap();
    let caches = Caches::new(&Arc::clone(&store));
    let names: Vec<_> = caches.watched().iter().map(|(_, c)| c.name()).collect();
    assert_eq!(
        names,
        ["notification_targets", "container_rules", "pattern_rules", "filter_mode"]
    );
}
