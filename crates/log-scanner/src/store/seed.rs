//! memory 백엔드 초기 데이터
//!
//! `[seed]` 설정으로 [`MemoryConfigStore`]를 채웁니다. 기본 에러 패턴과
//! 자기 자신 제외 규칙은 설정으로 끌 수 있습니다.

use rattle_core::config::{RuleValues, SeedConfig};
use rattle_core::error::StoreError;
use rattle_core::types::{
    ContainerRule, FilterMode, NotificationTarget, PatternRule, RuleDimension,
};
use tracing::info;

use super::MemoryConfigStore;

/// 기본 include 패턴 (이벤트 타입 `error`)
pub const DEFAULT_ERROR_PATTERNS: [&str; 7] = [
    r"(?i)\berror\b",
    r"(?i)\bpanic\b",
    r"(?i)\bfailed\b",
    r"(?i)\bexception\b",
    r"(?i)\btraceback\b",
    r"(?i)\bunhandledpromiserejection\b",
    r"(?i)\bsegmentation fault\b",
];

/// 기본 패턴의 이벤트 타입
pub const DEFAULT_EVENT_TYPE: &str = "error";

fn add_rules(store: &MemoryConfigStore, values: &RuleValues, mode: FilterMode) -> usize {
    let groups = [
        (RuleDimension::Name, &values.names),
        (RuleDimension::Image, &values.images),
        (RuleDimension::Id, &values.ids),
        (RuleDimension::Label, &values.labels),
    ];
    let mut added = 0;
    for (dimension, list) in groups {
        for value in list.iter().filter(|v| !v.trim().is_empty()) {
            store.add_container_rule(ContainerRule::new(dimension, value.trim(), mode));
            added += 1;
        }
    }
    added
}

/// `[seed]` 설정으로 저장소를 채웁니다.
///
/// # Errors
///
/// `filter_mode` 값이 blacklist/whitelist가 아니면 `StoreError::InvalidRecord`를 반환합니다.
pub fn seed_memory_store(store: &MemoryConfigStore, seed: &SeedConfig) -> Result<(), StoreError> {
    let mode =
        FilterMode::from_str_loose(&seed.filter_mode).ok_or_else(|| StoreError::InvalidRecord {
            resource: "filter_modes".to_owned(),
            reason: format!("unknown mode '{}'", seed.filter_mode),
        })?;
    store.set_filter_mode(mode);

    let mut patterns = 0;
    if seed.default_patterns {
        for pattern in DEFAULT_ERROR_PATTERNS {
            store.add_pattern_rule(PatternRule::include(pattern, DEFAULT_EVENT_TYPE));
            patterns += 1;
        }
    }
    for (event_type, list) in &seed.include {
        for pattern in list {
            store.add_pattern_rule(PatternRule::include(pattern.as_str(), event_type.as_str()));
            patterns += 1;
        }
    }
    for pattern in &seed.exclude {
        store.add_pattern_rule(PatternRule::exclude(pattern.as_str()));
        patterns += 1;
    }

    let mut rules = add_rules(store, &seed.blacklist, FilterMode::Blacklist)
        + add_rules(store, &seed.whitelist, FilterMode::Whitelist);

    if seed.exclude_self && !seed.self_name.is_empty() {
        for dimension in [
            RuleDimension::Name,
            RuleDimension::Image,
            RuleDimension::Label,
        ] {
            store.add_container_rule(ContainerRule::new(
                dimension,
                seed.self_name.as_str(),
                FilterMode::Blacklist,
            ));
            rules += 1;
        }
    }

    for target in seed.targets.iter().filter(|t| !t.trim().is_empty()) {
        store.add_target(NotificationTarget::new(target.trim(), true));
    }

    info!(
        mode = %mode,
        patterns,
        rules,
        targets = seed.targets.len(),
        "seeded in-memory config store"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConfigStore;

    #[tokio::test]
    async fn default_seed_has_error_patterns_and_self_exclusion() {
        let store = MemoryConfigStore::new();
        seed_memory_store(&store, &SeedConfig::default()).unwrap();

        let patterns = store.pattern_rules().await.unwrap();
        assert_eq!(patterns.len(), DEFAULT_ERROR_PATTERNS.len());
        assert!(
            patterns
                .iter()
                .all(|p| p.event_type.as_deref() == Some("error"))
        );

        let rules = store.container_rules().await.unwrap();
        assert_eq!(rules.len(), 3);
        assert!(rules.iter().all(|r| r.value == "rattle"));
        assert!(rules.iter().all(|r| r.mode == FilterMode::Blacklist));

        assert_eq!(
            store.filter_mode().await.unwrap(),
            Some(FilterMode::Blacklist)
        );
    }

    #[tokio::test]
    async fn seed_adds_configured_values() {
        let mut seed = SeedConfig {
            filter_mode: "whitelist".to_owned(),
            default_patterns: false,
            exclude_self: false,
            exclude: vec!["healthcheck".to_owned()],
            targets: vec!["-1001".to_owned(), " ".to_owned()],
            ..Default::default()
        };
        seed.include
            .insert("warning".to_owned(), vec![r"(?i)\bwarn\b".to_owned()]);
        seed.whitelist.names = vec!["web".to_owned(), "".to_owned()];
        seed.whitelist.labels = vec!["tier=front".to_owned()];

        let store = MemoryConfigStore::new();
        seed_memory_store(&store, &seed).unwrap();

        assert_eq!(store.pattern_rules().await.unwrap().len(), 2);
        let rules = store.container_rules().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.mode == FilterMode::Whitelist));
        assert_eq!(store.notification_targets().await.unwrap().len(), 1);
        assert_eq!(
            store.filter_mode().await.unwrap(),
            Some(FilterMode::Whitelist)
        );
    }

    #[test]
    fn invalid_mode_is_rejected() {
        let seed = SeedConfig {
            filter_mode: "greylist".to_owned(),
            ..Default::default()
        };
        let err = seed_memory_store(&MemoryConfigStore::new(), &seed).unwrap_err();
        assert!(err.to_string().contains("greylist"));
    }
}
