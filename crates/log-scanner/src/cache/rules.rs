//! 컨테이너 규칙 캐시
//!
//! 규칙 값은 소문자로 정규화되어 (모드, 차원) 키 아래에 저장됩니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use rattle_core::BoxFuture;
use rattle_core::types::{ContainerRule, FilterMode, RuleDimension};

use super::{Reload, Snapshot, record_reload};
use crate::error::ScannerError;
use crate::store::ConfigStore;

/// 모드/차원별로 묶인 규칙 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRuleSet {
    rules: BTreeMap<(FilterMode, RuleDimension), Vec<String>>,
}

impl ContainerRuleSet {
    /// 규칙 목록으로부터 스냅샷을 만듭니다. 빈 값은 무시됩니다.
    pub fn from_rules(rules: impl IntoIterator<Item = ContainerRule>) -> Self {
        let mut grouped: BTreeMap<(FilterMode, RuleDimension), Vec<String>> = BTreeMap::new();
        for rule in rules {
            let value = rule.value.trim().to_lowercase();
            if value.is_empty() {
                continue;
            }
            grouped
                .entry((rule.mode, rule.dimension))
                .or_default()
                .push(value);
        }
        Self { rules: grouped }
    }

    /// 주어진 모드/차원의 소문자 규칙 값
    pub fn values(&self, mode: FilterMode, dimension: RuleDimension) -> &[String] {
        self.rules
            .get(&(mode, dimension))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 컨테이너 규칙 캐시
pub struct ContainerRuleCache {
    store: Arc<dyn ConfigStore>,
    snapshot: Snapshot<ContainerRuleSet>,
}

impl ContainerRuleCache {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            snapshot: Snapshot::new(ContainerRuleSet::default()),
        }
    }

    pub fn rules(&self) -> Arc<ContainerRuleSet> {
        self.snapshot.load()
    }

    pub async fn reload(&self) -> Result<(), ScannerError> {
        let rules = record_reload(self.name(), self.store.container_rules().await)?;
        self.snapshot.replace(ContainerRuleSet::from_rules(rules));
        Ok(())
    }
}

impl Reload for ContainerRuleCache {
    fn name(&self) -> &'static str {
        "container_rules"
    }

    fn reload(&self) -> BoxFuture<'_, Result<(), ScannerError>> {
        Box::pin(ContainerRuleCache::reload(self))
    }
}
