//! 필터 엔진 — 컨테이너 스캔 대상 여부 판정
//!
//! 컨테이너의 ID, 이름, 이미지, `key=value` 라벨을 소문자로 만든 뒤
//! 활성 모드의 규칙과 비교합니다. ID는 접두사, 나머지는 부분 문자열 매칭이며
//! 차원 간에는 논리합(OR)입니다.
//!
//! | 모드 | 매칭됨 | 매칭 안 됨 |
//! |---|---|---|
//! | blacklist | 무시 | 스캔 |
//! | whitelist | 스캔 | 무시 |

use std::sync::Arc;

use rattle_core::types::{ContainerIdentity, FilterMode, RuleDimension};

use crate::cache::{ContainerRuleCache, ContainerRuleSet, ModeCache};

/// 컨테이너가 활성 모드의 규칙 중 하나라도 만족하는지 검사합니다.
pub fn matches_any(mode: FilterMode, rules: &ContainerRuleSet, container: &ContainerIdentity) -> bool {
    let id = container.id.to_lowercase();
    let name = container.name.to_lowercase();
    let image = container.image.to_lowercase();
    let labels: Vec<String> = container
        .label_pairs()
        .iter()
        .map(|pair| pair.to_lowercase())
        .collect();

    RuleDimension::ALL.iter().any(|&dimension| {
        let values = rules.values(mode, dimension);
        match dimension {
            RuleDimension::Id => values.iter().any(|v| id.starts_with(v.as_str())),
            RuleDimension::Name => values.iter().any(|v| name.contains(v.as_str())),
            RuleDimension::Image => values.iter().any(|v| image.contains(v.as_str())),
            RuleDimension::Label => values
                .iter()
                .any(|v| labels.iter().any(|pair| pair.contains(v.as_str()))),
        }
    })
}

/// 모드와 규칙으로 무시 여부를 결정합니다.
pub fn should_ignore_with(
    mode: FilterMode,
    rules: &ContainerRuleSet,
    container: &ContainerIdentity,
) -> bool {
    let matched = matches_any(mode, rules, container);
    match mode {
        FilterMode::Blacklist => matched,
        FilterMode::Whitelist => !matched,
    }
}

/// 캐시 기반 컨테이너 필터
#[derive(Clone)]
pub struct ContainerFilter {
    mode: Arc<ModeCache>,
    rules: Arc<ContainerRuleCache>,
}

impl ContainerFilter {
    pub fn new(mode: Arc<ModeCache>, rules: Arc<ContainerRuleCache>) -> Self {
        Self { mode, rules }
    }

    /// 현재 캐시 스냅샷 기준으로 컨테이너를 무시해야 하면 `true`
    pub fn should_ignore(&self, container: &ContainerIdentity) -> bool {
        should_ignore_with(self.mode.mode(), &self.rules.rules(), container)
    }
}
