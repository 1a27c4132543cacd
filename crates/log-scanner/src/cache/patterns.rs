//! 패턴 엔진
//!
//! 패턴 규칙을 정규식으로 컴파일하여 제외 집합과 이벤트 타입별 포함 집합으로 나눕니다.
//! 잘못된 패턴은 경고 후 건너뛰며 나머지 규칙의 로드를 막지 않습니다.
//!
//! # 분류 순서
//! 1. 제외 패턴 중 하나라도 일치하면 이벤트 없음
//! 2. 포함 패턴을 이벤트 타입 이름 순서로 검사, 첫 일치 타입 반환
//! 3. 일치 없으면 이벤트 없음

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use rattle_core::BoxFuture;
use rattle_core::types::{MatchType, PatternRule};
use tracing::warn;

use super::{Reload, Snapshot, record_reload};
use crate::error::ScannerError;
use crate::store::ConfigStore;

/// 컴파일된 패턴 집합
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    exclude: Vec<Regex>,
    include: BTreeMap<String, Vec<Regex>>,
}

impl PatternSet {
    /// 규칙을 컴파일합니다. 실패한 규칙은 건너뜁니다.
    pub fn compile(rules: impl IntoIterator<Item = PatternRule>) -> Self {
        let mut set = Self::default();
        for rule in rules {
            let pattern = rule.pattern.trim();
            if pattern.is_empty() {
                warn!("skipping empty pattern rule");
                continue;
            }
            let regex = match Regex::new(pattern) {
                Ok(regex) => regex,
                Err(e) => {
                    warn!(pattern, error = %e, "skipping invalid pattern");
                    continue;
                }
            };
            match rule.match_type {
                MatchType::Exclude => set.exclude.push(regex),
                MatchType::Include => {
                    let event_type = rule
                        .event_type
                        .as_deref()
                        .map(|t| t.trim().to_lowercase())
                        .unwrap_or_default();
                    if event_type.is_empty() {
                        warn!(pattern, "skipping include pattern without event type");
                        continue;
                    }
                    set.include.entry(event_type).or_default().push(regex);
                }
            }
        }
        set
    }

    /// 정리된 로그 라인을 이벤트 타입으로 분류합니다.
    pub fn classify(&self, line: &str) -> Option<&str> {
        if self.exclude.iter().any(|re| re.is_match(line)) {
            return None;
        }
        self.include
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(line)))
            .map(|(event_type, _)| event_type.as_str())
    }

    pub fn exclude_count(&self) -> usize {
        self.exclude.len()
    }

    pub fn include_count(&self) -> usize {
        self.include.values().map(Vec::len).sum()
    }

    /// 포함 집합에 등록된 이벤트 타입
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.include.keys().map(String::as_str)
    }
}

impl PartialEq for PatternSet {
    fn eq(&self, other: &Self) -> bool {
        fn sources(patterns: &[Regex]) -> Vec<&str> {
            patterns.iter().map(Regex::as_str).collect()
        }
        sources(&self.exclude) == sources(&other.exclude)
            && self.include.len() == other.include.len()
            && self
                .include
                .iter()
                .zip(other.include.iter())
                .all(|((a_type, a), (b_type, b))| a_type == b_type && sources(a) == sources(b))
    }
}

/// 패턴 규칙 캐시
pub struct PatternCache {
    store: Arc<dyn ConfigStore>,
    snapshot: Snapshot<PatternSet>,
}

impl PatternCache {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            snapshot: Snapshot::new(PatternSet::default()),
        }
    }

    pub fn patterns(&self) -> Arc<PatternSet> {
        self.snapshot.load()
    }

    /// 현재 스냅샷으로 라인을 분류합니다.
    pub fn classify(&self, line: &str) -> Option<String> {
        self.snapshot.load().classify(line).map(str::to_owned)
    }

    pub async fn reload(&self) -> Result<(), ScannerError> {
        let rules = record_reload(self.name(), self.store.pattern_rules().await)?;
        self.snapshot.replace(PatternSet::compile(rules));
        Ok(())
    }
}

impl Reload for PatternCache {
    fn name(&self) -> &'static str {
        "pattern_rules"
    }

    fn reload(&self) -> BoxFuture<'_, Result<(), ScannerError>> {
        Box::pin(PatternCache::reload(self))
    }
}
