//! PostgreSQL 설정 저장소
//!
//! 관리 경계가 소유한 테이블을 읽기 전용으로 조회합니다.
//! 해석할 수 없는 레코드(알 수 없는 차원/모드 문자열)는 경고 후 건너뜁니다.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rattle_core::BoxFuture;
use rattle_core::error::StoreError;
use rattle_core::types::{
    ContainerRule, FilterMode, MatchType, NotificationTarget, PatternRule, RuleDimension,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::warn;

use super::{ConfigStore, Resource, TimestampField};

const SELECT_TARGETS: &str = r#"
SELECT target_id, active
FROM notification_targets
WHERE deleted_at IS NULL
ORDER BY id
"#;

const SELECT_CONTAINER_RULES: &str = r#"
SELECT dimension, value, mode
FROM container_rules
WHERE deleted_at IS NULL
ORDER BY id
"#;

const SELECT_PATTERN_RULES: &str = r#"
SELECT pattern, match_type, event_type
FROM pattern_rules
WHERE deleted_at IS NULL
ORDER BY id
"#;

const SELECT_FILTER_MODE: &str = r#"
SELECT mode
FROM filter_modes
WHERE deleted_at IS NULL
ORDER BY updated_at DESC
LIMIT 1
"#;

fn query_error(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

/// PostgreSQL 설정 저장소
#[derive(Debug, Clone)]
pub struct PgConfigStore {
    db: PgPool,
}

impl PgConfigStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 커넥션 풀을 만들고 연결을 확인합니다.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let db = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(10))
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { db })
    }

    /// 내장 마이그레이션으로 설정 테이블을 생성합니다.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| StoreError::Connection(format!("migration failed: {e}")))
    }
}

fn parse_container_rule(dimension: &str, value: String, mode: &str) -> Option<ContainerRule> {
    let dimension = RuleDimension::from_str_loose(dimension);
    let mode = FilterMode::from_str_loose(mode);
    match (dimension, mode) {
        (Some(dimension), Some(mode)) => Some(ContainerRule {
            dimension,
            value,
            mode,
        }),
        _ => None,
    }
}

fn parse_pattern_rule(
    pattern: String,
    match_type: &str,
    event_type: Option<String>,
) -> Option<PatternRule> {
    let match_type = MatchType::from_str_loose(match_type)?;
    let event_type = match match_type {
        MatchType::Include => event_type,
        MatchType::Exclude => None,
    };
    Some(PatternRule {
        pattern,
        match_type,
        event_type,
    })
}

impl ConfigStore for PgConfigStore {
    fn notification_targets(&self) -> BoxFuture<'_, Result<Vec<NotificationTarget>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<(String, bool)> = sqlx::query_as(SELECT_TARGETS)
                .fetch_all(&self.db)
                .await
                .map_err(query_error)?;
            Ok(rows
                .into_iter()
                .map(|(id, active)| NotificationTarget { id, active })
                .collect())
        })
    }

    fn container_rules(&self) -> BoxFuture<'_, Result<Vec<ContainerRule>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<(String, String, String)> = sqlx::query_as(SELECT_CONTAINER_RULES)
                .fetch_all(&self.db)
                .await
                .map_err(query_error)?;

            let mut rules = Vec::with_capacity(rows.len());
            for (dimension, value, mode) in rows {
                match parse_container_rule(&dimension, value, &mode) {
                    Some(rule) => rules.push(rule),
                    None => warn!(
                        dimension = %dimension,
                        mode = %mode,
                        "skipping container rule with unknown dimension or mode"
                    ),
                }
            }
            Ok(rules)
        })
    }

    fn pattern_rules(&self) -> BoxFuture<'_, Result<Vec<PatternRule>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<(String, String, Option<String>)> =
                sqlx::query_as(SELECT_PATTERN_RULES)
                    .fetch_all(&self.db)
                    .await
                    .map_err(query_error)?;

            let mut rules = Vec::with_capacity(rows.len());
            for (pattern, match_type, event_type) in rows {
                match parse_pattern_rule(pattern, &match_type, event_type) {
                    Some(rule) => rules.push(rule),
                    None => warn!(
                        match_type = %match_type,
                        "skipping pattern rule with unknown match type"
                    ),
                }
            }
            Ok(rules)
        })
    }

    fn filter_mode(&self) -> BoxFuture<'_, Result<Option<FilterMode>, StoreError>> {
        Box::pin(async move {
            let row: Option<(String,)> = sqlx::query_as(SELECT_FILTER_MODE)
                .fetch_optional(&self.db)
                .await
                .map_err(query_error)?;

            match row {
                None => Ok(None),
                Some((mode,)) => FilterMode::from_str_loose(&mode).map(Some).ok_or_else(|| {
                    StoreError::InvalidRecord {
                        resource: Resource::FilterMode.table().to_owned(),
                        reason: format!("unknown mode '{mode}'"),
                    }
                }),
            }
        })
    }

    fn count_modified_since(
        &self,
        resource: Resource,
        field: TimestampField,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            // 테이블/컬럼 이름은 열거형의 고정 문자열입니다.
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} > $1",
                resource.table(),
                field.column()
            );
            let count: i64 = sqlx::query_scalar(&sql)
                .bind(since)
                .fetch_one(&self.db)
                .await
                .map_err(query_error)?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }
}
