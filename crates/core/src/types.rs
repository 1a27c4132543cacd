//! 도메인 타입 — 스캐너와 데몬이 공유하는 설정/컨테이너 타입
//!
//! [`ContainerRule`], [`PatternRule`], [`FilterMode`], [`NotificationTarget`]은
//! 외부 관리 경계에서만 변경되며, 코어는 캐시된 스냅샷으로 읽기만 합니다.
//! [`ContainerIdentity`]는 관찰 시점에 컨테이너 런타임에서 읽어온 값입니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 짧은 컨테이너 ID 길이
pub const SHORT_ID_LEN: usize = 12;

/// 컨테이너 식별 정보
///
/// 관찰 시점에 런타임에서 가져온 읽기 전용 메타데이터입니다. 영속화하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerIdentity {
    /// 전체 컨테이너 ID
    pub id: String,
    /// 컨테이너 이름 (앞의 `/` 제거)
    pub name: String,
    /// 이미지명
    pub image: String,
    /// 이미지 ID
    pub image_id: String,
    /// 레이블
    pub labels: BTreeMap<String, String>,
}

impl ContainerIdentity {
    /// 레이블 없는 컨테이너 정보를 생성합니다.
    pub fn new(id: impl Into<String>, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            image_id: String::new(),
            labels: BTreeMap::new(),
        }
    }

    /// 레이블을 추가합니다.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// 이미지 ID를 설정합니다.
    pub fn with_image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = image_id.into();
        self
    }

    /// ID 앞 12자
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }

    /// `key=value` 형식의 레이블 문자열 목록
    pub fn label_pairs(&self) -> Vec<String> {
        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect()
    }
}

impl fmt::Display for ContainerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) image={}", self.name, self.short_id(), self.image)
    }
}

/// 전역 필터 모드
///
/// 화이트리스트는 규칙에 매칭된 컨테이너만 스캔하고,
/// 블랙리스트는 규칙에 매칭된 컨테이너를 제외합니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// 매칭되면 제외
    #[default]
    Blacklist,
    /// 매칭되어야 포함
    Whitelist,
}

impl FilterMode {
    /// 대소문자를 구분하지 않고 파싱합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "blacklist" => Some(Self::Blacklist),
            "whitelist" => Some(Self::Whitelist),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blacklist => "blacklist",
            Self::Whitelist => "whitelist",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 컨테이너 규칙의 매칭 차원
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDimension {
    /// 컨테이너 이름 (부분 문자열)
    Name,
    /// 이미지명 (부분 문자열)
    Image,
    /// 컨테이너 ID (접두사)
    Id,
    /// `key=value` 레이블 (부분 문자열)
    Label,
}

impl RuleDimension {
    /// 모든 차원
    pub const ALL: [RuleDimension; 4] = [Self::Name, Self::Image, Self::Id, Self::Label];

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "name" => Some(Self::Name),
            "image" => Some(Self::Image),
            "id" => Some(Self::Id),
            "label" => Some(Self::Label),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Image => "image",
            Self::Id => "id",
            Self::Label => "label",
        }
    }
}

impl fmt::Display for RuleDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 컨테이너 필터 규칙
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRule {
    /// 매칭 차원
    pub dimension: RuleDimension,
    /// 매칭 값
    pub value: String,
    /// 규칙이 속한 모드
    pub mode: FilterMode,
}

impl ContainerRule {
    pub fn new(dimension: RuleDimension, value: impl Into<String>, mode: FilterMode) -> Self {
        Self {
            dimension,
            value: value.into(),
            mode,
        }
    }
}

/// 패턴 규칙 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// 매칭 시 이벤트 분류
    Include,
    /// 매칭 시 모든 이벤트 타입에서 제외
    Exclude,
}

impl MatchType {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "include" => Some(Self::Include),
            "exclude" => Some(Self::Exclude),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
        }
    }
}

/// 로그 패턴 규칙
///
/// `event_type`은 `Include`일 때만 의미가 있습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    /// 정규식
    pub pattern: String,
    /// 규칙 종류
    pub match_type: MatchType,
    /// 이벤트 타입 (include 전용)
    pub event_type: Option<String>,
}

impl PatternRule {
    /// include 규칙을 생성합니다.
    pub fn include(pattern: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            match_type: MatchType::Include,
            event_type: Some(event_type.into()),
        }
    }

    /// exclude 규칙을 생성합니다.
    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            match_type: MatchType::Exclude,
            event_type: None,
        }
    }
}

/// 알림 대상
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTarget {
    /// 대상 ID (예: 채팅 ID)
    pub id: String,
    /// 활성 여부
    pub active: bool,
}

impl NotificationTarget {
    pub fn new(id: impl Into<String>, active: bool) -> Self {
        Self {
            id: id.into(),
            active,
        }
    }
}
