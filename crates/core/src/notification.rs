//! 알림 페이로드 — 코어가 Notifier 경계로 내보내는 구조화된 메시지
//!
//! 코어는 렌더링과 전송 방식을 알지 못합니다. 스캐너와 레지스트리는
//! [`Notification`]을 만들어 넘기기만 하고, 데몬의 디스패처가 이를 소비합니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::ContainerIdentity;

/// 알림 한 건
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// 알림 고유 ID (UUID v4)
    pub id: String,
    /// 생성 시각
    pub created_at: SystemTime,
    /// 알림 내용
    pub kind: NotificationKind,
}

/// 알림 종류
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// 프로세스 시작
    ProcessStarted { environment: String },
    /// 프로세스 종료 중
    ProcessShuttingDown,
    /// 시작 시점에 관찰된 스캔 대상 컨테이너 요약
    ContainersObserved { containers: Vec<ContainerIdentity> },
    /// 스캐너 시작
    ContainerStarted { container: ContainerIdentity },
    /// 스캐너 정상 종료
    ContainerStopped { container: ContainerIdentity },
    /// 스캐너 비정상 종료
    ContainerStoppedWithError {
        container: ContainerIdentity,
        reason: String,
    },
    /// 분류된 로그 이벤트
    LogEvent {
        container: ContainerIdentity,
        event_type: String,
        line: String,
    },
}

impl Notification {
    /// 새 ID와 현재 시각으로 알림을 생성합니다.
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: SystemTime::now(),
            kind,
        }
    }

    pub fn process_started(environment: impl Into<String>) -> Self {
        Self::new(NotificationKind::ProcessStarted {
            environment: environment.into(),
        })
    }

    pub fn process_shutting_down() -> Self {
        Self::new(NotificationKind::ProcessShuttingDown)
    }

    pub fn containers_observed(containers: Vec<ContainerIdentity>) -> Self {
        Self::new(NotificationKind::ContainersObserved { containers })
    }

    pub fn container_started(container: ContainerIdentity) -> Self {
        Self::new(NotificationKind::ContainerStarted { container })
    }

    pub fn container_stopped(container: ContainerIdentity) -> Self {
        Self::new(NotificationKind::ContainerStopped { container })
    }

    pub fn container_stopped_with_error(
        container: ContainerIdentity,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(NotificationKind::ContainerStoppedWithError {
            container,
            reason: reason.into(),
        })
    }

    pub fn log_event(
        container: ContainerIdentity,
        event_type: impl Into<String>,
        line: impl Into<String>,
    ) -> Self {
        Self::new(NotificationKind::LogEvent {
            container,
            event_type: event_type.into(),
            line: line.into(),
        })
    }

    /// 로깅과 메트릭 레이블에 쓰는 알림 종류 이름
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NotificationKind::ProcessStarted { .. } => "process_started",
            NotificationKind::ProcessShuttingDown => "process_shutting_down",
            NotificationKind::ContainersObserved { .. } => "containers_observed",
            NotificationKind::ContainerStarted { .. } => "container_started",
            NotificationKind::ContainerStopped { .. } => "container_stopped",
            NotificationKind::ContainerStoppedWithError { .. } => "container_stopped_with_error",
            NotificationKind::LogEvent { .. } => "log_event",
        }
    }

    /// 단일 컨테이너에 관한 알림이면 해당 컨테이너
    pub fn container(&self) -> Option<&ContainerIdentity> {
        match &self.kind {
            NotificationKind::ContainerStarted { container }
            | NotificationKind::ContainerStopped { container }
            | NotificationKind::ContainerStoppedWithError { container, .. }
            | NotificationKind::LogEvent { container, .. } => Some(container),
            _ => None,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.container() {
            Some(c) => write!(f, "{} [{}]", self.kind_name(), c.short_id()),
            None => f.write_str(self.kind_name()),
        }
    }
}
