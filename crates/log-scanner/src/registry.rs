//! 스캔 레지스트리 — 실행 중인 컨테이너마다 스트림 스캐너 하나를 유지합니다.
//!
//! 레지스트리는 추적 중인 스캐너 맵의 유일한 소유자입니다. 각 항목은
//! 부모 취소 토큰에서 파생된 자식 토큰과 세대 번호를 가지며, 워커는 종료할 때
//! 자기 세대의 항목만 제거합니다. 교체된 스캐너가 후속 스캐너를 지우지 않습니다.
//!
//! # 알림 책임
//!
//! 맵에서 항목을 제거한 쪽이 정지 알림을 보냅니다.
//!
//! | 상황 | 알림 |
//! |---|---|
//! | `die`/`destroy` 이벤트로 제거 | `ContainerStopped` |
//! | 스트림 정상 종료 후 워커가 제거 | `ContainerStopped` |
//! | 재시도 한도 초과 후 워커가 제거 | `ContainerStoppedWithError` |
//! | 취소, 교체, `stop_all` | 없음 |
//!
//! # 동시성
//!
//! 맵은 `std::sync::RwLock`으로 보호되며 `.await` 지점을 넘어 락을 잡지 않습니다.
//! 모든 워커와 이벤트 리스너는 `TaskTracker`에 등록되어 `stop_all`이 종료를 기다립니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::StreamExt;
use metrics::gauge;
use rattle_core::notification::Notification;
use rattle_core::types::ContainerIdentity;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::ScannerConfig;
use crate::docker::{DockerClient, LifecycleEvent, LifecycleKind};
use crate::error::ScannerError;
use crate::filter::ContainerFilter;
use crate::notify::Notifier;
use crate::stream::{LineHandler, ScanExit, StreamScanner};

/// 추적 중인 스캐너 한 개
struct Entry {
    container: ContainerIdentity,
    generation: u64,
    token: CancellationToken,
}

struct Inner<D: DockerClient> {
    docker: Arc<D>,
    filter: ContainerFilter,
    handler: Arc<dyn LineHandler>,
    notifier: Arc<dyn Notifier>,
    config: ScannerConfig,
    root: CancellationToken,
    tracker: TaskTracker,
    entries: RwLock<HashMap<String, Entry>>,
    next_generation: AtomicU64,
    listening: AtomicBool,
}

/// 컨테이너별 스트림 스캐너 레지스트리
///
/// 복제 비용이 싼 핸들입니다. 복제본은 같은 맵을 공유합니다.
pub struct ScanRegistry<D: DockerClient> {
    inner: Arc<Inner<D>>,
}

impl<D: DockerClient> Clone for ScanRegistry<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: DockerClient> ScanRegistry<D> {
    /// 실행 중인 컨테이너를 등록하고 이벤트 수신을 시작합니다.
    ///
    /// 이미 추적 중인 컨테이너는 그대로 두며, 컨테이너별 시작 알림 대신
    /// 스캔 대상 요약 알림 하나를 보냅니다. 이벤트 리스너는 한 번만 시작됩니다.
    ///
    /// # Errors
    ///
    /// 컨테이너 목록 조회 실패 시 에러를 반환합니다.
    pub async fn start_all(&self) -> Result<usize, ScannerError> {
        let containers = self.inner.docker.list_running().await?;
        let total = containers.len();

        let mut observed = Vec::new();
        for container in containers {
            if self.inner.filter.should_ignore(&container) {
                debug!(container_id = container.short_id(), name = %container.name, "container filtered out");
                continue;
            }
            if self.start_if_absent(container.clone()).is_none() {
                debug!(container_id = container.short_id(), "container already tracked");
            }
            observed.push(container);
        }

        info!(running = total, scanning = observed.len(), "initial container scan complete");
        let count = observed.len();
        self.inner
            .notifier
            .notify(Notification::containers_observed(observed));

        self.spawn_event_listener();
        Ok(count)
    }

    /// 라이프사이클 이벤트 하나를 처리합니다.
    pub async fn handle_event(&self, event: LifecycleEvent) {
        match event.kind {
            LifecycleKind::Start => {
                let container = match self.inner.docker.inspect(&event.container_id).await {
                    Ok(container) => container,
                    Err(e) => {
                        warn!(container_id = %event.container_id, error = %e, "failed to inspect started container");
                        return;
                    }
                };
                if self.inner.filter.should_ignore(&container) {
                    debug!(container_id = container.short_id(), name = %container.name, "started container filtered out");
                    return;
                }
                if self.start_or_replace(container.clone()).is_cancelled() {
                    return;
                }
                info!(container_id = container.short_id(), name = %container.name, "container started");
                self.inner
                    .notifier
                    .notify(Notification::container_started(container));
            }
            LifecycleKind::Die | LifecycleKind::Destroy => {
                if let Some(container) = self.stop_scanner(&event.container_id) {
                    info!(container_id = container.short_id(), name = %container.name, "container stopped");
                    self.inner
                        .notifier
                        .notify(Notification::container_stopped(container));
                }
            }
            LifecycleKind::Other(action) => {
                debug!(action = %action, container_id = %event.container_id, "ignoring lifecycle event");
            }
        }
    }

    /// 스캐너를 시작합니다. 같은 ID의 기존 스캐너는 먼저 취소됩니다.
    ///
    /// 새 스캐너의 취소 토큰을 반환합니다. `stop_all` 이후에는 이미 취소된 토큰이 반환됩니다.
    pub fn start_or_replace(&self, container: ContainerIdentity) -> CancellationToken {
        let (token, replaced) = self.insert(container.clone(), true);
        if let Some(old) = replaced {
            debug!(container_id = container.short_id(), old_generation = old.generation, "replacing tracked scanner");
            old.token.cancel();
        }
        token.unwrap_or_else(|| {
            let token = CancellationToken::new();
            token.cancel();
            token
        })
    }

    /// 추적 중이 아닐 때만 스캐너를 시작합니다.
    ///
    /// 새로 시작했으면 취소 토큰을, 이미 추적 중이거나 종료 중이면 `None`을 반환합니다.
    pub fn start_if_absent(&self, container: ContainerIdentity) -> Option<CancellationToken> {
        self.insert(container, false).0
    }

    /// 스캐너를 취소하고 맵에서 제거합니다. 워커 종료는 기다리지 않습니다.
    pub fn stop_scanner(&self, id: &str) -> Option<ContainerIdentity> {
        let entry = self.write_entries().remove(id)?;
        entry.token.cancel();
        Some(entry.container)
    }

    /// 모든 스캐너와 이벤트 리스너를 취소하고 전부 종료될 때까지 기다립니다.
    pub async fn stop_all(&self) {
        self.inner.root.cancel();
        let drained = self.write_entries().drain().count();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!(stopped = drained, "all log stream scanners stopped");
    }

    /// 추적 중인 컨테이너 ID 목록 (정렬됨)
    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.read_entries().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.read_entries().contains_key(id)
    }

    /// 실행 중인 워커와 리스너 수
    pub fn running_tasks(&self) -> usize {
        self.inner.tracker.len()
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.inner.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 항목을 등록하고 워커를 띄웁니다.
    ///
    /// `replace`가 false이고 이미 추적 중이면 아무것도 하지 않습니다.
    fn insert(
        &self,
        container: ContainerIdentity,
        replace: bool,
    ) -> (Option<CancellationToken>, Option<Entry>) {
        if self.inner.root.is_cancelled() {
            debug!(container_id = container.short_id(), "registry shutting down, not starting scanner");
            return (None, None);
        }

        let token = self.inner.root.child_token();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let replaced = {
            let mut entries = self.write_entries();
            if !replace && entries.contains_key(&container.id) {
                return (None, None);
            }
            entries.insert(
                container.id.clone(),
                Entry {
                    container: container.clone(),
                    generation,
                    token: token.clone(),
                },
            )
        };

        let registry = self.clone();
        let worker_token = token.clone();
        self.inner.tracker.spawn(async move {
            registry.run_worker(container, generation, worker_token).await;
        });

        (Some(token), replaced)
    }

    /// 해당 세대의 항목일 때만 제거합니다.
    fn remove_generation(&self, id: &str, generation: u64) -> bool {
        let mut entries = self.write_entries();
        match entries.get(id) {
            Some(entry) if entry.generation == generation => {
                entries.remove(id);
                true
            }
            _ => false,
        }
    }

    async fn run_worker(self, container: ContainerIdentity, generation: u64, token: CancellationToken) {
        gauge!(rattle_core::metrics::SCANNER_ACTIVE).increment(1.0);
        let mut scanner = StreamScanner::new(
            Arc::clone(&self.inner.docker),
            container.clone(),
            Arc::clone(&self.inner.handler),
            &self.inner.config,
        );
        let result = scanner.run(&token).await;
        gauge!(rattle_core::metrics::SCANNER_ACTIVE).decrement(1.0);

        let removed = self.remove_generation(&container.id, generation);
        match result {
            Ok(ScanExit::Cancelled) => {
                debug!(container_id = container.short_id(), generation, "scanner worker cancelled");
            }
            Ok(ScanExit::StreamEnded) => {
                if removed {
                    info!(container_id = container.short_id(), name = %container.name, "log stream closed by runtime");
                    self.inner
                        .notifier
                        .notify(Notification::container_stopped(container));
                }
            }
            Err(e) => {
                error!(container_id = container.short_id(), name = %container.name, error = %e, "log stream scanner stopped with error");
                if removed {
                    self.inner
                        .notifier
                        .notify(Notification::container_stopped_with_error(container, e.to_string()));
                }
            }
        }
    }

    fn spawn_event_listener(&self) {
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        let registry = self.clone();
        self.inner.tracker.spawn(async move {
            registry.listen_events().await;
        });
    }

    /// 이벤트 스트림을 구독합니다. 스트림이 실패하거나 끝나면 잠시 후 재동기화하고 다시 구독합니다.
    async fn listen_events(self) {
        let root = self.inner.root.clone();
        loop {
            let mut events = self.inner.docker.events();
            debug!("subscribed to container lifecycle events");
            loop {
                let next = tokio::select! {
                    biased;
                    _ = root.cancelled() => return,
                    next = events.next() => next,
                };
                match next {
                    Some(Ok(event)) => self.handle_event(event).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "lifecycle event stream failed");
                        break;
                    }
                    None => {
                        warn!("lifecycle event stream ended");
                        break;
                    }
                }
            }
            drop(events);

            tokio::select! {
                _ = root.cancelled() => return,
                _ = tokio::time::sleep(self.inner.config.event_reconnect_delay()) => {}
            }
            match self.resync().await {
                Ok(started) => info!(started, "resubscribing to lifecycle events"),
                Err(e) => warn!(error = %e, "container resync failed"),
            }
        }
    }

    /// 추적되지 않은 실행 중 스캔 대상 컨테이너의 스캐너를 시작합니다.
    async fn resync(&self) -> Result<usize, ScannerError> {
        let containers = self.inner.docker.list_running().await?;
        let mut started = 0;
        for container in containers {
            if self.inner.filter.should_ignore(&container) {
                continue;
            }
            if self.start_if_absent(container.clone()).is_some() {
                started += 1;
                self.inner
                    .notifier
                    .notify(Notification::container_started(container));
            }
        }
        Ok(started)
    }
}

/// 레지스트리 빌더
pub struct ScanRegistryBuilder<D: DockerClient> {
    config: ScannerConfig,
    docker: Option<Arc<D>>,
    filter: Option<ContainerFilter>,
    handler: Option<Arc<dyn LineHandler>>,
    notifier: Option<Arc<dyn Notifier>>,
    root: Option<CancellationToken>,
}

impl<D: DockerClient> ScanRegistryBuilder<D> {
    pub fn new() -> Self {
        Self {
            config: ScannerConfig::default(),
            docker: None,
            filter: None,
            handler: None,
            notifier: None,
            root: None,
        }
    }

    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn docker_client(mut self, docker: Arc<D>) -> Self {
        self.docker = Some(docker);
        self
    }

    pub fn filter(mut self, filter: ContainerFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// 라인 처리기를 설정합니다. 보통 [`LogClassifier`](crate::classifier::LogClassifier)입니다.
    pub fn line_handler(mut self, handler: Arc<dyn LineHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// 부모 취소 토큰을 설정합니다. 설정하지 않으면 새 토큰을 만듭니다.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.root = Some(token);
        self
    }

    /// 레지스트리를 빌드합니다.
    pub fn build(self) -> Result<ScanRegistry<D>, ScannerError> {
        self.config.validate()?;

        let docker = self.docker.ok_or_else(|| missing("docker_client"))?;
        let filter = self.filter.ok_or_else(|| missing("filter"))?;
        let handler = self.handler.ok_or_else(|| missing("line_handler"))?;
        let notifier = self.notifier.ok_or_else(|| missing("notifier"))?;

        Ok(ScanRegistry {
            inner: Arc::new(Inner {
                docker,
                filter,
                handler,
                notifier,
                config: self.config,
                root: self.root.unwrap_or_default(),
                tracker: TaskTracker::new(),
                entries: RwLock::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                listening: AtomicBool::new(false),
            }),
        })
    }
}

impl<D: DockerClient> Default for ScanRegistryBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(field: &str) -> ScannerError {
    ScannerError::Config {
        field: field.to_owned(),
        reason: format!("{field} must be provided"),
    }
}
