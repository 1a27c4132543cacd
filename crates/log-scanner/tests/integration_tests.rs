//! 통합 테스트 -- 라이프사이클 이벤트부터 알림까지 전체 흐름 검증
//!
//! 컨테이너 시작 → 스캐너 등록 → 라인 분류 → 알림 → 컨테이너 종료
//! 시나리오를 실제 캐시, 분류기, 채널 알림 수신자로 테스트합니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use rattle_core::config::SeedConfig;
use rattle_core::notification::{Notification, NotificationKind};
use rattle_core::types::{ContainerIdentity, ContainerRule, FilterMode, RuleDimension};
use rattle_log_scanner::store::seed_memory_store;
use rattle_log_scanner::{
    ChangeWatcher, ChannelNotifier, ConfigStore, ContainerFilter, ContainerRuleCache,
    LifecycleEvent, LifecycleKind, LogChunk, LogClassifier, MemoryConfigStore, ModeCache,
    PatternCache, Reload, Resource, ScanRegistry, ScanRegistryBuilder, ScannerConfig,
    ScannerError,
};
use tokio::sync::mpsc;

// Mock Docker client for integration tests
mod mock {
    use futures_util::StreamExt;
    use futures_util::stream;
    use rattle_log_scanner::DockerClient;
    use rattle_log_scanner::docker::{EventStream, LogStream};

    use super::*;

    type LogItem = Result<LogChunk, ScannerError>;
    type EventItem = Result<LifecycleEvent, ScannerError>;

    #[derive(Default)]
    pub struct TestDockerClient {
        containers: Mutex<Vec<ContainerIdentity>>,
        sessions: Mutex<HashMap<String, mpsc::UnboundedReceiver<LogItem>>>,
        events: Mutex<Option<mpsc::UnboundedReceiver<EventItem>>>,
    }

    impl TestDockerClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_container(&self, container: ContainerIdentity) {
            self.containers.lock().unwrap().push(container);
        }

        /// 다음 로그 세션을 제어하는 송신자
        pub fn log_sender(&self, id: &str) -> mpsc::UnboundedSender<LogItem> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.sessions.lock().unwrap().insert(id.to_owned(), rx);
            tx
        }

        pub fn event_sender(&self) -> mpsc::UnboundedSender<EventItem> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.events.lock().unwrap() = Some(rx);
            tx
        }
    }

    impl DockerClient for TestDockerClient {
        async fn list_running(&self) -> Result<Vec<ContainerIdentity>, ScannerError> {
            Ok(self.containers.lock().unwrap().clone())
        }

        async fn inspect(&self, id: &str) -> Result<ContainerIdentity, ScannerError> {
            self.containers
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| ScannerError::ContainerNotFound(id.to_owned()))
        }

        fn stream_logs(&self, id: &str, _since: SystemTime) -> LogStream {
            match self.sessions.lock().unwrap().remove(id) {
                Some(rx) => stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed(),
                None => stream::pending::<LogItem>().boxed(),
            }
        }

        fn events(&self) -> EventStream {
            match self.events.lock().unwrap().take() {
                Some(rx) => stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed(),
                None => stream::pending::<EventItem>().boxed(),
            }
        }

        async fn ping(&self) -> Result<(), ScannerError> {
            Ok(())
        }
    }
}

use mock::TestDockerClient;

struct Engine {
    store: Arc<MemoryConfigStore>,
    registry: ScanRegistry<TestDockerClient>,
    rules: Arc<ContainerRuleCache>,
    notifications: mpsc::Receiver<Notification>,
}

async fn engine(docker: Arc<TestDockerClient>, seed: SeedConfig) -> Engine {
    let store = Arc::new(MemoryConfigStore::new());
    seed_memory_store(&store, &seed).unwrap();
    let dyn_store: Arc<dyn ConfigStore> = Arc::clone(&store) as Arc<dyn ConfigStore>;

    let mode = Arc::new(ModeCache::new(Arc::clone(&dyn_store)));
    let rules = Arc::new(ContainerRuleCache::new(Arc::clone(&dyn_store)));
    let patterns = Arc::new(PatternCache::new(Arc::clone(&dyn_store)));
    mode.reload().await.unwrap();
    rules.reload().await.unwrap();
    patterns.reload().await.unwrap();

    let (notifier, notifications) = ChannelNotifier::channel(64);
    let notifier = Arc::new(notifier);
    let filter = ContainerFilter::new(mode, Arc::clone(&rules));
    let classifier = LogClassifier::new(filter.clone(), patterns, notifier.clone());

    let registry = ScanRegistryBuilder::new()
        .config(ScannerConfig::default())
        .docker_client(docker)
        .filter(filter)
        .line_handler(Arc::new(classifier))
        .notifier(notifier)
        .build()
        .unwrap();

    Engine {
        store,
        registry,
        rules,
        notifications,
    }
}

fn no_rules_seed() -> SeedConfig {
    SeedConfig {
        exclude_self: false,
        ..SeedConfig::default()
    }
}

fn web1() -> ContainerIdentity {
    ContainerIdentity::new("0a1b2c3d4e5f60718293a4b5", "web-1", "app:latest")
}

async fn next(rx: &mut mpsc::Receiver<Notification>) -> NotificationKind {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification timeout")
        .expect("channel closed")
        .kind
}

async fn assert_quiet(rx: &mut mpsc::Receiver<Notification>) {
    let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "unexpected notification: {result:?}");
}

#[tokio::test]
async fn test_error_line_from_running_container_is_reported() {
    let docker = Arc::new(TestDockerClient::new());
    docker.add_container(web1());
    let logs = docker.log_sender(&web1().id);
    let events = docker.event_sender();
    let mut engine = engine(Arc::clone(&docker), no_rules_seed()).await;

    assert_eq!(engine.registry.start_all().await.unwrap(), 1);
    match next(&mut engine.notifications).await {
        NotificationKind::ContainersObserved { containers } => {
            assert_eq!(containers, vec![web1()]);
        }
        other => panic!("expected summary, got {other:?}"),
    }

    logs.send(Ok(LogChunk::stdout("GET / 200\n2024-01-01 ERROR boom\n")))
        .unwrap();
    match next(&mut engine.notifications).await {
        NotificationKind::LogEvent {
            container,
            event_type,
            line,
        } => {
            assert_eq!(container.name, "web-1");
            assert_eq!(event_type, "error");
            assert_eq!(line, "2024-01-01 ERROR boom");
        }
        other => panic!("expected log event, got {other:?}"),
    }

    events
        .send(Ok(LifecycleEvent::new(LifecycleKind::Die, web1().id, "web-1")))
        .unwrap();
    match next(&mut engine.notifications).await {
        NotificationKind::ContainerStopped { container } => assert_eq!(container.id, web1().id),
        other => panic!("expected stop, got {other:?}"),
    }
    assert!(!engine.registry.is_tracked(&web1().id));

    // 종료된 컨테이너의 라인은 더 이상 처리되지 않습니다.
    let _ = logs.send(Ok(LogChunk::stdout("ERROR after death\n")));
    assert_quiet(&mut engine.notifications).await;

    engine.registry.stop_all().await;
    assert_eq!(engine.registry.running_tasks(), 0);
}

#[tokio::test]
async fn test_self_exclusion_keeps_own_container_out() {
    let docker = Arc::new(TestDockerClient::new());
    docker.add_container(web1());
    docker.add_container(ContainerIdentity::new("ffff00001111", "rattle", "rattle:latest"));
    let mut engine = engine(Arc::clone(&docker), SeedConfig::default()).await;

    assert_eq!(engine.registry.start_all().await.unwrap(), 1);
    assert_eq!(engine.registry.tracked_ids(), vec![web1().id]);
    assert!(matches!(
        next(&mut engine.notifications).await,
        NotificationKind::ContainersObserved { .. }
    ));

    engine.registry.stop_all().await;
}

#[tokio::test]
async fn test_rule_change_applies_after_watcher_poll() {
    let docker = Arc::new(TestDockerClient::new());
    docker.add_container(web1());
    let logs = docker.log_sender(&web1().id);
    let mut engine = engine(Arc::clone(&docker), no_rules_seed()).await;
    engine.registry.start_all().await.unwrap();
    next(&mut engine.notifications).await;

    let mut watcher = ChangeWatcher::new(
        Arc::clone(&engine.store) as Arc<dyn ConfigStore>,
        Duration::from_secs(15),
        Duration::from_secs(300),
    )
    .watch(
        Resource::ContainerRules,
        Arc::clone(&engine.rules) as Arc<dyn Reload>,
    );
    watcher.check_once().await;

    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.store.add_container_rule(ContainerRule::new(
        RuleDimension::Name,
        "web",
        FilterMode::Blacklist,
    ));

    // 폴링 전에는 이전 스냅샷으로 분류
    logs.send(Ok(LogChunk::stdout("panic: nil map\n"))).unwrap();
    assert!(matches!(
        next(&mut engine.notifications).await,
        NotificationKind::LogEvent { .. }
    ));

    assert_eq!(watcher.check_once().await, 1);
    assert_eq!(engine.rules.rules().len(), 1);

    logs.send(Ok(LogChunk::stdout("panic: nil map\n"))).unwrap();
    assert_quiet(&mut engine.notifications).await;

    engine.registry.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_all_waits_for_every_scanner() {
    let docker = Arc::new(TestDockerClient::new());
    let mut senders = Vec::new();
    for i in 0..5 {
        let container = ContainerIdentity::new(format!("{i:012}"), format!("svc-{i}"), "svc:1");
        senders.push(docker.log_sender(&container.id));
        docker.add_container(container);
    }
    let mut engine = engine(Arc::clone(&docker), no_rules_seed()).await;

    assert_eq!(engine.registry.start_all().await.unwrap(), 5);
    // 5개 워커 + 이벤트 리스너
    assert_eq!(engine.registry.running_tasks(), 6);

    engine.registry.stop_all().await;
    assert_eq!(engine.registry.running_tasks(), 0);
    assert!(engine.registry.is_empty());

    // 취소로 멈춘 스캐너는 정지 알림을 보내지 않습니다.
    assert!(matches!(
        next(&mut engine.notifications).await,
        NotificationKind::ContainersObserved { .. }
    ));
    assert_quiet(&mut engine.notifications).await;
    drop(senders);
}
