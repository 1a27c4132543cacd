//! Daemon assembly, startup ordering and graceful shutdown.
//!
//! The [`Orchestrator`] wires the configuration store, caches, container
//! runtime client, scan registry, change watcher and notification dispatcher.
//!
//! # Startup Order
//!
//! 1. Configuration store (memory or PostgreSQL) and initial cache load
//! 2. Docker connection check
//! 3. Notification dispatcher, then the `ProcessStarted` notification
//! 4. Change watcher
//! 5. Scan registry (`start_all`)
//!
//! # Shutdown Order
//!
//! 1. Scan registry (cancel and drain every scanner and the event listener)
//! 2. Change watcher
//! 3. `ProcessShuttingDown` notification
//! 4. Dispatcher (drains queued notifications)

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use rattle_core::config::{RattleConfig, STORE_BACKEND_POSTGRES};
use rattle_core::error::{ConfigError, RattleError};
use rattle_core::notification::Notification;
use rattle_log_scanner::store::seed_memory_store;
use rattle_log_scanner::{
    BollardDockerClient, ChangeWatcher, ChannelNotifier, ConfigStore, ContainerFilter,
    ContainerRuleCache, DockerClient, LogClassifier, MemoryConfigStore, ModeCache, Notifier,
    PatternCache, PgConfigStore, Reload, Resource, ScanRegistryBuilder, ScannerConfig,
    TargetCache,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::metrics_server;
use crate::telegram::{LogSender, MessageSender, TelegramSender};

/// Load configuration from `path`, falling back to defaults when the file is missing.
///
/// Environment overrides are applied in both cases.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or validation fails.
pub async fn load_config(path: &Path) -> Result<RattleConfig> {
    match RattleConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(RattleError::Config(ConfigError::FileNotFound { path })) => {
            tracing::warn!(path = %path, "config file not found, using defaults");
            let mut config = RattleConfig::default();
            config.apply_env_overrides();
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
            Ok(config)
        }
        Err(e) => Err(anyhow::anyhow!("failed to load config: {}", e)),
    }
}

/// The configuration caches shared by the scanner components.
#[derive(Clone)]
pub struct Caches {
    pub targets: Arc<TargetCache>,
    pub rules: Arc<ContainerRuleCache>,
    pub patterns: Arc<PatternCache>,
    pub mode: Arc<ModeCache>,
}

impl Caches {
    pub fn new(store: &Arc<dyn ConfigStore>) -> Self {
        Self {
            targets: Arc::new(TargetCache::new(Arc::clone(store))),
            rules: Arc::new(ContainerRuleCache::new(Arc::clone(store))),
            patterns: Arc::new(PatternCache::new(Arc::clone(store))),
            mode: Arc::new(ModeCache::new(Arc::clone(store))),
        }
    }

    /// Caches paired with the store resource that feeds them.
    pub fn watched(&self) -> Vec<(Resource, Arc<dyn Reload>)> {
        vec![
            (Resource::NotificationTargets, Arc::clone(&self.targets) as Arc<dyn Reload>),
            (Resource::ContainerRules, Arc::clone(&self.rules) as Arc<dyn Reload>),
            (Resource::PatternRules, Arc::clone(&self.patterns) as Arc<dyn Reload>),
            (Resource::FilterMode, Arc::clone(&self.mode) as Arc<dyn Reload>),
        ]
    }

    /// Load every cache once. Any failure is fatal at startup.
    ///
    /// # Errors
    ///
    /// Returns the first reload error.
    pub async fn load_all(&self) -> Result<()> {
        for (_, cache) in self.watched() {
            cache
                .reload()
                .await
                .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cache.name(), e))?;
        }
        tracing::info!(
            targets = self.targets.active_ids().len(),
            container_rules = self.rules.rules().len(),
            patterns = self.patterns.patterns().include_count(),
            mode = self.mode.mode().as_str(),
            "configuration caches loaded"
        );
        Ok(())
    }

    pub fn filter(&self) -> ContainerFilter {
        ContainerFilter::new(Arc::clone(&self.mode), Arc::clone(&self.rules))
    }
}

/// Build the configuration store selected by `[store] backend`.
///
/// # Errors
///
/// Returns an error if the database is unreachable, migrations fail,
/// or the seed data is invalid.
pub async fn build_store(config: &RattleConfig) -> Result<Arc<dyn ConfigStore>> {
    if config.store.backend == STORE_BACKEND_POSTGRES {
        let store = PgConfigStore::connect(&config.store.database_url, config.store.max_connections)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to database: {}", e))?;
        if config.store.run_migrations {
            store
                .migrate()
                .await
                .map_err(|e| anyhow::anyhow!("failed to run migrations: {}", e))?;
        }
        tracing::info!("using postgres configuration store");
        return Ok(Arc::new(store));
    }

    let store = MemoryConfigStore::new();
    seed_memory_store(&store, &config.seed)
        .map_err(|e| anyhow::anyhow!("failed to seed memory store: {}", e))?;
    tracing::info!("using in-memory configuration store");
    Ok(Arc::new(store))
}

/// Spawn the dispatcher task for the given sender.
pub fn spawn_dispatcher<S: MessageSender>(
    dispatcher: Dispatcher<S>,
    token: CancellationToken,
) -> JoinHandle<u64> {
    tokio::spawn(dispatcher.run(token))
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: RattleConfig,
    start_time: Instant,
}

impl Orchestrator {
    /// Validate the configuration and install the metrics recorder if enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the metrics endpoint cannot be bound.
    pub fn build_from_config(config: RattleConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        ScannerConfig::from_core(&config.scanner, &config.watcher)
            .validate()
            .map_err(|e| anyhow::anyhow!("scanner config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        Ok(Self {
            config,
            start_time: Instant::now(),
        })
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &RattleConfig {
        &self.config
    }

    /// Start every component and block until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if any fatal startup step fails.
    pub async fn run(&mut self) -> Result<()> {
        let store = build_store(&self.config).await?;
        let caches = Caches::new(&store);
        caches.load_all().await?;

        let docker = Arc::new(
            BollardDockerClient::connect(&self.config.docker)
                .map_err(|e| anyhow::anyhow!("failed to create docker client: {}", e))?,
        );
        docker
            .ping()
            .await
            .map_err(|e| anyhow::anyhow!("docker daemon unreachable: {}", e))?;
        tracing::info!(socket = %self.config.docker.socket, "connected to docker");

        let (notifier, rx) = ChannelNotifier::channel(self.config.notifier.channel_capacity);
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);

        let dispatch_token = CancellationToken::new();
        let dispatcher_task = if self.config.notifier.telegram_token.is_empty() {
            tracing::warn!("telegram token not configured, notifications are only logged");
            spawn_dispatcher(
                Dispatcher::new(rx, Arc::new(LogSender), Arc::clone(&caches.targets)),
                dispatch_token.clone(),
            )
        } else {
            let sender = TelegramSender::from_config(&self.config.notifier)?;
            spawn_dispatcher(
                Dispatcher::new(rx, Arc::new(sender), Arc::clone(&caches.targets)),
                dispatch_token.clone(),
            )
        };

        notifier.notify(Notification::process_started(&self.config.general.environment));

        let root = CancellationToken::new();
        let scanner_config = ScannerConfig::from_core(&self.config.scanner, &self.config.watcher);

        let watcher_token = root.child_token();
        let watcher = caches.watched().into_iter().fold(
            ChangeWatcher::new(
                Arc::clone(&store),
                scanner_config.watch_interval(),
                scanner_config.initial_lookback(),
            ),
            |watcher, (resource, cache)| watcher.watch(resource, cache),
        );
        let watcher_task = tokio::spawn(watcher.run(watcher_token.clone()));

        let uptime_task = self.config.metrics.enabled.then(|| {
            tokio::spawn(metrics_server::run_uptime_updater(
                self.start_time,
                root.child_token(),
            ))
        });

        let classifier = LogClassifier::new(
            caches.filter(),
            Arc::clone(&caches.patterns),
            Arc::clone(&notifier),
        );
        let registry = ScanRegistryBuilder::new()
            .config(scanner_config)
            .docker_client(docker)
            .filter(caches.filter())
            .line_handler(Arc::new(classifier))
            .notifier(Arc::clone(&notifier))
            .cancellation_token(root.child_token())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build scan registry: {}", e))?;

        let startup = match registry.start_all().await {
            Ok(count) => {
                tracing::info!(containers = count, "rattle running");
                wait_for_shutdown_signal().await.map(|signal| {
                    tracing::info!(signal, "shutdown signal received");
                })
            }
            Err(e) => Err(anyhow::anyhow!("failed to start scanners: {}", e)),
        };

        registry.stop_all().await;
        root.cancel();
        if let Err(e) = watcher_task.await {
            tracing::error!(error = %e, "change watcher task failed");
        }
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        notifier.notify(Notification::process_shutting_down());
        dispatch_token.cancel();
        match dispatcher_task.await {
            Ok(processed) => tracing::debug!(processed, "dispatcher drained"),
            Err(e) => tracing::error!(error = %e, "dispatcher task failed"),
        }

        tracing::info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "rattle-daemon shut down"
        );
        startup
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
