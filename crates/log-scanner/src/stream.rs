//! 스트림 스캐너 — 컨테이너 하나의 로그를 따라 읽는 재연결 루프
//!
//! 세션 하나는 `since` 워터마크부터 로그를 따라 읽습니다.
//! 세션이 일시적으로 실패하면 고정 간격으로 대기한 뒤 워터마크를 현재 시각의
//! 다음 정초로 앞당겨 재연결합니다. 워터마크는 뒤로 가지 않으므로 이미 전달한
//! 라인은 다시 전달되지 않습니다 (연결 공백 동안의 라인은 유실될 수 있음).
//!
//! 첫 연결은 워터마크가 속한 초의 시작부터 읽으므로, 스캐너 생성 직후 기록된
//! 라인도 빠지지 않습니다.
//!
//! # 종료 조건
//!
//! | 상황 | 결과 |
//! |---|---|
//! | 취소 (읽기/대기 중) | `Ok(ScanExit::Cancelled)` |
//! | 스트림 정상 종료 | `Ok(ScanExit::StreamEnded)` |
//! | 재시도 한도 초과 | `Err(ScannerError::RetriesExhausted)` |

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::StreamExt;
use metrics::counter;
use rattle_core::types::ContainerIdentity;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::docker::{DockerClient, round_up_to_secs};
use crate::error::ScannerError;
use crate::line::{LineSplitter, clean_line};

/// 정리된 로그 라인을 받는 쪽
pub trait LineHandler: Send + Sync + 'static {
    /// 비어 있지 않은 정리된 라인 하나를 처리합니다.
    fn handle_line(&self, container: &ContainerIdentity, line: &str);
}

/// 스캐너 정상 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanExit {
    /// 취소 토큰에 의해 중단
    Cancelled,
    /// 런타임이 스트림을 닫음 (컨테이너 종료)
    StreamEnded,
}

/// 세션 하나의 결과
enum SessionEnd {
    Cancelled,
    Eof,
    Failed { error: ScannerError, delivered: u64 },
}

/// 컨테이너 하나의 로그 스트림 스캐너
pub struct StreamScanner<D: DockerClient> {
    docker: Arc<D>,
    container: ContainerIdentity,
    handler: Arc<dyn LineHandler>,
    since: SystemTime,
    failures: u32,
    reconnect_delay: Duration,
    max_retries: u32,
    max_line_bytes: usize,
}

impl<D: DockerClient> StreamScanner<D> {
    /// 현재 시각을 워터마크로 하는 스캐너를 생성합니다.
    pub fn new(
        docker: Arc<D>,
        container: ContainerIdentity,
        handler: Arc<dyn LineHandler>,
        config: &ScannerConfig,
    ) -> Self {
        Self {
            docker,
            container,
            handler,
            since: SystemTime::now(),
            failures: 0,
            reconnect_delay: config.reconnect_delay(),
            max_retries: config.max_retries,
            max_line_bytes: config.max_line_bytes,
        }
    }

    /// 시작 워터마크를 지정합니다.
    pub fn with_since(mut self, since: SystemTime) -> Self {
        self.since = since;
        self
    }

    pub fn container(&self) -> &ContainerIdentity {
        &self.container
    }

    /// 다음 연결에 사용할 워터마크
    pub fn watermark(&self) -> SystemTime {
        self.since
    }

    /// 현재 연속 실패 횟수
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// 취소되거나 스트림이 끝나거나 재시도 한도를 넘을 때까지 실행합니다.
    pub async fn run(&mut self, token: &CancellationToken) -> Result<ScanExit, ScannerError> {
        let container_id = self.container.short_id().to_owned();
        info!(container_id = %container_id, name = %self.container.name, "log stream scanner started");

        loop {
            if token.is_cancelled() {
                return Ok(ScanExit::Cancelled);
            }

            let (error, delivered) = match self.session(token).await {
                SessionEnd::Cancelled => {
                    debug!(container_id = %container_id, "log stream cancelled");
                    return Ok(ScanExit::Cancelled);
                }
                SessionEnd::Eof => {
                    info!(container_id = %container_id, "log stream ended");
                    return Ok(ScanExit::StreamEnded);
                }
                SessionEnd::Failed { error, delivered } => (error, delivered),
            };

            // 라인을 전달한 세션 뒤의 실패는 새 연속 실패로 셉니다.
            if delivered > 0 {
                self.failures = 0;
            }
            self.failures = self.failures.saturating_add(1);
            counter!(rattle_core::metrics::SCANNER_FAILURES_TOTAL).increment(1);

            if self.max_retries > 0 && self.failures > self.max_retries {
                return Err(ScannerError::RetriesExhausted {
                    container_id: self.container.id.clone(),
                    attempts: self.failures,
                    last_error: error.to_string(),
                });
            }

            warn!(
                container_id = %container_id,
                attempt = self.failures,
                error = %error,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "log stream failed, reconnecting"
            );

            tokio::select! {
                _ = token.cancelled() => {
                    debug!(container_id = %container_id, "cancelled during reconnect backoff");
                    return Ok(ScanExit::Cancelled);
                }
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }

            self.since = round_up_to_secs(self.since.max(SystemTime::now()));
            counter!(rattle_core::metrics::SCANNER_RECONNECTS_TOTAL).increment(1);
        }
    }

    async fn session(&mut self, token: &CancellationToken) -> SessionEnd {
        let mut stream = self.docker.stream_logs(&self.container.id, self.since);
        let mut splitter = LineSplitter::new(self.max_line_bytes);
        let mut delivered = 0u64;

        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => return SessionEnd::Cancelled,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(chunk)) => {
                    for line in splitter.push(chunk.stream, &chunk.bytes) {
                        if token.is_cancelled() {
                            return SessionEnd::Cancelled;
                        }
                        if self.forward(&line) {
                            delivered += 1;
                        }
                    }
                }
                Some(Err(error)) => return SessionEnd::Failed { error, delivered },
                None => {
                    for line in splitter.finish() {
                        if token.is_cancelled() {
                            return SessionEnd::Cancelled;
                        }
                        self.forward(&line);
                    }
                    return SessionEnd::Eof;
                }
            }
        }
    }

    fn forward(&self, raw: &str) -> bool {
        let line = clean_line(raw);
        if line.is_empty() {
            return false;
        }
        counter!(rattle_core::metrics::SCANNER_LINES_TOTAL).increment(1);
        self.handler.handle_line(&self.container, line);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::ScannerConfigBuilder;
    use std::time::UNIX_EPOCH;

    use crate::docker::{LogChunk, MockDockerClient, since_unix_secs};

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl Lines {
        fn all(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl LineHandler for Lines {
        fn handle_line(&self, _container: &ContainerIdentity, line: &str) {
            self.0.lock().unwrap().push(line.to_owned());
        }
    }

    fn web() -> ContainerIdentity {
        ContainerIdentity::new("c0ffee000000111122223333", "web-1", "app:latest")
    }

    fn config(delay: Duration, max_retries: u32) -> ScannerConfig {
        ScannerConfigBuilder::new()
            .reconnect_delay(delay)
            .max_retries(max_retries)
            .build()
            .unwrap()
    }

    fn stream_error(reason: &str) -> Result<LogChunk, ScannerError> {
        Err(ScannerError::Stream {
            container_id: web().id,
            reason: reason.to_owned(),
        })
    }

    fn scanner(
        docker: &Arc<MockDockerClient>,
        lines: &Arc<Lines>,
        config: &ScannerConfig,
    ) -> StreamScanner<MockDockerClient> {
        StreamScanner::new(
            Arc::clone(docker),
            web(),
            Arc::clone(lines) as Arc<dyn LineHandler>,
            config,
        )
    }

    #[tokio::test]
    async fn lines_are_cleaned_and_blank_lines_dropped() {
        let docker = Arc::new(MockDockerClient::new());
        docker.push_session(
            &web().id,
            vec![
                Ok(LogChunk::stdout("  hello\u{200B}\r\n\n   \nwor")),
                Ok(LogChunk::stderr("\u{00A0}oops\n")),
                Ok(LogChunk::stdout("ld\u{202F}")),
            ],
        );
        let lines = Arc::new(Lines::default());
        let mut scanner = scanner(&docker, &lines, &ScannerConfig::default());

        let exit = scanner.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(exit, ScanExit::StreamEnded);
        assert_eq!(lines.all(), vec!["hello", "oops", "world"]);
    }

    #[tokio::test]
    async fn watermark_advances_past_failure() {
        let docker = Arc::new(MockDockerClient::new());
        let id = web().id;
        docker.push_session(&id, vec![Ok(LogChunk::stdout("first\n")), stream_error("reset")]);
        docker.push_session(&id, vec![Ok(LogChunk::stdout("second\n"))]);
        let lines = Arc::new(Lines::default());
        let start = SystemTime::now();
        let mut scanner =
            scanner(&docker, &lines, &config(Duration::from_millis(20), 0)).with_since(start);

        let exit = scanner.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(exit, ScanExit::StreamEnded);
        assert_eq!(lines.all(), vec!["first", "second"]);

        let requests = docker.log_requests();
        let failures = docker.failure_times();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].1, start);
        assert!(requests[1].1 > failures[0]);
        assert_eq!(
            requests[1].1.duration_since(UNIX_EPOCH).unwrap().subsec_nanos(),
            0
        );
        assert_eq!(scanner.watermark(), requests[1].1);
    }

    #[tokio::test]
    async fn first_session_starts_at_watermark_second() {
        let docker = Arc::new(MockDockerClient::new());
        docker.push_session(&web().id, vec![Ok(LogChunk::stdout("booting\n"))]);
        let lines = Arc::new(Lines::default());
        let created = UNIX_EPOCH + Duration::from_millis(10_300);
        let mut scanner =
            scanner(&docker, &lines, &ScannerConfig::default()).with_since(created);

        scanner.run(&CancellationToken::new()).await.unwrap();

        // 10.5초에 기록된 라인이 포함되려면 since가 10 이하여야 합니다.
        let requests = docker.log_requests();
        assert_eq!(requests[0].1, created);
        assert_eq!(since_unix_secs(requests[0].1), 10);
        assert_eq!(lines.all(), vec!["booting"]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhausted_after_ceiling() {
        let docker = Arc::new(MockDockerClient::new());
        for _ in 0..3 {
            docker.push_session(&web().id, vec![stream_error("refused")]);
        }
        let lines = Arc::new(Lines::default());
        let mut scanner = scanner(&docker, &lines, &config(Duration::from_secs(1), 2));

        let err = scanner.run(&CancellationToken::new()).await.unwrap_err();
        match err {
            ScannerError::RetriesExhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(docker.log_requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delivered_lines_reset_failure_count() {
        let docker = Arc::new(MockDockerClient::new());
        let id = web().id;
        docker.push_session(&id, vec![stream_error("a")]);
        docker.push_session(&id, vec![Ok(LogChunk::stdout("ok\n")), stream_error("b")]);
        docker.push_session(&id, vec![]);
        let lines = Arc::new(Lines::default());
        let mut scanner = scanner(&docker, &lines, &config(Duration::from_secs(1), 1));

        let exit = scanner.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(exit, ScanExit::StreamEnded);
        assert_eq!(scanner.failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_counts_consecutive_failures_only() {
        let docker = Arc::new(MockDockerClient::new());
        let id = web().id;
        for i in 0..4 {
            docker.push_session(
                &id,
                vec![Ok(LogChunk::stdout(format!("line {i}\n"))), stream_error("reset")],
            );
        }
        docker.push_session(&id, vec![stream_error("refused")]);
        let lines = Arc::new(Lines::default());
        let mut scanner = scanner(&docker, &lines, &config(Duration::from_secs(1), 1));

        // 부분 성공한 세션 네 번은 한도 1을 넘기지 않고, 그 뒤 연속 두 번째 실패에서 멈춥니다.
        let err = scanner.run(&CancellationToken::new()).await.unwrap_err();
        match err {
            ScannerError::RetriesExhausted { attempts, last_error, .. } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(lines.all().len(), 4);
        assert_eq!(docker.log_requests().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_returns_promptly() {
        let docker = Arc::new(MockDockerClient::new());
        docker.push_session(&web().id, vec![stream_error("reset")]);
        let lines = Arc::new(Lines::default());
        let mut scanner = scanner(&docker, &lines, &config(Duration::from_secs(300), 0));
        let token = CancellationToken::new();

        let task = {
            let token = token.clone();
            tokio::spawn(async move { scanner.run(&token).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        let exit = task.await.unwrap().unwrap();
        assert_eq!(exit, ScanExit::Cancelled);
        assert_eq!(docker.log_requests().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_forwarding() {
        let docker = Arc::new(MockDockerClient::new());
        let tx = docker.live_session(&web().id);
        let lines = Arc::new(Lines::default());
        let mut scanner = scanner(&docker, &lines, &ScannerConfig::default());
        let token = CancellationToken::new();

        let task = {
            let token = token.clone();
            tokio::spawn(async move { scanner.run(&token).await })
        };

        tx.send(Ok(LogChunk::stdout("one\n"))).unwrap();
        while lines.all().is_empty() {
            tokio::task::yield_now().await;
        }
        token.cancel();
        assert_eq!(task.await.unwrap().unwrap(), ScanExit::Cancelled);

        let _ = tx.send(Ok(LogChunk::stdout("two\n")));
        assert_eq!(lines.all(), vec!["one"]);
    }
}
