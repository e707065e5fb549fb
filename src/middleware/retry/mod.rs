//! 백엔드에 도달하지 못한 요청을 다시 시도하는 미들웨어
//!
//! 요청 본문은 한 번만 읽어 두고 시도마다 새 요청으로 재구성합니다. 백엔드
//! 디스패처가 요청을 보냈다는 신호(`AttemptTrace`)가 오면 그 시도의 응답은
//! 무엇이든 클라이언트로 전달됩니다.

mod backoff;
mod trace;
mod writer;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::http::request::Parts;
use hyper::{Request, StatusCode};
use tracing::{debug, warn};

pub use backoff::ExponentialBackoff;
pub use trace::AttemptTrace;

use self::writer::RetryWriter;
use super::error::BuildError;
use super::handler::{full_body, Body, BoxError, BoxHandler, Handler};
use super::writer::{write_error, ResponseWriter};
use crate::dynamic::RetryConfig;

/// 사용 가능한 백엔드가 없을 때의 응답 코드
///
/// 이 상태 코드로 플러시된 시도는 백엔드에 도달하지 않았다면 재시도
/// 대상으로 남습니다.
pub const NO_BACKEND_AVAILABLE: StatusCode = StatusCode::SERVICE_UNAVAILABLE;

/// 새 시도가 시작될 때 호출되는 리스너
pub trait RetryListener: Send + Sync {
    fn retried(&self, req: &Parts, attempt: u32) -> Result<(), BoxError>;
}

/// 여러 리스너를 순서대로 호출합니다. 실패는 로그만 남깁니다.
#[derive(Clone, Default)]
pub struct RetryListeners {
    listeners: Vec<Arc<dyn RetryListener>>,
}

impl RetryListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, listener: Arc<dyn RetryListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

impl RetryListener for RetryListeners {
    fn retried(&self, req: &Parts, attempt: u32) -> Result<(), BoxError> {
        for listener in &self.listeners {
            if let Err(e) = listener.retried(req, attempt) {
                warn!(error = %e, attempt, "재시도 리스너 실패");
            }
        }
        Ok(())
    }
}

pub struct Retry {
    next: BoxHandler,
    attempts: u32,
    initial_interval: Duration,
    listener: Arc<dyn RetryListener>,
    name: String,
}

pub fn new(
    next: BoxHandler,
    config: &RetryConfig,
    listener: Arc<dyn RetryListener>,
    name: &str,
) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "retry", "미들웨어 생성");

    if config.attempts <= 0 {
        return Err(BuildError::invalid(
            name,
            format!("incorrect (or empty) value for attempt ({})", config.attempts),
        ));
    }

    Ok(Arc::new(Retry {
        next,
        attempts: config.attempts as u32,
        initial_interval: config.initial_interval.unwrap_or(Duration::ZERO),
        listener,
        name: name.to_string(),
    }))
}

#[async_trait]
impl Handler for Retry {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        if self.attempts == 1 {
            self.next.serve(w, req).await;
            return;
        }

        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(middleware = %self.name, error = %e, "재시도를 위한 요청 본문 읽기 실패");
                write_error(w, StatusCode::BAD_REQUEST, "Bad Request").await;
                return;
            }
        };

        let mut backoff = ExponentialBackoff::new(self.attempts, self.initial_interval);
        let mut attempt: u32 = 1;

        loop {
            let reached = Arc::new(AtomicBool::new(false));
            let mut attempt_req = Request::from_parts(parts.clone(), full_body(body.clone()));
            AttemptTrace::attach(&mut attempt_req, reached.clone());

            let mut writer = RetryWriter::new(&mut *w, attempt < self.attempts, reached);
            self.next.serve(&mut writer, attempt_req).await;
            if !writer.finish().await {
                return;
            }

            attempt += 1;
            let delay = backoff.next_delay();
            match w.close_notify() {
                Some(notify) if notify.is_closed() => {
                    debug!(middleware = %self.name, "클라이언트 연결 종료로 재시도를 중단합니다");
                    return;
                }
                Some(notify) if !delay.is_zero() => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = notify.closed() => {
                            debug!(middleware = %self.name, "백오프 중 클라이언트 연결 종료");
                            return;
                        }
                    }
                }
                _ if !delay.is_zero() => tokio::time::sleep(delay).await,
                _ => {}
            }

            debug!(middleware = %self.name, attempt, uri = %parts.uri, "New attempt");
            if let Err(e) = self.listener.retried(&parts, attempt) {
                warn!(middleware = %self.name, error = %e, "재시도 리스너 실패");
            }
        }
    }
}
