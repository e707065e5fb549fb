//! 엔트리포인트 관측 핸들러: access log, tracing span, metrics

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use hyper::http::request::Parts;
use hyper::Request;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::middleware::capture::Capture;
use crate::middleware::handler::{Body, BoxError, BoxHandler, Handler};
use crate::middleware::retry::RetryListener;
use crate::middleware::source::request_host;
use crate::middleware::writer::ResponseWriter;

pub const ACCESS_LOG_TARGET: &str = "access_log";

/// 요청 하나에서 일어난 재시도 횟수 (요청 extension)
#[derive(Debug, Clone, Default)]
pub struct RetryAttempts(Arc<AtomicU32>);

impl RetryAttempts {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    fn record(&self, attempt: u32) {
        self.0.fetch_max(attempt, Ordering::Relaxed);
    }
}

/// 재시도 횟수를 access log로 넘기는 리스너
#[derive(Debug, Default)]
pub struct AccessLogRetryListener;

impl RetryListener for AccessLogRetryListener {
    fn retried(&self, req: &Parts, attempt: u32) -> Result<(), BoxError> {
        if let Some(attempts) = req.extensions.get::<RetryAttempts>() {
            attempts.record(attempt);
        }
        Ok(())
    }
}

/// 서비스 재시도 횟수 카운터를 올리는 리스너
#[derive(Debug, Default)]
pub struct MetricsRetryListener;

impl RetryListener for MetricsRetryListener {
    fn retried(&self, req: &Parts, _attempt: u32) -> Result<(), BoxError> {
        metrics::counter!("proxy_service_retries_total", "method" => req.method.to_string())
            .increment(1);
        Ok(())
    }
}

/// 요청마다 한 줄의 access log를 남깁니다.
pub struct AccessLog {
    next: BoxHandler,
}

impl AccessLog {
    pub fn wrap(next: BoxHandler) -> BoxHandler {
        Arc::new(Self { next })
    }
}

#[async_trait]
impl Handler for AccessLog {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let start = Instant::now();
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let host = request_host(&req);
        let capture = Capture::from_request(&req).ok();
        let attempts = RetryAttempts::default();
        req.extensions_mut().insert(attempts.clone());

        self.next.serve(w, req).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        let (status, request_size, response_size) = match &capture {
            Some(c) => (c.status().as_u16(), c.request_size(), c.response_size()),
            None => (0, 0, 0),
        };

        if status >= 500 {
            warn!(
                target: ACCESS_LOG_TARGET,
                method = %method,
                path = %path,
                host = %host,
                status,
                request_size,
                response_size,
                duration_ms,
                retry_attempts = attempts.get(),
                "요청 처리 완료"
            );
        } else {
            info!(
                target: ACCESS_LOG_TARGET,
                method = %method,
                path = %path,
                host = %host,
                status,
                request_size,
                response_size,
                duration_ms,
                retry_attempts = attempts.get(),
                "요청 처리 완료"
            );
        }
    }
}

/// 요청을 `entry_point` span으로 감쌉니다.
pub struct Tracing {
    next: BoxHandler,
    entry_point: String,
}

impl Tracing {
    pub fn wrap(next: BoxHandler, entry_point: &str) -> BoxHandler {
        Arc::new(Self {
            next,
            entry_point: entry_point.to_string(),
        })
    }
}

#[async_trait]
impl Handler for Tracing {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let span = tracing::info_span!(
            "entry_point",
            name = %self.entry_point,
            request_id = %Uuid::new_v4(),
            method = %req.method(),
            path = %req.uri().path(),
        );
        self.next.serve(w, req).instrument(span).await;
    }
}

/// 엔트리포인트 요청 수, 처리 시간, 바이트 수를 기록합니다.
pub struct Metrics {
    next: BoxHandler,
    entry_point: String,
}

impl Metrics {
    pub fn wrap(next: BoxHandler, entry_point: &str) -> BoxHandler {
        Arc::new(Self {
            next,
            entry_point: entry_point.to_string(),
        })
    }
}

#[async_trait]
impl Handler for Metrics {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let start = Instant::now();
        let method = req.method().to_string();
        let capture = Capture::from_request(&req).ok();

        self.next.serve(w, req).await;

        let code = capture
            .as_ref()
            .map(|c| c.status().as_u16())
            .unwrap_or_default()
            .to_string();
        let entry_point = self.entry_point.clone();

        metrics::counter!(
            "proxy_entrypoint_requests_total",
            "entrypoint" => entry_point.clone(),
            "method" => method.clone(),
            "code" => code.clone()
        )
        .increment(1);
        metrics::histogram!(
            "proxy_entrypoint_request_duration_seconds",
            "entrypoint" => entry_point.clone(),
            "method" => method,
            "code" => code
        )
        .record(start.elapsed().as_secs_f64());

        if let Some(capture) = capture {
            metrics::counter!("proxy_entrypoint_requests_bytes_total", "entrypoint" => entry_point.clone())
                .increment(capture.request_size());
            metrics::counter!("proxy_entrypoint_responses_bytes_total", "entrypoint" => entry_point)
                .increment(capture.response_size());
        }
    }
}
