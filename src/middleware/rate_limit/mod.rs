//! 요청 속도 제한 미들웨어
//!
//! 소스별 토큰 버킷으로 `average / period`의 평균 속도와 `burst` 만큼의
//! 순간 허용량을 적용합니다.

pub mod store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::header::{self, HeaderValue};
use hyper::{Request, StatusCode};
use tracing::debug;

use self::store::{RateLimitStore, Reservation, TokenBucketStore};
use super::error::BuildError;
use super::handler::{Body, BoxHandler, Handler};
use super::ip::IpStrategy;
use super::source::SourceExtractor;
use super::writer::{write_status, ResponseWriter};
use crate::dynamic::RateLimitConfig;

pub struct RateLimit {
    next: BoxHandler,
    /// 초당 토큰 수. `None`이면 제한 없음
    rate: Option<f64>,
    burst: f64,
    max_delay: Duration,
    extractor: SourceExtractor,
    store: Arc<dyn RateLimitStore>,
    name: String,
}

pub fn new(next: BoxHandler, config: &RateLimitConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "rateLimit", "미들웨어 생성");

    let extractor = SourceExtractor::from_config(
        config.source_criterion.as_ref(),
        SourceExtractor::Ip(IpStrategy::RemoteAddr),
    )
    .map_err(|e| BuildError::invalid(name, e.to_string()))?;

    let period = if config.period.is_zero() {
        Duration::from_secs(1)
    } else {
        config.period
    };
    let rate = (config.average > 0).then(|| config.average as f64 / period.as_secs_f64());

    Ok(Arc::new(RateLimit {
        next,
        rate,
        burst: config.burst.max(1) as f64,
        max_delay: rate.map(max_delay).unwrap_or_default(),
        extractor,
        store: Arc::new(TokenBucketStore::new()),
        name: name.to_string(),
    }))
}

/// 예약을 기다려 줄 수 있는 최대 시간
fn max_delay(rate: f64) -> Duration {
    if rate < 1.0 {
        Duration::from_millis(500)
    } else {
        Duration::from_secs_f64(1.0 / (2.0 * rate.floor()))
    }
}

#[async_trait]
impl Handler for RateLimit {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let Some(rate) = self.rate else {
            self.next.serve(w, req).await;
            return;
        };

        let source = self.extractor.extract(&req);
        match self.store.reserve(&source, rate, self.burst, self.max_delay).await {
            Reservation::Granted(delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.next.serve(w, req).await;
            }
            Reservation::Rejected(wait) => {
                debug!(middleware = %self.name, source = %source, wait = ?wait, "요청 속도 한도 초과");
                let retry_after = wait.as_secs_f64().ceil().max(1.0) as u64;
                let headers = w.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                if let Ok(value) = HeaderValue::from_str(&format!("{:?}", wait)) {
                    headers.insert("x-retry-in", value);
                }
                write_status(w, StatusCode::TOO_MANY_REQUESTS).await;
            }
        }
    }
}
