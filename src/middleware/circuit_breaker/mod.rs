//! 회로 차단기 미들웨어
//!
//! 조건식이 참이 되면 `fallback_duration` 동안 백엔드를 호출하지 않고
//! 대체 응답을 돌려줍니다. 이후 `recovery_duration` 동안 통과 비율을
//! 점차 높이며 회복합니다.

mod expression;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hyper::{Request, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use expression::{CompareOp, Expression, ExpressionError, Metric};
pub use metrics::{is_network_error, RollingMetrics, Snapshot};

use super::capture::{Capture, CaptureWriter};
use super::error::BuildError;
use super::handler::{Body, BoxHandler, Handler};
use super::writer::{write_status, ResponseWriter};
use crate::dynamic::CircuitBreakerConfig;

const METRICS_BUCKETS: usize = 10;
const METRICS_BUCKET_WIDTH: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Standby,
    Tripped { until: Instant },
    Recovering { since: Instant },
}

struct BreakerState {
    phase: Phase,
    metrics: RollingMetrics,
    last_check: Option<Instant>,
}

pub struct CircuitBreaker {
    next: BoxHandler,
    expression: Expression,
    fallback_status: StatusCode,
    check_period: Duration,
    fallback_duration: Duration,
    recovery_duration: Duration,
    state: Mutex<BreakerState>,
    name: String,
}

pub fn new(next: BoxHandler, config: &CircuitBreakerConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "circuitBreaker", expression = %config.expression, "미들웨어 생성");

    let expression = Expression::parse(&config.expression)
        .map_err(|e| BuildError::invalid(name, format!("invalid expression {:?}: {}", config.expression, e)))?;
    let fallback_status = StatusCode::from_u16(config.response_code)
        .map_err(|e| BuildError::invalid(name, e.to_string()))?;

    Ok(Arc::new(CircuitBreaker {
        next,
        expression,
        fallback_status,
        check_period: config.check_period,
        fallback_duration: config.fallback_duration,
        recovery_duration: config.recovery_duration,
        state: Mutex::new(BreakerState {
            phase: Phase::Standby,
            metrics: RollingMetrics::new(METRICS_BUCKETS, METRICS_BUCKET_WIDTH),
            last_check: None,
        }),
        name: name.to_string(),
    }))
}

impl CircuitBreaker {
    /// 요청을 백엔드로 보낼지 결정합니다.
    async fn admit(&self, now: Instant) -> bool {
        let mut state = self.state.lock().await;

        if let Phase::Tripped { until } = state.phase {
            if now < until {
                return false;
            }
            info!(middleware = %self.name, "회로 회복 시작");
            state.phase = Phase::Recovering { since: now };
        }

        match state.phase {
            Phase::Recovering { since } => {
                let elapsed = now.saturating_duration_since(since);
                if elapsed >= self.recovery_duration {
                    info!(middleware = %self.name, "회로 정상 상태로 복귀");
                    state.phase = Phase::Standby;
                    state.metrics.reset();
                    return true;
                }
                let ratio = elapsed.as_secs_f64() / self.recovery_duration.as_secs_f64();
                rand::random::<f64>() < ratio
            }
            _ => true,
        }
    }

    /// 응답을 기록하고 주기가 되었으면 조건식을 평가합니다.
    async fn observe(&self, code: u16, latency: Duration) {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.metrics.record(now, code, latency);

        if matches!(state.phase, Phase::Tripped { .. }) {
            return;
        }
        if state
            .last_check
            .is_some_and(|last| now.saturating_duration_since(last) < self.check_period)
        {
            return;
        }
        state.last_check = Some(now);

        let snapshot = state.metrics.snapshot(now);
        if self.expression.evaluate(&snapshot) {
            warn!(
                middleware = %self.name,
                requests = snapshot.total(),
                fallback = ?self.fallback_duration,
                "회로 차단"
            );
            state.phase = Phase::Tripped {
                until: now + self.fallback_duration,
            };
            state.metrics.reset();
        }
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }
}

#[async_trait]
impl Handler for CircuitBreaker {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        if !self.admit(Instant::now()).await {
            debug!(middleware = %self.name, "회로 차단 중, 대체 응답");
            write_status(w, self.fallback_status).await;
            return;
        }

        let capture = Capture::new();
        let started = Instant::now();
        {
            let mut writer = CaptureWriter::new(w, capture.clone());
            self.next.serve(&mut writer, req).await;
        }
        self.observe(capture.status().as_u16(), started.elapsed()).await;
    }
}
