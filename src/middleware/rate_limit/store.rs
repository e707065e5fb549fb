use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

/// 토큰 예약 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reservation {
    /// 지정한 시간만큼 기다린 뒤 처리할 수 있음
    Granted(Duration),
    /// 허용 지연을 넘음. 값은 다음 토큰까지 남은 시간
    Rejected(Duration),
}

/// 토큰 버킷 구현
///
/// 토큰이 음수가 될 수 있으며, 음수만큼이 앞선 예약으로 밀린 대기 시간입니다.
#[derive(Debug)]
struct TokenBucket {
    /// 현재 사용 가능한 토큰 수
    tokens: f64,
    /// 마지막 업데이트 시간
    last_update: Instant,
    /// 초당 보충되는 토큰 수 (rate)
    rate: f64,
    /// 최대 토큰 수 (capacity)
    capacity: f64,
}

impl TokenBucket {
    fn new(rate: f64, capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate,
            capacity,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
        self.last_update = now;
    }

    /// 토큰 하나를 예약합니다.
    fn reserve(&mut self, max_delay: Duration) -> Reservation {
        self.refill(Instant::now());

        let remaining = self.tokens - 1.0;
        let delay = if remaining >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-remaining / self.rate)
        };

        if delay > max_delay {
            return Reservation::Rejected(delay);
        }
        self.tokens = remaining;
        Reservation::Granted(delay)
    }
}

/// 속도 제한 저장소 trait
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn reserve(&self, key: &str, rate: f64, capacity: f64, max_delay: Duration) -> Reservation;
}

/// 메모리 기반 토큰 버킷 저장소
#[derive(Debug, Clone, Default)]
pub struct TokenBucketStore {
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
}

impl TokenBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.buckets.read().await.len()
    }
}

#[async_trait]
impl RateLimitStore for TokenBucketStore {
    async fn reserve(&self, key: &str, rate: f64, capacity: f64, max_delay: Duration) -> Reservation {
        let mut buckets = self.buckets.write().await;

        let bucket = buckets.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, rate, capacity, "새로운 토큰 버킷 생성");
            TokenBucket::new(rate, capacity)
        });

        bucket.reserve(max_delay)
    }
}
