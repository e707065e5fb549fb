//! 재시도 간격 계산 (지수 증가 + 지터)

use std::time::Duration;

use rand::Rng;

const RANDOMIZATION_FACTOR: f64 = 0.5;

/// 시도 횟수에 맞춰 배율이 정해지는 지수 백오프
///
/// 배율은 `2^(1/(attempts-1))`이라서 마지막 시도 직전 간격이 초기 간격의
/// 약 두 배가 됩니다.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    pub fn new(attempts: u32, initial_interval: Duration) -> Self {
        let multiplier = if attempts > 1 {
            2f64.powf(1.0 / f64::from(attempts - 1))
        } else {
            1.0
        };
        Self {
            current: initial_interval,
            multiplier,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        if self.current.is_zero() {
            return Duration::ZERO;
        }

        let secs = self.current.as_secs_f64();
        let delta = secs * RANDOMIZATION_FACTOR;
        let delay = rand::thread_rng().gen_range((secs - delta)..=(secs + delta));

        self.current = Duration::from_secs_f64(secs * self.multiplier);
        Duration::from_secs_f64(delay)
    }
}
