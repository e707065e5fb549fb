use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

/// 버킷 하나가 보관하는 지연 시간 표본 수 상한
const MAX_LATENCY_SAMPLES: usize = 1024;

/// 상태 코드가 네트워크 오류를 뜻하는지 확인합니다.
pub fn is_network_error(code: u16) -> bool {
    code == 502 || code == 504
}

/// 집계된 응답 측정값
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    total: u64,
    network_errors: u64,
    codes: BTreeMap<u16, u64>,
    latencies: Vec<Duration>,
}

impl Snapshot {
    pub fn record(&mut self, code: u16, latency: Duration) {
        self.total += 1;
        if is_network_error(code) {
            self.network_errors += 1;
        }
        *self.codes.entry(code).or_default() += 1;
        if self.latencies.len() < MAX_LATENCY_SAMPLES {
            self.latencies.push(latency);
        }
    }

    fn merge(&mut self, other: &Snapshot) {
        self.total += other.total;
        self.network_errors += other.network_errors;
        for (code, count) in &other.codes {
            *self.codes.entry(*code).or_default() += count;
        }
        self.latencies.extend_from_slice(&other.latencies);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn network_error_ratio(&self) -> f64 {
        ratio(self.network_errors, self.total)
    }

    /// `[from, to)` 응답 수를 `[dividend_from, dividend_to)` 응답 수로 나눈 값
    pub fn response_code_ratio(&self, from: u16, to: u16, dividend_from: u16, dividend_to: u16) -> f64 {
        let count = |start: u16, end: u16| -> u64 { self.codes.range(start..end).map(|(_, c)| c).sum() };
        ratio(count(from, to), count(dividend_from, dividend_to))
    }

    /// `quantile` 백분위 지연 시간 (밀리초)
    pub fn latency_at_quantile_ms(&self, quantile: f64) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();

        let rank = (quantile / 100.0 * sorted.len() as f64).ceil() as usize;
        let index = rank.clamp(1, sorted.len()) - 1;
        sorted[index].as_secs_f64() * 1000.0
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// 일정 시간 창 안의 측정값만 유지하는 롤링 집계
#[derive(Debug)]
pub struct RollingMetrics {
    buckets: VecDeque<(Instant, Snapshot)>,
    bucket_width: Duration,
    bucket_count: usize,
}

impl RollingMetrics {
    pub fn new(bucket_count: usize, bucket_width: Duration) -> Self {
        Self {
            buckets: VecDeque::with_capacity(bucket_count),
            bucket_width,
            bucket_count: bucket_count.max(1),
        }
    }

    fn window(&self) -> Duration {
        self.bucket_width * self.bucket_count as u32
    }

    fn evict(&mut self, now: Instant) {
        let window = self.window();
        while self
            .buckets
            .front()
            .is_some_and(|(start, _)| now.saturating_duration_since(*start) >= window)
        {
            self.buckets.pop_front();
        }
    }

    pub fn record(&mut self, now: Instant, code: u16, latency: Duration) {
        self.evict(now);
        let needs_bucket = self
            .buckets
            .back()
            .map_or(true, |(start, _)| now.saturating_duration_since(*start) >= self.bucket_width);
        if needs_bucket {
            self.buckets.push_back((now, Snapshot::default()));
        }
        if let Some((_, bucket)) = self.buckets.back_mut() {
            bucket.record(code, latency);
        }
    }

    pub fn snapshot(&mut self, now: Instant) -> Snapshot {
        self.evict(now);
        self.buckets.iter().fold(Snapshot::default(), |mut acc, (_, bucket)| {
            acc.merge(bucket);
            acc
        })
    }

    pub fn reset(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios() {
        let mut snapshot = Snapshot::default();
        for code in [200, 200, 404, 500, 502, 504] {
            snapshot.record(code, Duration::ZERO);
        }
        assert_eq!(snapshot.total(), 6);
        assert!((snapshot.network_error_ratio() - 2.0 / 6.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.response_code_ratio(500, 600, 0, 600), 0.5);
        assert_eq!(snapshot.response_code_ratio(400, 500, 200, 300), 0.5);
        assert_eq!(Snapshot::default().response_code_ratio(500, 600, 0, 600), 0.0);
    }

    #[test]
    fn test_window_eviction() {
        let mut metrics = RollingMetrics::new(3, Duration::from_secs(1));
        let start = Instant::now();

        metrics.record(start, 502, Duration::ZERO);
        metrics.record(start + Duration::from_millis(1500), 200, Duration::ZERO);
        assert_eq!(metrics.snapshot(start + Duration::from_secs(2)).total(), 2);

        // 첫 버킷이 창 밖으로 밀려남
        let later = metrics.snapshot(start + Duration::from_secs(3));
        assert_eq!(later.total(), 1);
        assert_eq!(later.network_error_ratio(), 0.0);

        metrics.reset();
        assert_eq!(metrics.snapshot(start + Duration::from_secs(3)).total(), 0);
    }
}
