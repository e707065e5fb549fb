/// 라우팅 규칙 오류
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("유효하지 않은 호스트 {host}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("잘못된 경로 패턴: {pattern} ({reason})")]
    InvalidPathPattern { pattern: String, reason: String },

    #[error("라우터에 host 또는 path 규칙이 필요합니다")]
    EmptyRule,
}
