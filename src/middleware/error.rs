/// 미들웨어 구성/생성 실패
///
/// 생성 실패는 해당 라우터 하나에만 영향을 주며, 메시지는 로그에 그대로
/// 남으므로 운영자가 원인을 알 수 있게 작성합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("middleware \"{name}\" does not exist")]
    NotFound { name: String },

    #[error("could not instantiate middleware {name}: recursion detected in {path}")]
    Recursion { name: String, path: String },

    #[error("cannot create middleware {name}: multi-type middleware not supported, consider declaring two different pieces of middleware instead (found: {kinds})")]
    MultiType { name: String, kinds: String },

    #[error("cannot create middleware {name}: invalid middleware type or middleware does not exist")]
    EmptyType { name: String },

    #[error("invalid configuration for middleware {name}: {message}")]
    InvalidConfig { name: String, message: String },

    #[error("service \"{name}\" does not exist")]
    ServiceNotFound { name: String },

    #[error("invalid configuration for service {name}: {message}")]
    InvalidService { name: String, message: String },
}

impl BuildError {
    pub fn invalid(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            name: name.to_string(),
            message: message.into(),
        }
    }
}
