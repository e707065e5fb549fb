//! 미들웨어 동적 구성
//!
//! 설정 파일에서는 종류 이름을 키로 하는 선택 필드 묶음(`Middleware`)으로
//! 표현되고, 집계 단계에서 정확히 한 종류만 가진 `MiddlewareConfig`로
//! 변환됩니다.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 설정 파일의 미들웨어 항목
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Middleware {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_prefix: Option<AddPrefixConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffering: Option<BufferingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<CompressConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorPageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_auth: Option<DigestAuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_auth: Option<ForwardAuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeadersConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_allow_list: Option<IpAllowListConfig>,
    #[serde(default, alias = "maxConnections", skip_serializing_if = "Option::is_none")]
    pub in_flight_req: Option<MaxConnectionsConfig>,
    #[serde(default, rename = "passTLSClientCert", skip_serializing_if = "Option::is_none")]
    pub pass_tls_client_cert: Option<PassTlsClientCertConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_regex: Option<RedirectRegexConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_scheme: Option<RedirectSchemeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_path: Option<ReplacePathConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_path_regex: Option<ReplacePathRegexConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<StripPrefixConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_prefix_regex: Option<StripPrefixRegexConfig>,
}

/// 종류가 하나로 확정된 미들웨어 구성
#[derive(Debug, Clone, PartialEq)]
pub enum MiddlewareConfig {
    AddPrefix(AddPrefixConfig),
    BasicAuth(BasicAuthConfig),
    Buffering(BufferingConfig),
    Chain(ChainConfig),
    CircuitBreaker(CircuitBreakerConfig),
    Compress(CompressConfig),
    ErrorPages(ErrorPageConfig),
    DigestAuth(DigestAuthConfig),
    ForwardAuth(ForwardAuthConfig),
    Headers(HeadersConfig),
    IpAllowList(IpAllowListConfig),
    MaxConnections(MaxConnectionsConfig),
    PassTlsClientCert(PassTlsClientCertConfig),
    RateLimit(RateLimitConfig),
    RedirectRegex(RedirectRegexConfig),
    RedirectScheme(RedirectSchemeConfig),
    ReplacePath(ReplacePathConfig),
    ReplacePathRegex(ReplacePathRegexConfig),
    Retry(RetryConfig),
    StripPrefix(StripPrefixConfig),
    StripPrefixRegex(StripPrefixRegexConfig),
}

impl MiddlewareConfig {
    /// 설정 파일에서 쓰는 종류 이름
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::AddPrefix(_) => "addPrefix",
            Self::BasicAuth(_) => "basicAuth",
            Self::Buffering(_) => "buffering",
            Self::Chain(_) => "chain",
            Self::CircuitBreaker(_) => "circuitBreaker",
            Self::Compress(_) => "compress",
            Self::ErrorPages(_) => "errors",
            Self::DigestAuth(_) => "digestAuth",
            Self::ForwardAuth(_) => "forwardAuth",
            Self::Headers(_) => "headers",
            Self::IpAllowList(_) => "ipAllowList",
            Self::MaxConnections(_) => "inFlightReq",
            Self::PassTlsClientCert(_) => "passTLSClientCert",
            Self::RateLimit(_) => "rateLimit",
            Self::RedirectRegex(_) => "redirectRegex",
            Self::RedirectScheme(_) => "redirectScheme",
            Self::ReplacePath(_) => "replacePath",
            Self::ReplacePathRegex(_) => "replacePathRegex",
            Self::Retry(_) => "retry",
            Self::StripPrefix(_) => "stripPrefix",
            Self::StripPrefixRegex(_) => "stripPrefixRegex",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KindError {
    #[error("invalid middleware type or middleware does not exist")]
    Empty,

    #[error("multi-type middleware not supported (found: {})", .0.join(", "))]
    MultiType(Vec<&'static str>),
}

impl TryFrom<Middleware> for MiddlewareConfig {
    type Error = KindError;

    fn try_from(raw: Middleware) -> Result<Self, Self::Error> {
        let candidates = [
            raw.add_prefix.map(Self::AddPrefix),
            raw.basic_auth.map(Self::BasicAuth),
            raw.buffering.map(Self::Buffering),
            raw.chain.map(Self::Chain),
            raw.circuit_breaker.map(Self::CircuitBreaker),
            raw.compress.map(Self::Compress),
            raw.errors.map(Self::ErrorPages),
            raw.digest_auth.map(Self::DigestAuth),
            raw.forward_auth.map(Self::ForwardAuth),
            raw.headers.map(Self::Headers),
            raw.ip_allow_list.map(Self::IpAllowList),
            raw.in_flight_req.map(Self::MaxConnections),
            raw.pass_tls_client_cert.map(Self::PassTlsClientCert),
            raw.rate_limit.map(Self::RateLimit),
            raw.redirect_regex.map(Self::RedirectRegex),
            raw.redirect_scheme.map(Self::RedirectScheme),
            raw.replace_path.map(Self::ReplacePath),
            raw.replace_path_regex.map(Self::ReplacePathRegex),
            raw.retry.map(Self::Retry),
            raw.strip_prefix.map(Self::StripPrefix),
            raw.strip_prefix_regex.map(Self::StripPrefixRegex),
        ];

        let mut found: Vec<Self> = candidates.into_iter().flatten().collect();
        match found.len() {
            0 => Err(KindError::Empty),
            1 => found.pop().ok_or(KindError::Empty),
            _ => Err(KindError::MultiType(
                found.iter().map(MiddlewareConfig::kind_name).collect(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddPrefixConfig {
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BasicAuthConfig {
    /// `user:bcrypt-hash` 목록
    pub users: Vec<String>,
    pub users_file: Option<String>,
    pub realm: String,
    pub remove_header: bool,
    pub header_field: Option<String>,
}

impl Default for BasicAuthConfig {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            users_file: None,
            realm: "Restricted Area".to_string(),
            remove_header: false,
            header_field: None,
        }
    }
}

/// 0은 제한 없음
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BufferingConfig {
    pub max_request_body_bytes: u64,
    pub max_response_body_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChainConfig {
    #[serde(default)]
    pub middlewares: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    pub expression: String,
    #[serde(with = "humantime_serde")]
    pub check_period: Duration,
    #[serde(with = "humantime_serde")]
    pub fallback_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub recovery_duration: Duration,
    pub response_code: u16,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            expression: String::new(),
            check_period: Duration::from_millis(100),
            fallback_duration: Duration::from_secs(10),
            recovery_duration: Duration::from_secs(10),
            response_code: 503,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CompressConfig {
    pub excluded_content_types: Vec<String>,
    pub min_response_body_bytes: usize,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            excluded_content_types: Vec::new(),
            min_response_body_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ErrorPageConfig {
    /// `"500-599"` 또는 `"404"` 형태의 범위 목록
    pub status: Vec<String>,
    pub service: String,
    /// `{status}`, `{url}` 치환을 지원하는 경로 템플릿
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DigestAuthConfig {
    /// `user:realm:ha1` 목록
    pub users: Vec<String>,
    pub users_file: Option<String>,
    pub realm: String,
    pub remove_header: bool,
    pub header_field: Option<String>,
}

impl Default for DigestAuthConfig {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            users_file: None,
            realm: "proxy".to_string(),
            remove_header: false,
            header_field: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ForwardAuthConfig {
    pub address: String,
    pub trust_forward_header: bool,
    pub auth_response_headers: Vec<String>,
    pub auth_response_headers_regex: Option<String>,
    pub auth_request_headers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct HeadersConfig {
    pub custom_request_headers: BTreeMap<String, String>,
    pub custom_response_headers: BTreeMap<String, String>,

    pub access_control_allow_credentials: bool,
    pub access_control_allow_headers: Vec<String>,
    pub access_control_allow_methods: Vec<String>,
    pub access_control_allow_origin_list: Vec<String>,
    pub access_control_expose_headers: Vec<String>,
    pub access_control_max_age: Option<u64>,
    pub add_vary_header: bool,

    pub frame_deny: bool,
    pub custom_frame_options_value: Option<String>,
    pub content_type_nosniff: bool,
    pub browser_xss_filter: bool,
    pub sts_seconds: u64,
    pub sts_include_subdomains: bool,
    pub sts_preload: bool,
    pub referrer_policy: Option<String>,
    pub content_security_policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct IpStrategyConfig {
    pub depth: usize,
    #[serde(rename = "excludedIPs")]
    pub excluded_ips: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SourceCriterionConfig {
    pub ip_strategy: Option<IpStrategyConfig>,
    pub request_header_name: Option<String>,
    pub request_host: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct IpAllowListConfig {
    pub source_range: Vec<String>,
    pub ip_strategy: Option<IpStrategyConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct MaxConnectionsConfig {
    pub amount: i64,
    pub source_criterion: Option<SourceCriterionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PassTlsClientCertConfig {
    pub pem: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// `period` 동안 허용되는 평균 요청 수. 0이면 제한하지 않습니다.
    pub average: u64,
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    pub burst: u64,
    pub source_criterion: Option<SourceCriterionConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            average: 0,
            period: Duration::from_secs(1),
            burst: 1,
            source_criterion: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RedirectRegexConfig {
    pub regex: String,
    pub replacement: String,
    pub permanent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RedirectSchemeConfig {
    pub scheme: String,
    pub port: Option<String>,
    pub permanent: bool,
}

impl Default for RedirectSchemeConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            port: None,
            permanent: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReplacePathConfig {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReplacePathRegexConfig {
    pub regex: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default)]
    pub attempts: i32,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub initial_interval: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StripPrefixConfig {
    #[serde(default)]
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StripPrefixRegexConfig {
    #[serde(default)]
    pub regex: Vec<String>,
}
