use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Method, Request};

use crate::dynamic::HeadersConfig;

/// CORS 설정
///
/// 허용 Origin 목록이 비어 있으면 CORS 처리를 하지 않습니다.
#[derive(Debug, Clone, Default)]
pub(super) struct Cors {
    allow_origins: Vec<String>,
    allow_methods: Option<HeaderValue>,
    allow_headers: Option<HeaderValue>,
    expose_headers: Option<HeaderValue>,
    max_age: Option<HeaderValue>,
    allow_credentials: bool,
    add_vary_header: bool,
}

fn joined(values: &[String]) -> Option<HeaderValue> {
    if values.is_empty() {
        return None;
    }
    HeaderValue::from_str(&values.join(",")).ok()
}

impl Cors {
    pub(super) fn from_config(config: &HeadersConfig) -> Self {
        Self {
            allow_origins: config.access_control_allow_origin_list.clone(),
            allow_methods: joined(&config.access_control_allow_methods),
            allow_headers: joined(&config.access_control_allow_headers),
            expose_headers: joined(&config.access_control_expose_headers),
            max_age: config
                .access_control_max_age
                .and_then(|age| HeaderValue::from_str(&age.to_string()).ok()),
            allow_credentials: config.access_control_allow_credentials,
            add_vary_header: config.add_vary_header,
        }
    }

    pub(super) fn is_enabled(&self) -> bool {
        !self.allow_origins.is_empty()
    }

    /// 응답에 쓸 `Access-Control-Allow-Origin` 값
    fn allowed_origin(&self, origin: &str) -> Option<HeaderValue> {
        if self.allow_origins.iter().any(|allowed| allowed == "*") {
            return Some(HeaderValue::from_static("*"));
        }
        if self.allow_origins.iter().any(|allowed| allowed == origin) {
            return HeaderValue::from_str(origin).ok();
        }
        None
    }

    pub(super) fn is_preflight<B>(&self, req: &Request<B>) -> bool {
        self.is_enabled()
            && req.method() == Method::OPTIONS
            && req.headers().contains_key(header::ORIGIN)
            && req
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    /// preflight 응답 헤더를 채웁니다.
    pub(super) fn apply_preflight(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if let Some(value) = &self.allow_headers {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value.clone());
        }
        if let Some(value) = &self.allow_methods {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value.clone());
        }
        if let Some(value) = origin.and_then(|origin| self.allowed_origin(origin)) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        if let Some(value) = &self.max_age {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, value.clone());
        }
    }

    /// 일반 응답의 CORS 헤더를 채웁니다.
    pub(super) fn apply_response(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        if !self.is_enabled() {
            return;
        }

        let allowed = origin.and_then(|origin| self.allowed_origin(origin));
        if self.add_vary_header && allowed.as_ref().is_some_and(|value| value != "*") {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }

        let Some(allowed) = allowed else {
            return;
        };
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allowed);

        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if let Some(value) = &self.expose_headers {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, value.clone());
        }
    }
}
