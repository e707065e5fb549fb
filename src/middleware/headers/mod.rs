//! 요청/응답 헤더 수정, CORS, 보안 헤더 미들웨어

mod cors;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, Request, StatusCode};
use tracing::debug;

use self::cors::Cors;
use super::error::BuildError;
use super::handler::{Body, BoxHandler, ConnectionInfo, Handler};
use super::writer::{
    is_informational, Capabilities, CloseNotify, ResponseWriter, WriterError,
};
use crate::dynamic::HeadersConfig;

/// 헤더 변경 규칙. 값이 없으면 헤더를 삭제합니다.
#[derive(Debug, Clone)]
struct HeaderRule {
    name: HeaderName,
    value: Option<HeaderValue>,
}

fn parse_rules<'a>(
    name: &str,
    headers: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Result<Vec<HeaderRule>, BuildError> {
    headers
        .into_iter()
        .map(|(key, value)| {
            let header_name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| BuildError::invalid(name, format!("invalid header name {:?}: {}", key, e)))?;
            let header_value = if value.is_empty() {
                None
            } else {
                Some(HeaderValue::from_str(value).map_err(|e| {
                    BuildError::invalid(name, format!("invalid header value for {:?}: {}", key, e))
                })?)
            };
            Ok(HeaderRule {
                name: header_name,
                value: header_value,
            })
        })
        .collect()
}

fn apply_rules(rules: &[HeaderRule], headers: &mut HeaderMap) {
    for rule in rules {
        match &rule.value {
            Some(value) => {
                headers.insert(rule.name.clone(), value.clone());
            }
            None => {
                headers.remove(&rule.name);
            }
        }
    }
}

/// 응답에 붙일 보안 헤더
#[derive(Debug, Clone, Default)]
struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
    sts: Option<HeaderValue>,
}

impl SecurityHeaders {
    fn from_config(name: &str, config: &HeadersConfig) -> Result<Self, BuildError> {
        let value = |v: &str| {
            HeaderValue::from_str(v).map_err(|e| BuildError::invalid(name, e.to_string()))
        };
        let mut headers = Vec::new();

        if let Some(custom) = &config.custom_frame_options_value {
            headers.push((header::X_FRAME_OPTIONS, value(custom)?));
        } else if config.frame_deny {
            headers.push((header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")));
        }
        if config.content_type_nosniff {
            headers.push((header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")));
        }
        if config.browser_xss_filter {
            headers.push((header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")));
        }
        if let Some(policy) = &config.referrer_policy {
            headers.push((header::REFERRER_POLICY, value(policy)?));
        }
        if let Some(policy) = &config.content_security_policy {
            headers.push((header::CONTENT_SECURITY_POLICY, value(policy)?));
        }

        let sts = if config.sts_seconds > 0 {
            let mut sts = format!("max-age={}", config.sts_seconds);
            if config.sts_include_subdomains {
                sts.push_str("; includeSubDomains");
            }
            if config.sts_preload {
                sts.push_str("; preload");
            }
            Some(value(&sts)?)
        } else {
            None
        };

        Ok(Self { headers, sts })
    }

    fn apply(&self, secure: bool, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        // HSTS는 HTTPS 응답에만 붙입니다
        if let (true, Some(sts)) = (secure, &self.sts) {
            headers.insert(header::STRICT_TRANSPORT_SECURITY, sts.clone());
        }
    }
}

pub struct Headers {
    next: BoxHandler,
    request_rules: Vec<HeaderRule>,
    response_rules: Vec<HeaderRule>,
    security: SecurityHeaders,
    cors: Cors,
}

pub fn new(next: BoxHandler, config: &HeadersConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "headers", "미들웨어 생성");

    Ok(Arc::new(Headers {
        next,
        request_rules: parse_rules(name, &config.custom_request_headers)?,
        response_rules: parse_rules(name, &config.custom_response_headers)?,
        security: SecurityHeaders::from_config(name, config)?,
        cors: Cors::from_config(config),
    }))
}

fn is_secure<B>(req: &Request<B>) -> bool {
    ConnectionInfo::from_request(req).is_some_and(|info| info.tls)
        || req
            .headers()
            .get("x-forwarded-proto")
            .is_some_and(|proto| proto == "https")
}

#[async_trait]
impl Handler for Headers {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if self.cors.is_preflight(&req) {
            self.cors.apply_preflight(origin.as_deref(), w.headers_mut());
            w.write_header(StatusCode::OK);
            return;
        }

        apply_rules(&self.request_rules, req.headers_mut());

        let secure = is_secure(&req);
        let mut writer = ResponseHeaderWriter::new(w, self, origin, secure);
        self.next.serve(&mut writer, req).await;
    }
}

/// 최종 상태 코드가 기록되는 순간 응답 헤더를 고칩니다.
struct ResponseHeaderWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    caps: Capabilities,
    headers: &'a Headers,
    origin: Option<String>,
    secure: bool,
    applied: bool,
}

impl<'a> ResponseHeaderWriter<'a> {
    fn new(
        inner: &'a mut dyn ResponseWriter,
        headers: &'a Headers,
        origin: Option<String>,
        secure: bool,
    ) -> Self {
        let caps = Capabilities::detect(&*inner);
        Self {
            inner,
            caps,
            headers,
            origin,
            secure,
            applied: false,
        }
    }

    fn apply(&mut self) {
        if self.applied {
            return;
        }
        self.applied = true;

        let target = self.inner.headers_mut();
        self.headers.security.apply(self.secure, target);
        apply_rules(&self.headers.response_rules, target);
        self.headers.cors.apply_response(self.origin.as_deref(), target);
    }
}

#[async_trait]
impl ResponseWriter for ResponseHeaderWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if !is_informational(status) {
            self.apply();
        }
        self.inner.write_header(status);
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.apply();
        self.inner.write(buf).await
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        if !self.caps.can_flush() {
            return Err(WriterError::NotFlusher(self.inner.writer_name()));
        }
        self.apply();
        self.inner.flush().await
    }

    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        if !self.caps.can_hijack() {
            return Err(WriterError::NotHijacker(self.inner.writer_name()));
        }
        self.inner.hijack()
    }

    fn close_notify(&self) -> Option<CloseNotify> {
        self.inner.close_notify()
    }
}
