//! 외부 인증 서버에 요청을 위임하는 미들웨어

use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, StatusCode, Uri};
use regex_lite::Regex;
use tracing::{debug, warn};

use super::error::BuildError;
use super::handler::{empty_body, Body, BoxHandler, ConnectionInfo, Handler};
use super::source::request_host;
use super::writer::{write_all, write_status, ResponseWriter};
use crate::dynamic::ForwardAuthConfig;
use crate::proxy::{http_client, remove_hop_headers, HttpClient};

const X_FORWARDED_METHOD: &str = "x-forwarded-method";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_URI: &str = "x-forwarded-uri";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

pub struct ForwardAuth {
    next: BoxHandler,
    address: Uri,
    client: HttpClient,
    trust_forward_header: bool,
    response_headers: Vec<HeaderName>,
    response_headers_regex: Option<Regex>,
    request_headers: Vec<HeaderName>,
    name: String,
}

fn header_names(name: &str, names: &[String]) -> Result<Vec<HeaderName>, BuildError> {
    names
        .iter()
        .map(|n| {
            HeaderName::from_bytes(n.as_bytes())
                .map_err(|e| BuildError::invalid(name, format!("invalid header name {:?}: {}", n, e)))
        })
        .collect()
}

pub fn new(next: BoxHandler, config: &ForwardAuthConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "forwardAuth", address = %config.address, "미들웨어 생성");

    let address: Uri = config
        .address
        .parse()
        .map_err(|e| BuildError::invalid(name, format!("invalid address {:?}: {}", config.address, e)))?;
    if address.scheme().is_none() || address.authority().is_none() {
        return Err(BuildError::invalid(
            name,
            format!("address {:?} must be an absolute URL", config.address),
        ));
    }

    let response_headers_regex = config
        .auth_response_headers_regex
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| {
            Regex::new(&format!("(?i){}", r))
                .map_err(|e| BuildError::invalid(name, format!("invalid regex {:?}: {}", r, e)))
        })
        .transpose()?;

    Ok(Arc::new(ForwardAuth {
        next,
        address,
        client: http_client(),
        trust_forward_header: config.trust_forward_header,
        response_headers: header_names(name, &config.auth_response_headers)?,
        response_headers_regex,
        request_headers: header_names(name, &config.auth_request_headers)?,
        name: name.to_string(),
    }))
}

impl ForwardAuth {
    /// 인증 서버로 보낼 요청 헤더
    fn auth_headers<B>(&self, req: &Request<B>) -> HeaderMap {
        let mut headers = if self.request_headers.is_empty() {
            let mut all = req.headers().clone();
            remove_hop_headers(&mut all);
            all.remove(header::CONTENT_LENGTH);
            all
        } else {
            let mut selected = HeaderMap::new();
            for name in &self.request_headers {
                for value in req.headers().get_all(name) {
                    selected.append(name.clone(), value.clone());
                }
            }
            selected
        };

        let trusted = |headers: &HeaderMap, name: &str| {
            self.trust_forward_header && headers.contains_key(name)
        };
        let set = |headers: &mut HeaderMap, name: &'static str, value: String| {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(name, value);
            }
        };

        let info = ConnectionInfo::from_request(req);
        if let Some(info) = info {
            let ip = info.remote_addr.ip().to_string();
            let prior = req
                .headers()
                .get(X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .filter(|_| self.trust_forward_header);
            let value = match prior {
                Some(prior) => format!("{}, {}", prior, ip),
                None => ip,
            };
            set(&mut headers, X_FORWARDED_FOR, value);
        }
        if !trusted(&headers, X_FORWARDED_METHOD) {
            set(&mut headers, X_FORWARDED_METHOD, req.method().to_string());
        }
        if !trusted(&headers, X_FORWARDED_PROTO) {
            let proto = info.map(|i| i.scheme()).unwrap_or("http");
            set(&mut headers, X_FORWARDED_PROTO, proto.to_string());
        }
        if !trusted(&headers, X_FORWARDED_HOST) {
            set(&mut headers, X_FORWARDED_HOST, request_host(req));
        }
        if !trusted(&headers, X_FORWARDED_URI) {
            let uri = req
                .uri()
                .path_and_query()
                .map(|pq| pq.to_string())
                .unwrap_or_else(|| "/".to_string());
            set(&mut headers, X_FORWARDED_URI, uri);
        }
        headers
    }

    /// 인증 응답 헤더를 원 요청에 반영합니다.
    fn apply_response_headers(&self, auth: &HeaderMap, req: &mut HeaderMap) {
        for name in &self.response_headers {
            req.remove(name);
            for value in auth.get_all(name) {
                req.append(name.clone(), value.clone());
            }
        }

        if let Some(regex) = &self.response_headers_regex {
            let stale: Vec<HeaderName> = req
                .keys()
                .filter(|name| regex.is_match(name.as_str()))
                .cloned()
                .collect();
            for name in stale {
                req.remove(name);
            }
            for (name, value) in auth.iter() {
                if regex.is_match(name.as_str()) {
                    req.append(name.clone(), value.clone());
                }
            }
        }
    }
}

#[async_trait]
impl Handler for ForwardAuth {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let mut auth_req = Request::new(empty_body());
        *auth_req.method_mut() = Method::GET;
        *auth_req.uri_mut() = self.address.clone();
        *auth_req.headers_mut() = self.auth_headers(&req);
        auth_req.headers_mut().remove(header::HOST);

        let response = match self.client.request(auth_req).await {
            Ok(response) => response,
            Err(e) => {
                warn!(middleware = %self.name, address = %self.address, error = %e, "인증 서버 호출 실패");
                write_status(w, StatusCode::INTERNAL_SERVER_ERROR).await;
                return;
            }
        };

        let (parts, body) = response.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(middleware = %self.name, error = %e, "인증 응답 본문 읽기 실패");
                write_status(w, StatusCode::INTERNAL_SERVER_ERROR).await;
                return;
            }
        };

        if !parts.status.is_success() {
            debug!(middleware = %self.name, status = parts.status.as_u16(), "인증 거부");
            let mut headers = parts.headers;
            remove_hop_headers(&mut headers);
            headers.remove(header::CONTENT_LENGTH);
            let target = w.headers_mut();
            for (name, value) in headers.iter() {
                target.append(name.clone(), value.clone());
            }
            w.write_header(parts.status);
            if !body.is_empty() {
                let _ = write_all(w, &body).await;
            }
            return;
        }

        self.apply_response_headers(&parts.headers, req.headers_mut());
        self.next.serve(w, req).await;
    }
}
