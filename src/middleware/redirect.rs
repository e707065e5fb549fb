//! URL 정규식/스킴 리다이렉트 미들웨어

use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, StatusCode};
use regex_lite::Regex;
use tracing::debug;

use super::error::BuildError;
use super::handler::{Body, BoxHandler, ConnectionInfo, Handler};
use super::source::request_host;
use super::writer::{write_all, write_status, ResponseWriter};
use crate::dynamic::{RedirectRegexConfig, RedirectSchemeConfig};

const SCHEME_PATTERN: &str = r"^(https?)://(\[[\w:.]+\]|[\w._-]+)?(:\d+)?(.*)$";

pub struct Redirect {
    next: BoxHandler,
    regex: Regex,
    replacement: String,
    permanent: bool,
    name: String,
}

pub fn new_regex(next: BoxHandler, config: &RedirectRegexConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "redirectRegex", regex = %config.regex, "미들웨어 생성");
    build(next, &config.regex, &config.replacement, config.permanent, name)
}

pub fn new_scheme(next: BoxHandler, config: &RedirectSchemeConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "redirectScheme", scheme = %config.scheme, "미들웨어 생성");

    if config.scheme.is_empty() {
        return Err(BuildError::invalid(name, "redirect scheme is empty"));
    }
    let port = match config.port.as_deref() {
        None | Some("") => String::new(),
        Some("80") if config.scheme == "http" => String::new(),
        Some("443") if config.scheme == "https" => String::new(),
        Some(port) => format!(":{}", port),
    };
    let replacement = format!("{}://${{2}}{}${{4}}", config.scheme, port);

    build(next, SCHEME_PATTERN, &replacement, config.permanent, name)
}

fn build(
    next: BoxHandler,
    pattern: &str,
    replacement: &str,
    permanent: bool,
    name: &str,
) -> Result<BoxHandler, BuildError> {
    let regex = Regex::new(pattern)
        .map_err(|e| BuildError::invalid(name, format!("invalid regex {:?}: {}", pattern, e)))?;
    Ok(Arc::new(Redirect {
        next,
        regex,
        replacement: replacement.to_string(),
        permanent,
        name: name.to_string(),
    }))
}

/// 클라이언트가 요청한 전체 URL을 복원합니다.
fn raw_url<B>(req: &Request<B>) -> String {
    let uri = req.uri();
    let tls = ConnectionInfo::from_request(req).is_some_and(|info| info.tls);

    let scheme = if tls {
        "https".to_string()
    } else if let Some(scheme) = uri.scheme_str() {
        scheme.to_string()
    } else {
        req.headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .filter(|proto| *proto == "http" || *proto == "https")
            .unwrap_or("http")
            .to_string()
    };
    let host = match uri.authority() {
        Some(authority) => authority.to_string(),
        None => request_host(req),
    };
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("{}://{}{}", scheme, host, path)
}

impl Redirect {
    fn status(&self, method: &Method) -> StatusCode {
        match (self.permanent, method == Method::GET) {
            (true, true) => StatusCode::MOVED_PERMANENTLY,
            (true, false) => StatusCode::PERMANENT_REDIRECT,
            (false, true) => StatusCode::FOUND,
            (false, false) => StatusCode::TEMPORARY_REDIRECT,
        }
    }
}

#[async_trait]
impl Handler for Redirect {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let old_url = raw_url(&req);
        if !self.regex.is_match(&old_url) {
            self.next.serve(w, req).await;
            return;
        }

        let new_url = self.regex.replace(&old_url, self.replacement.as_str()).into_owned();
        if new_url == old_url {
            self.next.serve(w, req).await;
            return;
        }

        let location = url::Url::parse(&new_url)
            .ok()
            .and_then(|url| HeaderValue::from_str(url.as_str()).ok());
        let Some(location) = location else {
            debug!(middleware = %self.name, url = %new_url, "잘못된 리다이렉트 URL");
            write_status(w, StatusCode::INTERNAL_SERVER_ERROR).await;
            return;
        };

        let status = self.status(req.method());
        debug!(middleware = %self.name, from = %old_url, to = %new_url, status = status.as_u16(), "리다이렉트");
        w.headers_mut().insert(header::LOCATION, location);
        w.write_header(status);
        if let Some(reason) = status.canonical_reason() {
            let _ = write_all(w, reason.as_bytes()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler::empty_body;
    use crate::middleware::writer::ResponseRecorder;

    struct Ok200;

    #[async_trait]
    impl Handler for Ok200 {
        async fn serve(&self, w: &mut dyn ResponseWriter, _req: Request<Body>) {
            w.write_header(StatusCode::OK);
        }
    }

    fn request(method: &str, host: &str, path: &str, tls: bool) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, host)
            .body(empty_body())
            .unwrap();
        req.extensions_mut().insert(ConnectionInfo {
            remote_addr: "127.0.0.1:1".parse().unwrap(),
            tls,
        });
        req
    }

    async fn run(handler: &BoxHandler, req: Request<Body>) -> (StatusCode, Option<String>) {
        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, req).await;
        let location = rec
            .sent_headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        (rec.status(), location)
    }

    #[tokio::test]
    async fn test_regex_redirect() {
        let config = RedirectRegexConfig {
            regex: r"^http://localhost/(.*)".to_string(),
            replacement: "http://mydomain/${1}".to_string(),
            permanent: false,
        };
        let handler = new_regex(Arc::new(Ok200), &config, "rr@file").unwrap();

        let (status, location) = run(&handler, request("GET", "localhost", "/foo?x=1", false)).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location.as_deref(), Some("http://mydomain/foo?x=1"));

        let (status, _) = run(&handler, request("POST", "localhost", "/foo", false)).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);

        let (status, location) = run(&handler, request("GET", "other", "/foo", false)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(location.is_none());
    }

    #[tokio::test]
    async fn test_scheme_redirect() {
        let config = RedirectSchemeConfig {
            scheme: "https".to_string(),
            port: Some("443".to_string()),
            permanent: true,
        };
        let handler = new_scheme(Arc::new(Ok200), &config, "rs@file").unwrap();

        let (status, location) = run(&handler, request("GET", "foo.com:80", "/bar", false)).await;
        assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location.as_deref(), Some("https://foo.com/bar"));

        let (status, _) = run(&handler, request("PUT", "foo.com", "/bar", false)).await;
        assert_eq!(status, StatusCode::PERMANENT_REDIRECT);

        // 이미 https면 통과
        let (status, location) = run(&handler, request("GET", "foo.com", "/bar", true)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(location.is_none());
    }

    #[tokio::test]
    async fn test_scheme_redirect_custom_port() {
        let config = RedirectSchemeConfig {
            scheme: "https".to_string(),
            port: Some("8443".to_string()),
            permanent: false,
        };
        let handler = new_scheme(Arc::new(Ok200), &config, "rs@file").unwrap();

        let (_, location) = run(&handler, request("GET", "[::1]:8080", "/x", false)).await;
        assert_eq!(location.as_deref(), Some("https://[::1]:8443/x"));
    }

    #[test]
    fn test_invalid_regex() {
        let config = RedirectRegexConfig {
            regex: "(".to_string(),
            ..Default::default()
        };
        assert!(new_regex(Arc::new(Ok200), &config, "rr@file").is_err());
    }
}
