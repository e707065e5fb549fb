//! 호스트/경로 규칙으로 요청을 라우터에 배정합니다.

mod error;
mod host;
mod matcher;

use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, StatusCode};
use tracing::debug;

pub use error::RoutingError;
pub use host::{strip_port, HostMatcher};
pub use matcher::{PathMatcher, PathMatcherKind};

use crate::middleware::handler::{Body, BoxHandler, Handler};
use crate::middleware::source::request_host;
use crate::middleware::writer::{write_error, ResponseWriter};

/// 라우터 규칙 (host와 path의 AND)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    host: Option<HostMatcher>,
    path: Option<PathMatcher>,
}

impl Rule {
    pub fn new(host: Option<&str>, path: Option<&str>) -> Result<Self, RoutingError> {
        let host = host.filter(|h| !h.is_empty()).map(HostMatcher::new).transpose()?;
        let path = path.filter(|p| !p.is_empty()).map(PathMatcher::parse).transpose()?;
        if host.is_none() && path.is_none() {
            return Err(RoutingError::EmptyRule);
        }
        Ok(Self { host, path })
    }

    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        if let Some(host) = &self.host {
            if !host.matches(&request_host(req)) {
                return false;
            }
        }
        match &self.path {
            Some(path) => path.matches(req.uri().path()),
            None => true,
        }
    }

    /// 우선순위가 같을 때 비교하는 규칙 길이
    pub fn len(&self) -> usize {
        self.host.as_ref().map_or(0, |h| h.name().len())
            + self.path.as_ref().map_or(0, |p| p.pattern.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Route {
    pub name: String,
    pub rule: Rule,
    pub priority: i32,
    pub handler: BoxHandler,
}

/// 한 엔트리포인트의 라우터 묶음
///
/// 우선순위가 높은 순, 같으면 규칙이 긴 순으로 검사해 처음 일치한 라우터가
/// 요청을 처리합니다.
#[derive(Default)]
pub struct RouterHandler {
    routes: Vec<Route>,
}

impl RouterHandler {
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.rule.len().cmp(&a.rule.len()))
                .then_with(|| a.name.cmp(&b.name))
        });
        Self { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn route_names(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.name.as_str())
    }

    fn find<B>(&self, req: &Request<B>) -> Option<&Route> {
        self.routes.iter().find(|route| route.rule.matches(req))
    }
}

#[async_trait]
impl Handler for RouterHandler {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        match self.find(&req) {
            Some(route) => {
                debug!(router = %route.name, path = %req.uri().path(), "라우터 선택");
                let handler = Arc::clone(&route.handler);
                handler.serve(w, req).await;
            }
            None => {
                debug!(host = %request_host(&req), path = %req.uri().path(), "일치하는 라우터 없음");
                write_error(w, StatusCode::NOT_FOUND, "404 page not found").await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler::empty_body;
    use crate::middleware::writer::{write_all, ResponseRecorder};
    use hyper::header;

    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        async fn serve(&self, w: &mut dyn ResponseWriter, _req: Request<Body>) {
            write_all(w, self.0.as_bytes()).await.unwrap();
        }
    }

    fn route(name: &'static str, host: Option<&str>, path: Option<&str>, priority: i32) -> Route {
        Route {
            name: name.to_string(),
            rule: Rule::new(host, path).unwrap(),
            priority,
            handler: Arc::new(Named(name)),
        }
    }

    async fn dispatch(router: &RouterHandler, host: &str, path: &str) -> ResponseRecorder {
        let req = Request::builder()
            .uri(path)
            .header(header::HOST, host)
            .body(empty_body())
            .unwrap();
        let mut rec = ResponseRecorder::new();
        router.serve(&mut rec, req).await;
        rec
    }

    #[tokio::test]
    async fn test_longest_rule_wins() {
        let router = RouterHandler::new(vec![
            route("root", Some("example.com"), Some("/*"), 0),
            route("api", Some("example.com"), Some("/api/*"), 0),
        ]);

        assert_eq!(dispatch(&router, "example.com", "/api/users").await.body_string(), "api");
        assert_eq!(dispatch(&router, "example.com:8080", "/home").await.body_string(), "root");
    }

    #[tokio::test]
    async fn test_priority_overrides_length() {
        let router = RouterHandler::new(vec![
            route("catch-all", None, Some("/*"), 10),
            route("api", Some("example.com"), Some("/api/*"), 0),
        ]);
        assert_eq!(dispatch(&router, "example.com", "/api").await.body_string(), "catch-all");
    }

    #[tokio::test]
    async fn test_unmatched_is_404() {
        let router = RouterHandler::new(vec![route("api", Some("example.com"), None, 0)]);

        let rec = dispatch(&router, "other.com", "/").await;
        assert_eq!(rec.status(), StatusCode::NOT_FOUND);
        assert_eq!(rec.body_string(), "404 page not found\n");
    }

    #[test]
    fn test_empty_rule_rejected() {
        assert_eq!(Rule::new(None, Some("")), Err(RoutingError::EmptyRule));
    }
}
