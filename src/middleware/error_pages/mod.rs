//! 설정된 상태 코드의 응답을 별도 서비스의 에러 페이지로 바꾸는 미들웨어

mod catcher;
mod modifier;
mod ranges;

use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use hyper::{HeaderMap, Method, Request, StatusCode, Uri};
use tracing::{debug, error};

pub use ranges::{HttpCodeRanges, RangeError};

use self::catcher::CodeCatcher;
use self::modifier::CodeModifier;
use super::builder::ServiceBuilder;
use super::error::BuildError;
use super::handler::{empty_body, Body, BoxHandler, ConnectionInfo, Handler};
use super::writer::{write_status, ResponseWriter};
use crate::dynamic::ErrorPageConfig;
use crate::proxy::remove_hop_headers;

pub struct ErrorPages {
    next: BoxHandler,
    backend: BoxHandler,
    ranges: HttpCodeRanges,
    query: String,
    name: String,
}

/// `service_name`은 공급자까지 한정된 이름이어야 합니다.
pub fn new(
    next: BoxHandler,
    config: &ErrorPageConfig,
    service_name: &str,
    services: &dyn ServiceBuilder,
    name: &str,
) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "errors", "미들웨어 생성");

    let ranges =
        HttpCodeRanges::parse(&config.status).map_err(|e| BuildError::invalid(name, e.to_string()))?;
    let backend = services.build_http(service_name)?;

    Ok(Arc::new(ErrorPages {
        next,
        backend,
        ranges,
        query: config.query.clone(),
        name: name.to_string(),
    }))
}

impl ErrorPages {
    fn page_request(
        &self,
        code: StatusCode,
        original_url: &str,
        headers: &HeaderMap,
    ) -> Result<Request<Body>, hyper::http::Error> {
        let escaped: String = url::form_urlencoded::byte_serialize(original_url.as_bytes()).collect();
        let mut query = self
            .query
            .replace("{status}", code.as_str())
            .replace("{url}", &escaped);
        if !query.starts_with('/') {
            query.insert(0, '/');
        }

        let uri: Uri = query.parse()?;
        let mut req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(empty_body())?;
        let page_headers = req.headers_mut();
        *page_headers = headers.clone();
        // 본문 없는 GET이므로 원래 요청의 프레이밍 헤더는 보내지 않습니다
        page_headers.remove(CONTENT_LENGTH);
        page_headers.remove(TRANSFER_ENCODING);
        remove_hop_headers(page_headers);
        Ok(req)
    }
}

fn original_url<B>(req: &Request<B>) -> String {
    let scheme = ConnectionInfo::from_request(req)
        .map(|info| info.scheme())
        .or_else(|| req.uri().scheme_str().map(|s| if s == "https" { "https" } else { "http" }))
        .unwrap_or("http");
    let host = req
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .unwrap_or_default();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("{}://{}{}", scheme, host, path)
}

#[async_trait]
impl Handler for ErrorPages {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let url = original_url(&req);
        let headers = req.headers().clone();

        let (filtered, code) = {
            let mut catcher = CodeCatcher::new(&mut *w, &self.ranges);
            self.next.serve(&mut catcher, req).await;
            (catcher.is_filtered(), catcher.code())
        };
        if !filtered {
            return;
        }

        let page_req = match self.page_request(code, &url, &headers) {
            Ok(req) => req,
            Err(e) => {
                error!(middleware = %self.name, error = %e, status = %code, "에러 페이지 요청 생성 실패");
                write_status(w, code).await;
                return;
            }
        };

        debug!(middleware = %self.name, status = %code, uri = %page_req.uri(), "에러 페이지 요청");
        let mut modifier = CodeModifier::new(&mut *w, code);
        self.backend.serve(&mut modifier, page_req).await;
        if !modifier.header_sent() {
            // 에러 페이지 서비스가 아무것도 쓰지 않아도 원래 상태 코드로 응답합니다
            modifier.write_header(code);
        }
    }
}
