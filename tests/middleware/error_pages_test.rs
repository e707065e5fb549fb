use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::header::{HeaderName, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use hyper::{Request, StatusCode, Uri};
use reverse_proxy_chain::dynamic::ErrorPageConfig;
use reverse_proxy_chain::middleware::error_pages;
use reverse_proxy_chain::middleware::handler::{full_body, Body};
use reverse_proxy_chain::middleware::writer::write_all;
use reverse_proxy_chain::middleware::{BoxHandler, BuildError, Handler, ResponseWriter};
use reverse_proxy_chain::proxy::{http_client, ProxyHandler};
use tokio::net::TcpListener;

use crate::common::{get, serve, Echo, StaticServices, Status};

fn pages(status: StatusCode) -> Result<BoxHandler, BuildError> {
    let config = ErrorPageConfig {
        status: vec!["500-501".to_string(), "503-599".to_string()],
        service: "pages".to_string(),
        query: "/{status}.html".to_string(),
    };
    let services = StaticServices::default().with("pages@file", Arc::new(Echo));
    error_pages::new(
        Arc::new(Status(status)),
        &config,
        "pages@file",
        &services,
        "errors@file",
    )
}

#[tokio::test]
async fn test_status_in_range_renders_page() {
    for code in [500, 501, 503, 599] {
        let status = StatusCode::from_u16(code).unwrap();
        let rec = serve(&pages(status).unwrap(), get("/broken")).await;

        assert_eq!(rec.status(), status);
        assert_eq!(rec.body_string(), format!("/{}.html", code));
        assert!(rec.sent_headers().get("x-backend").is_none());
    }
}

#[tokio::test]
async fn test_status_outside_range_passes_through() {
    for code in [200, 404, 502] {
        let status = StatusCode::from_u16(code).unwrap();
        let rec = serve(&pages(status).unwrap(), get("/ok")).await;

        assert_eq!(rec.status(), status);
        assert_eq!(rec.body_string(), "backend body");
        assert_eq!(rec.sent_headers()["x-backend"], "status");
    }
}

#[test]
fn test_missing_error_service() {
    let config = ErrorPageConfig {
        status: vec!["500".to_string()],
        service: "ghost".to_string(),
        query: "/".to_string(),
    };
    let err = error_pages::new(
        Arc::new(Echo),
        &config,
        "ghost@file",
        &StaticServices::default(),
        "errors@file",
    )
    .err()
    .unwrap();
    assert_eq!(
        err,
        BuildError::ServiceNotFound {
            name: "ghost@file".to_string()
        }
    );
}

#[test]
fn test_invalid_range_rejected() {
    let config = ErrorPageConfig {
        status: vec!["599-500".to_string()],
        service: "pages".to_string(),
        query: "/".to_string(),
    };
    let services = StaticServices::default().with("pages@file", Arc::new(Echo));
    assert!(matches!(
        error_pages::new(Arc::new(Echo), &config, "pages@file", &services, "errors@file"),
        Err(BuildError::InvalidConfig { .. })
    ));
}

/// 에러 페이지 서비스가 받은 요청
#[derive(Debug, Clone, PartialEq)]
struct PageRequest {
    method: String,
    uri: String,
    content_length: Option<String>,
    transfer_encoding: Option<String>,
    connection: Option<String>,
    body_len: usize,
}

/// 받은 요청을 기록하고 고정된 페이지를 돌려주는 서비스
#[derive(Default)]
struct RecordingPages {
    seen: Mutex<Vec<PageRequest>>,
}

#[async_trait]
impl Handler for RecordingPages {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let header = |name: HeaderName| {
            req.headers()
                .get(name)
                .map(|v| v.to_str().unwrap().to_string())
        };
        let mut seen = PageRequest {
            method: req.method().to_string(),
            uri: req.uri().to_string(),
            content_length: header(CONTENT_LENGTH),
            transfer_encoding: header(TRANSFER_ENCODING),
            connection: header(CONNECTION),
            body_len: 0,
        };
        seen.body_len = req.into_body().collect().await.unwrap().to_bytes().len();
        self.seen.lock().unwrap().push(seen);
        write_all(w, b"error page").await.unwrap();
    }
}

fn with_pages(next: BoxHandler, query: &str, pages: BoxHandler) -> BoxHandler {
    let config = ErrorPageConfig {
        status: vec!["500-501".to_string(), "503-599".to_string()],
        service: "pages".to_string(),
        query: query.to_string(),
    };
    let services = StaticServices::default().with("pages@file", pages);
    error_pages::new(next, &config, "pages@file", &services, "errors@file").unwrap()
}

#[tokio::test]
async fn test_page_request_drops_body_framing() {
    let pages = Arc::new(RecordingPages::default());
    let handler = with_pages(
        Arc::new(Status(StatusCode::INTERNAL_SERVER_ERROR)),
        "/{status}.html",
        pages.clone(),
    );

    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(CONTENT_LENGTH, "7")
        .header(CONNECTION, "keep-alive")
        .header("x-request-id", "abc")
        .body(full_body("payload"))
        .unwrap();
    let rec = serve(&handler, req).await;

    assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(rec.body_string(), "error page");

    let seen = pages.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].uri, "/500.html");
    assert_eq!(seen[0].content_length, None);
    assert_eq!(seen[0].transfer_encoding, None);
    assert_eq!(seen[0].connection, None);
    assert_eq!(seen[0].body_len, 0);
}

#[tokio::test]
async fn test_page_request_keeps_end_to_end_headers() {
    /// 받은 요청 헤더를 본문으로 돌려주는 서비스
    struct HeaderEcho;

    #[async_trait]
    impl Handler for HeaderEcho {
        async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
            let id = req.headers()["x-request-id"].to_str().unwrap().to_string();
            write_all(w, id.as_bytes()).await.unwrap();
        }
    }

    let handler = with_pages(
        Arc::new(Status(StatusCode::SERVICE_UNAVAILABLE)),
        "/",
        Arc::new(HeaderEcho),
    );
    let req = Request::builder()
        .uri("/")
        .header("x-request-id", "abc")
        .body(full_body(""))
        .unwrap();
    let rec = serve(&handler, req).await;

    assert_eq!(rec.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(rec.body_string(), "abc");
}

#[tokio::test]
async fn test_not_modified_without_body_is_not_intercepted() {
    /// 본문 없이 304만 기록하는 백엔드
    struct NotModified;

    #[async_trait]
    impl Handler for NotModified {
        async fn serve(&self, w: &mut dyn ResponseWriter, _req: Request<Body>) {
            w.write_header(StatusCode::NOT_MODIFIED);
        }
    }

    let pages = Arc::new(RecordingPages::default());
    let handler = with_pages(Arc::new(NotModified), "/{status}.html", pages.clone());

    let rec = serve(&handler, get("/cached")).await;

    assert_eq!(rec.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(rec.write_calls(), 0);
    assert!(rec.body().is_empty());
    assert!(pages.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_url_placeholder_is_escaped() {
    let pages = Arc::new(RecordingPages::default());
    let handler = with_pages(
        Arc::new(Status(StatusCode::INTERNAL_SERVER_ERROR)),
        "/error?status={status}&from={url}",
        pages.clone(),
    );

    let req = Request::builder()
        .uri("/broken?a=1")
        .header(HOST, "example.com")
        .body(full_body(""))
        .unwrap();
    serve(&handler, req).await;

    let seen = pages.seen.lock().unwrap();
    assert_eq!(
        seen[0].uri,
        "/error?status=500&from=http%3A%2F%2Fexample.com%2Fbroken%3Fa%3D1"
    );
    let uri: Uri = seen[0].uri.parse().unwrap();
    assert_eq!(uri.path(), "/error");
}

#[tokio::test]
async fn test_invalid_page_query_falls_back_to_status_text() {
    let pages = Arc::new(RecordingPages::default());
    let handler = with_pages(
        Arc::new(Status(StatusCode::INTERNAL_SERVER_ERROR)),
        "/{status} page",
        pages.clone(),
    );

    let rec = serve(&handler, get("/broken")).await;

    assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(rec.body_string(), "Internal Server Error\n");
    assert!(rec.sent_headers().get("x-backend").is_none());
    assert!(pages.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_page_service_keeps_original_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed = listener.local_addr().unwrap();
    drop(listener);

    let target: Uri = format!("http://{}", closed).parse().unwrap();
    let handler = with_pages(
        Arc::new(Status(StatusCode::SERVICE_UNAVAILABLE)),
        "/{status}.html",
        ProxyHandler::new(target, http_client()),
    );

    let rec = serve(&handler, get("/broken")).await;

    assert_eq!(rec.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(rec.body_string(), "Bad Gateway\n");
}

#[tokio::test]
async fn test_informational_responses_keep_order() {
    /// 1xx 두 개를 보낸 뒤 500으로 응답하는 백엔드
    struct EarlyHints;

    #[async_trait]
    impl Handler for EarlyHints {
        async fn serve(&self, w: &mut dyn ResponseWriter, _req: Request<Body>) {
            w.write_header(StatusCode::CONTINUE);
            w.write_header(StatusCode::from_u16(103).unwrap());
            w.write_header(StatusCode::INTERNAL_SERVER_ERROR);
            write_all(w, b"backend body").await.unwrap();
        }
    }

    let handler = with_pages(
        Arc::new(EarlyHints),
        "/{status}.html",
        Arc::new(RecordingPages::default()),
    );

    let rec = serve(&handler, get("/")).await;

    assert_eq!(
        rec.informational(),
        &[StatusCode::CONTINUE, StatusCode::from_u16(103).unwrap()]
    );
    assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(rec.body_string(), "error page");
}
