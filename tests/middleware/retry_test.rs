use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::http::request::Parts;
use hyper::{Request, StatusCode};
use reverse_proxy_chain::dynamic::RetryConfig;
use reverse_proxy_chain::middleware::handler::{full_body, Body};
use reverse_proxy_chain::middleware::retry::{self, AttemptTrace};
use reverse_proxy_chain::middleware::writer::write_all;
use reverse_proxy_chain::middleware::{
    BoxError, BoxHandler, Handler, ResponseWriter, RetryListener,
};

use crate::common::{get, serve};

/// `failures`번까지는 백엔드에 닿지 못한 것처럼 502로 응답하는 핸들러
struct Flaky {
    failures: u32,
    calls: AtomicU32,
    bodies: Mutex<Vec<String>>,
}

impl Flaky {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
            bodies: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for Flaky {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let trace = AttemptTrace::from_request(&req);
        let body = req.into_body().collect().await.unwrap().to_bytes();
        self.bodies
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&body).to_string());

        w.headers_mut()
            .insert("x-attempt", call.to_string().parse().unwrap());
        if call <= self.failures {
            w.write_header(StatusCode::BAD_GATEWAY);
            write_all(w, b"unreachable").await.unwrap();
            return;
        }

        if let Some(trace) = trace {
            trace.request_written();
        }
        write_all(w, b"ok").await.unwrap();
    }
}

/// 백엔드에 닿은 뒤 500으로 응답하는 핸들러
struct ReachedError {
    calls: AtomicU32,
}

#[async_trait]
impl Handler for ReachedError {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(trace) = AttemptTrace::from_request(&req) {
            trace.request_written();
        }
        w.write_header(StatusCode::INTERNAL_SERVER_ERROR);
    }
}

#[derive(Default)]
struct RecordingListener {
    attempts: Mutex<Vec<u32>>,
}

impl RetryListener for RecordingListener {
    fn retried(&self, _req: &Parts, attempt: u32) -> Result<(), BoxError> {
        self.attempts.lock().unwrap().push(attempt);
        Ok(())
    }
}

fn with_retry(
    next: BoxHandler,
    attempts: i32,
    listener: Arc<RecordingListener>,
) -> BoxHandler {
    let config = RetryConfig {
        attempts,
        initial_interval: None,
    };
    retry::new(next, &config, listener, "retry@file").unwrap()
}

#[tokio::test]
async fn test_retries_until_backend_reached() {
    let backend = Flaky::new(2);
    let listener = Arc::new(RecordingListener::default());
    let handler = with_retry(backend.clone(), 3, listener.clone());

    let rec = serve(&handler, get("/")).await;

    assert_eq!(rec.status(), StatusCode::OK);
    assert_eq!(rec.body_string(), "ok");
    assert_eq!(backend.calls(), 3);
    assert_eq!(*listener.attempts.lock().unwrap(), vec![2, 3]);
}

#[tokio::test]
async fn test_failed_attempt_headers_do_not_leak() {
    let backend = Flaky::new(1);
    let handler = with_retry(backend.clone(), 3, Arc::new(RecordingListener::default()));

    let rec = serve(&handler, get("/")).await;

    let values: Vec<_> = rec.sent_headers().get_all("x-attempt").iter().collect();
    assert_eq!(values, vec!["2"]);
}

#[tokio::test]
async fn test_last_attempt_is_delivered() {
    let backend = Flaky::new(10);
    let listener = Arc::new(RecordingListener::default());
    let handler = with_retry(backend.clone(), 3, listener.clone());

    let rec = serve(&handler, get("/")).await;

    assert_eq!(rec.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(rec.body_string(), "unreachable");
    assert_eq!(backend.calls(), 3);
    assert_eq!(listener.attempts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_reached_backend_is_not_retried() {
    let backend = Arc::new(ReachedError {
        calls: AtomicU32::new(0),
    });
    let listener = Arc::new(RecordingListener::default());
    let handler = with_retry(backend.clone(), 4, listener.clone());

    let rec = serve(&handler, get("/")).await;

    assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert!(listener.attempts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_request_body_replayed_on_every_attempt() {
    let backend = Flaky::new(2);
    let handler = with_retry(backend.clone(), 3, Arc::new(RecordingListener::default()));

    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .body(full_body("payload"))
        .unwrap();
    serve(&handler, req).await;

    assert_eq!(
        *backend.bodies.lock().unwrap(),
        vec!["payload", "payload", "payload"]
    );
}

#[test]
fn test_zero_attempts_rejected() {
    let config = RetryConfig {
        attempts: 0,
        initial_interval: None,
    };
    let result = retry::new(
        Flaky::new(0),
        &config,
        Arc::new(RecordingListener::default()),
        "retry@file",
    );
    assert!(result.is_err());
}

/// 항상 실패하는 리스너
struct FailingListener;

impl RetryListener for FailingListener {
    fn retried(&self, _req: &Parts, _attempt: u32) -> Result<(), BoxError> {
        Err("listener unavailable".into())
    }
}

#[tokio::test]
async fn test_listener_failure_does_not_stop_retries() {
    let backend = Flaky::new(2);
    let config = RetryConfig {
        attempts: 3,
        initial_interval: None,
    };
    let handler = retry::new(backend.clone(), &config, Arc::new(FailingListener), "retry@file").unwrap();

    let rec = serve(&handler, get("/")).await;

    assert_eq!(backend.calls(), 3);
    assert_eq!(rec.status(), StatusCode::OK);
    assert_eq!(rec.body_string(), "ok");
}

/// `failures`번까지는 백엔드 없음(503)을 플러시하는 핸들러
struct NoBackend {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Handler for NoBackend {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            w.write_header(StatusCode::SERVICE_UNAVAILABLE);
            w.flush().await.unwrap();
            write_all(w, b"no backend").await.unwrap();
            return;
        }

        if let Some(trace) = AttemptTrace::from_request(&req) {
            trace.request_written();
        }
        write_all(w, b"ok").await.unwrap();
    }
}

#[tokio::test]
async fn test_flushed_no_backend_response_is_retried() {
    let backend = Arc::new(NoBackend {
        failures: 2,
        calls: AtomicU32::new(0),
    });
    let listener = Arc::new(RecordingListener::default());
    let handler = with_retry(backend.clone(), 3, listener.clone());

    let rec = serve(&handler, get("/")).await;

    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    assert_eq!(rec.status(), StatusCode::OK);
    assert_eq!(rec.body_string(), "ok");
    assert_eq!(rec.flushes(), 0);
    assert_eq!(*listener.attempts.lock().unwrap(), vec![2, 3]);
}

#[tokio::test]
async fn test_no_backend_on_last_attempt_is_delivered() {
    let backend = Arc::new(NoBackend {
        failures: 5,
        calls: AtomicU32::new(0),
    });
    let handler = with_retry(backend.clone(), 2, Arc::new(RecordingListener::default()));

    let rec = serve(&handler, get("/")).await;

    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(rec.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(rec.body_string(), "no backend");
}
