//! 요청/응답 바이트 수와 최종 상태 코드 측정
//!
//! 엔트리포인트의 가장 바깥에서 요청마다 `Capture`를 만들어 요청 extension에
//! 넣습니다. 안쪽의 access log, metrics 핸들러가 같은 값을 읽습니다.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, Request, StatusCode};

use super::handler::{Body, BoxError, BoxHandler, Handler};
use super::writer::{is_informational, Capabilities, CloseNotify, ResponseWriter, WriterError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("capture not found")]
    NotFound,
}

#[derive(Debug, Default)]
struct CaptureState {
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    status: AtomicU16,
}

/// 요청 단위 측정값
#[derive(Debug, Clone, Default)]
pub struct Capture {
    state: Arc<CaptureState>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_request<B>(req: &Request<B>) -> Result<Capture, CaptureError> {
        req.extensions()
            .get::<Capture>()
            .cloned()
            .ok_or(CaptureError::NotFound)
    }

    /// 다운스트림이 읽은 요청 본문 바이트 수
    pub fn request_size(&self) -> u64 {
        self.state.bytes_read.load(Ordering::Relaxed)
    }

    /// 클라이언트로 기록된 응답 본문 바이트 수
    pub fn response_size(&self) -> u64 {
        self.state.bytes_written.load(Ordering::Relaxed)
    }

    /// 최종 상태 코드. 아직 기록되지 않았다면 200입니다.
    pub fn status(&self) -> StatusCode {
        match self.state.status.load(Ordering::Relaxed) {
            0 => StatusCode::OK,
            code => StatusCode::from_u16(code).unwrap_or(StatusCode::OK),
        }
    }

    fn add_read(&self, n: usize) {
        self.state.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn add_written(&self, n: usize) {
        self.state.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn set_status_once(&self, status: StatusCode) {
        let _ = self.state.status.compare_exchange(
            0,
            status.as_u16(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }
}

pub struct CaptureHandler {
    next: BoxHandler,
}

impl CaptureHandler {
    pub fn wrap(next: BoxHandler) -> BoxHandler {
        Arc::new(Self { next })
    }
}

#[async_trait]
impl Handler for CaptureHandler {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let capture = Capture::new();

        let (mut parts, body) = req.into_parts();
        parts.extensions.insert(capture.clone());
        let body = CountingBody {
            inner: body,
            capture: capture.clone(),
        }
        .boxed();

        let mut writer = CaptureWriter::new(w, capture);
        self.next
            .serve(&mut writer, Request::from_parts(parts, body))
            .await;
    }
}

/// 읽힌 바이트 수를 세는 요청 본문
struct CountingBody {
    inner: Body,
    capture: Capture,
}

impl HttpBody for CountingBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let poll = Pin::new(&mut self.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &poll {
            if let Some(data) = frame.data_ref() {
                self.capture.add_read(data.len());
            }
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// 기록된 바이트 수와 최종 상태 코드를 세는 writer
pub(crate) struct CaptureWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    caps: Capabilities,
    capture: Capture,
}

impl<'a> CaptureWriter<'a> {
    pub(crate) fn new(inner: &'a mut dyn ResponseWriter, capture: Capture) -> Self {
        let caps = Capabilities::detect(&*inner);
        Self {
            inner,
            caps,
            capture,
        }
    }
}

#[async_trait]
impl ResponseWriter for CaptureWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
        if !is_informational(status) {
            self.capture.set_status_once(status);
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.capture.set_status_once(StatusCode::OK);
        let n = self.inner.write(buf).await?;
        self.capture.add_written(n);
        Ok(n)
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        if !self.caps.can_flush() {
            return Err(WriterError::NotFlusher(self.inner.writer_name()));
        }
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
