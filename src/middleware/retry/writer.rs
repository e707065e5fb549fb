use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, StatusCode};
use tracing::debug;

use super::NO_BACKEND_AVAILABLE;
use crate::middleware::writer::{
    copy_headers, is_informational, write_all, Capabilities, CloseNotify, ResponseWriter, WriterError,
};

/// 한 번의 시도를 감싸는 writer
///
/// 백엔드에 도달하기 전에는 상태 코드와 본문을 붙잡아 두고, 재시도가
/// 결정되면 모두 버립니다. 백엔드에 도달했거나 마지막 시도라면 붙잡아 둔
/// 응답을 실제 writer로 넘기고 이후로는 그대로 통과시킵니다.
pub(super) struct RetryWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    caps: Capabilities,
    headers: HeaderMap,
    retryable: bool,
    backend_reached: Arc<AtomicBool>,
    status: Option<StatusCode>,
    buffer: BytesMut,
    written: bool,
}

impl<'a> RetryWriter<'a> {
    pub(super) fn new(
        inner: &'a mut dyn ResponseWriter,
        retryable: bool,
        backend_reached: Arc<AtomicBool>,
    ) -> Self {
        let caps = Capabilities::detect(&*inner);
        Self {
            inner,
            caps,
            headers: HeaderMap::new(),
            retryable,
            backend_reached,
            status: None,
            buffer: BytesMut::new(),
            written: false,
        }
    }

    fn should_retry(&self) -> bool {
        self.retryable && !self.backend_reached.load(Ordering::Acquire)
    }

    fn write_headers(&mut self, status: StatusCode) {
        // 버려진 시도의 헤더는 실제 writer에 닿지 않습니다
        if is_informational(status) {
            copy_headers(self.inner.headers_mut(), &self.headers);
        } else {
            let headers = std::mem::take(&mut self.headers);
            copy_headers(self.inner.headers_mut(), &headers);
            self.written = true;
        }
        self.inner.write_header(status);
    }

    async fn commit(&mut self) -> io::Result<()> {
        if self.written {
            return Ok(());
        }
        let status = self.status.take().unwrap_or(StatusCode::OK);
        self.write_headers(status);

        if !self.buffer.is_empty() {
            let buffered = self.buffer.split().freeze();
            write_all(self.inner, &buffered).await?;
        }
        Ok(())
    }

    /// 시도를 마무리합니다. 재시도해야 하면 `true`를 반환합니다.
    pub(super) async fn finish(mut self) -> bool {
        if self.should_retry() {
            return true;
        }

        if !self.written && (self.status.is_some() || !self.buffer.is_empty()) {
            if let Err(e) = self.commit().await {
                debug!(error = %e, "보류 중인 응답 전달 실패");
            }
        }
        false
    }
}

#[async_trait]
impl ResponseWriter for RetryWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        if self.written {
            self.inner.headers()
        } else {
            &self.headers
        }
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        if self.written {
            self.inner.headers_mut()
        } else {
            &mut self.headers
        }
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.written {
            return;
        }

        if self.should_retry() {
            // 재시도 가능한 동안의 1xx는 버립니다
            if !is_informational(status) && self.status.is_none() {
                self.status = Some(status);
            }
            return;
        }

        if is_informational(status) {
            self.write_headers(status);
            return;
        }
        if !self.buffer.is_empty() {
            // 본문이 이미 기록되었으므로 상태 코드는 확정된 상태입니다
            return;
        }

        let status = self.status.take().unwrap_or(status);
        self.write_headers(status);
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written {
            return self.inner.write(buf).await;
        }

        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        if self.should_retry() {
            self.buffer.extend_from_slice(buf);
            return Ok(buf.len());
        }

        self.commit().await?;
        self.inner.write(buf).await
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        if !self.caps.can_flush() {
            return Err(WriterError::NotFlusher(self.inner.writer_name()));
        }

        if self.should_retry() {
            if self.status == Some(NO_BACKEND_AVAILABLE) {
                // 백엔드 없음 응답은 플러시되어도 재시도 대상으로 남습니다
                return Ok(());
            }
            self.retryable = false;
        }

        self.commit().await.map_err(|_| WriterError::Closed)?;
        self.inner.flush().await
    }

    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        if !self.caps.can_hijack() {
            return Err(WriterError::NotHijacker(self.inner.writer_name()));
        }
        self.retryable = false;
        self.inner.hijack()
    }

    fn close_notify(&self) -> Option<CloseNotify> {
        self.inner.close_notify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::writer::ResponseRecorder;
    use hyper::header::HeaderValue;

    fn flag(value: bool) -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(value))
    }

    #[tokio::test]
    async fn test_unreached_attempt_is_discarded() {
        let mut rec = ResponseRecorder::new();
        let mut writer = RetryWriter::new(&mut rec, true, flag(false));

        writer
            .headers_mut()
            .insert("x-attempt", HeaderValue::from_static("1"));
        writer.write_header(StatusCode::BAD_GATEWAY);
        writer.write(b"bad gateway").await.unwrap();

        assert!(writer.finish().await);
        assert_eq!(rec.status_written(), None);
        assert!(rec.body().is_empty());
        assert!(rec.headers().get("x-attempt").is_none());
    }

    #[tokio::test]
    async fn test_reached_attempt_is_delivered() {
        let mut rec = ResponseRecorder::new();
        let reached = flag(false);
        let mut writer = RetryWriter::new(&mut rec, true, reached.clone());

        reached.store(true, Ordering::Release);
        writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        writer.write(b"boom").await.unwrap();

        assert!(!writer.finish().await);
        assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(rec.body(), b"boom");
    }

    #[tokio::test]
    async fn test_last_attempt_commits_buffered_status() {
        let mut rec = ResponseRecorder::new();
        let mut writer = RetryWriter::new(&mut rec, false, flag(false));

        writer.write_header(StatusCode::SERVICE_UNAVAILABLE);

        assert!(!writer.finish().await);
        assert_eq!(rec.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_informational_dropped_while_retryable() {
        let mut rec = ResponseRecorder::new();
        let mut writer = RetryWriter::new(&mut rec, true, flag(false));

        writer.write_header(StatusCode::CONTINUE);
        assert!(writer.finish().await);
        assert!(rec.informational().is_empty());
    }

    #[tokio::test]
    async fn test_informational_forwarded_after_reach() {
        let mut rec = ResponseRecorder::new();
        let mut writer = RetryWriter::new(&mut rec, true, flag(true));

        writer
            .headers_mut()
            .insert("link", HeaderValue::from_static("</style.css>"));
        writer.write_header(StatusCode::from_u16(103).unwrap());
        writer.write_header(StatusCode::OK);
        writer.write(b"ok").await.unwrap();

        assert!(!writer.finish().await);
        assert_eq!(rec.informational(), &[StatusCode::from_u16(103).unwrap()]);
        assert_eq!(rec.status(), StatusCode::OK);
        assert!(rec.sent_headers().contains_key("link"));
    }

    #[tokio::test]
    async fn test_flush_commits_attempt() {
        let mut rec = ResponseRecorder::new();
        let mut writer = RetryWriter::new(&mut rec, true, flag(false));

        writer.write_header(StatusCode::OK);
        writer.write(b"partial").await.unwrap();
        writer.flush().await.unwrap();

        assert!(!writer.finish().await);
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body(), b"partial");
        assert_eq!(rec.flushes(), 1);
    }

    #[tokio::test]
    async fn test_flush_keeps_no_backend_retryable() {
        let mut rec = ResponseRecorder::new();
        let mut writer = RetryWriter::new(&mut rec, true, flag(false));

        writer.write_header(NO_BACKEND_AVAILABLE);
        writer.flush().await.unwrap();

        assert!(writer.finish().await);
        assert_eq!(rec.status_written(), None);
    }
}
