use std::io;

use async_trait::async_trait;
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, StatusCode};

use crate::middleware::writer::{
    is_informational, Capabilities, CloseNotify, ResponseWriter, WriterError,
};

/// 에러 페이지 응답의 상태 코드를 원래 코드로 바꾸는 writer
pub(super) struct CodeModifier<'a> {
    inner: &'a mut dyn ResponseWriter,
    caps: Capabilities,
    code: StatusCode,
    header_sent: bool,
}

impl<'a> CodeModifier<'a> {
    pub(super) fn new(inner: &'a mut dyn ResponseWriter, code: StatusCode) -> Self {
        let caps = Capabilities::detect(&*inner);
        Self {
            inner,
            caps,
            code,
            header_sent: false,
        }
    }

    pub(super) fn header_sent(&self) -> bool {
        self.header_sent
    }
}

#[async_trait]
impl ResponseWriter for CodeModifier<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.header_sent {
            return;
        }
        if is_informational(status) {
            self.inner.write_header(status);
            return;
        }
        self.inner.write_header(self.code);
        self.header_sent = true;
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_header(self.code);
        self.inner.write(buf).await
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        if !self.caps.can_flush() {
            return Err(WriterError::NotFlusher(self.inner.writer_name()));
        }
        self.write_header(self.code);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::writer::ResponseRecorder;

    #[tokio::test]
    async fn test_status_replaced_with_original() {
        let mut rec = ResponseRecorder::new();
        let mut modifier = CodeModifier::new(&mut rec, StatusCode::SERVICE_UNAVAILABLE);

        modifier.write_header(StatusCode::OK);
        modifier.write(b"<h1>sorry</h1>").await.unwrap();

        assert!(modifier.header_sent());
        assert_eq!(rec.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(rec.body(), b"<h1>sorry</h1>");
    }

    #[tokio::test]
    async fn test_informational_passes_through() {
        let mut rec = ResponseRecorder::new();
        let mut modifier = CodeModifier::new(&mut rec, StatusCode::NOT_FOUND);

        modifier.write_header(StatusCode::CONTINUE);
        modifier.write(b"x").await.unwrap();

        assert_eq!(rec.informational(), &[StatusCode::CONTINUE]);
        assert_eq!(rec.status(), StatusCode::NOT_FOUND);
    }
}
