use std::io;

use async_trait::async_trait;
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, StatusCode};

use super::ranges::HttpCodeRanges;
use crate::middleware::writer::{
    copy_headers, is_informational, Capabilities, CloseNotify, ResponseWriter, WriterError,
};

/// 설정된 범위의 상태 코드를 가로채는 writer
///
/// 범위에 든 상태 코드가 기록되면 그 응답의 헤더와 본문은 클라이언트로
/// 나가지 않고, 기록은 성공한 것처럼 보고됩니다.
pub(super) struct CodeCatcher<'a> {
    inner: &'a mut dyn ResponseWriter,
    caps: Capabilities,
    ranges: &'a HttpCodeRanges,
    headers: HeaderMap,
    code: StatusCode,
    filtered: bool,
    headers_sent: bool,
}

impl<'a> CodeCatcher<'a> {
    pub(super) fn new(inner: &'a mut dyn ResponseWriter, ranges: &'a HttpCodeRanges) -> Self {
        let caps = Capabilities::detect(&*inner);
        Self {
            inner,
            caps,
            ranges,
            headers: HeaderMap::new(),
            code: StatusCode::OK,
            filtered: false,
            headers_sent: false,
        }
    }

    pub(super) fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub(super) fn code(&self) -> StatusCode {
        self.code
    }
}

#[async_trait]
impl ResponseWriter for CodeCatcher<'_> {
    fn headers(&self) -> &HeaderMap {
        if self.headers_sent {
            self.inner.headers()
        } else {
            &self.headers
        }
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        if self.headers_sent {
            self.inner.headers_mut()
        } else {
            &mut self.headers
        }
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.headers_sent || self.filtered {
            return;
        }

        if is_informational(status) {
            copy_headers(self.inner.headers_mut(), &self.headers);
            self.inner.write_header(status);
            return;
        }

        self.code = status;
        if self.ranges.contains(status) {
            self.filtered = true;
            return;
        }

        copy_headers(self.inner.headers_mut(), &self.headers);
        self.inner.write_header(status);
        self.headers_sent = true;
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_header(self.code);
        if self.filtered {
            return Ok(buf.len());
        }
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
        if self.filtered {
            return Ok(());
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
