use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use hyper::header::{self, HeaderValue};
use hyper::{HeaderMap, StatusCode};

use super::{copy_headers, is_informational, write_all, Capabilities, ResponseWriter, WriterError};

/// 메모리에 응답을 기록하는 writer
///
/// flush는 지원하지만 하이재킹은 지원하지 않습니다. 응답 버퍼링과
/// 테스트에서 사용합니다.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    sent_headers: Option<HeaderMap>,
    status: Option<StatusCode>,
    informational: Vec<StatusCode>,
    body: BytesMut,
    write_calls: usize,
    flushes: usize,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 최종 상태 코드. 기록되지 않았으면 200입니다.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn status_written(&self) -> Option<StatusCode> {
        self.status
    }

    /// 기록된 1xx 상태 코드 (순서 유지)
    pub fn informational(&self) -> &[StatusCode] {
        &self.informational
    }

    /// 최종 상태 코드가 기록된 시점의 헤더
    pub fn sent_headers(&self) -> &HeaderMap {
        self.sent_headers.as_ref().unwrap_or(&self.headers)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_body(self) -> Bytes {
        self.body.freeze()
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// 기록된 응답을 다른 writer로 재생합니다.
    pub async fn replay(&self, w: &mut dyn ResponseWriter) -> io::Result<()> {
        for status in &self.informational {
            w.write_header(*status);
        }

        copy_headers(w.headers_mut(), self.sent_headers());
        if let Ok(len) = HeaderValue::from_str(&self.body.len().to_string()) {
            w.headers_mut().insert(header::CONTENT_LENGTH, len);
        }
        w.write_header(self.status());

        if !self.body.is_empty() {
            write_all(w, &self.body).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseWriter for ResponseRecorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        if is_informational(status) {
            self.informational.push(status);
            return;
        }
        self.status = Some(status);
        self.sent_headers = Some(self.headers.clone());
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.write_calls += 1;
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(true, false, false)
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recorder_defaults_to_ok() {
        let mut rec = ResponseRecorder::new();
        rec.write(b"hello").await.unwrap();

        assert_eq!(rec.status_written(), Some(StatusCode::OK));
        assert_eq!(rec.body(), b"hello");
        assert_eq!(rec.write_calls(), 1);
    }

    #[tokio::test]
    async fn test_recorder_informational_order() {
        let mut rec = ResponseRecorder::new();
        rec.write_header(StatusCode::CONTINUE);
        rec.write_header(StatusCode::from_u16(103).unwrap());
        rec.write_header(StatusCode::CREATED);
        rec.write_header(StatusCode::ACCEPTED);

        assert_eq!(
            rec.informational(),
            &[StatusCode::CONTINUE, StatusCode::from_u16(103).unwrap()]
        );
        assert_eq!(rec.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_headers_snapshot_on_commit() {
        let mut rec = ResponseRecorder::new();
        rec.headers_mut()
            .insert("x-before", HeaderValue::from_static("1"));
        rec.write_header(StatusCode::OK);
        rec.headers_mut().insert("x-after", HeaderValue::from_static("1"));

        assert!(rec.sent_headers().contains_key("x-before"));
        assert!(!rec.sent_headers().contains_key("x-after"));
    }

    #[tokio::test]
    async fn test_replay() {
        let mut source = ResponseRecorder::new();
        source
            .headers_mut()
            .insert("x-test", HeaderValue::from_static("yes"));
        source.write_header(StatusCode::NOT_FOUND);
        source.write(b"missing").await.unwrap();

        let mut target = ResponseRecorder::new();
        source.replay(&mut target).await.unwrap();

        assert_eq!(target.status(), StatusCode::NOT_FOUND);
        assert_eq!(target.body(), b"missing");
        assert_eq!(target.sent_headers().get("x-test").unwrap(), "yes");
        assert_eq!(target.sent_headers().get(header::CONTENT_LENGTH).unwrap(), "7");
    }
}
