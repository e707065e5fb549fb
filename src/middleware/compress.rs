//! gzip 응답 압축 미들웨어

use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use flate2::write::GzEncoder;
use flate2::Compression;
use hyper::header::{self, HeaderValue};
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, Request, StatusCode};
use tracing::debug;

use super::error::BuildError;
use super::handler::{Body, BoxHandler, Handler};
use super::writer::{write_all, Capabilities, CloseNotify, ResponseWriter, WriterError};
use crate::dynamic::CompressConfig;

/// 항상 압축하지 않는 미디어 타입
const ALWAYS_EXCLUDED: &[&str] = &["application/grpc", "text/event-stream"];

pub struct Compress {
    next: BoxHandler,
    excluded: Vec<String>,
    min_size: usize,
    name: String,
}

pub fn new(next: BoxHandler, config: &CompressConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "compress", "미들웨어 생성");

    let mut excluded = Vec::new();
    for content_type in &config.excluded_content_types {
        let media = media_type(content_type);
        if media.is_empty() || !media.contains('/') {
            return Err(BuildError::invalid(
                name,
                format!("invalid excluded content type {:?}", content_type),
            ));
        }
        excluded.push(media);
    }
    excluded.extend(ALWAYS_EXCLUDED.iter().map(|m| m.to_string()));

    Ok(Arc::new(Compress {
        next,
        excluded,
        min_size: config.min_response_body_bytes,
        name: name.to_string(),
    }))
}

fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Accept-Encoding이 gzip을 허용하는지 확인합니다.
fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| {
            let mut params = item.split(';').map(str::trim);
            let coding = params.next().unwrap_or_default();
            let rejected = params.any(|p| {
                p.strip_prefix("q=")
                    .and_then(|q| q.parse::<f32>().ok())
                    .is_some_and(|q| q == 0.0)
            });
            (coding.eq_ignore_ascii_case("gzip") || coding == "*") && !rejected
        })
}

#[async_trait]
impl Handler for Compress {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        if !accepts_gzip(req.headers()) || req.method() == hyper::Method::HEAD {
            self.next.serve(w, req).await;
            return;
        }

        let mut writer = CompressWriter::new(w, self);
        self.next.serve(&mut writer, req).await;
        if let Err(e) = writer.finish().await {
            debug!(middleware = %self.name, error = %e, "압축 응답 마무리 실패");
        }
    }
}

enum State {
    /// 압축 여부를 정하기 전. 본문을 모으는 중
    Pending {
        status: Option<StatusCode>,
        buffer: BytesMut,
    },
    Compressing(GzEncoder<Vec<u8>>),
    Passthrough,
}

struct CompressWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    caps: Capabilities,
    config: &'a Compress,
    state: State,
}

impl<'a> CompressWriter<'a> {
    fn new(inner: &'a mut dyn ResponseWriter, config: &'a Compress) -> Self {
        let caps = Capabilities::detect(&*inner);
        Self {
            inner,
            caps,
            config,
            state: State::Pending {
                status: None,
                buffer: BytesMut::new(),
            },
        }
    }

    fn should_compress(&self, status: StatusCode) -> bool {
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
            return false;
        }
        let headers = self.inner.headers();
        if headers.contains_key(header::CONTENT_ENCODING) {
            return false;
        }
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();
        !self.config.excluded.iter().any(|m| *m == content_type)
    }

    /// 모은 본문으로 압축 여부를 정하고 상태 코드를 내보냅니다.
    async fn decide(&mut self, compress: bool) -> io::Result<()> {
        let State::Pending { status, buffer } =
            std::mem::replace(&mut self.state, State::Passthrough)
        else {
            return Ok(());
        };
        let status = status.unwrap_or(StatusCode::OK);

        if compress && self.should_compress(status) {
            let headers = self.inner.headers_mut();
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            headers.remove(header::CONTENT_LENGTH);
            headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
            self.inner.write_header(status);

            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&buffer)?;
            self.state = State::Compressing(encoder);
            return Ok(());
        }

        self.inner.write_header(status);
        if !buffer.is_empty() {
            write_all(self.inner, &buffer).await?;
        }
        Ok(())
    }

    /// 인코더에 쌓인 출력을 내보냅니다.
    async fn drain(&mut self) -> io::Result<()> {
        if let State::Compressing(encoder) = &mut self.state {
            let output = std::mem::take(encoder.get_mut());
            if !output.is_empty() {
                write_all(self.inner, &output).await?;
            }
        }
        Ok(())
    }

    async fn finish(mut self) -> io::Result<()> {
        match std::mem::replace(&mut self.state, State::Passthrough) {
            State::Pending { status, buffer } => {
                // 아무것도 기록하지 않은 핸들러는 그대로 둡니다
                if status.is_none() && buffer.is_empty() {
                    return Ok(());
                }
                let enough = buffer.len() >= self.config.min_size;
                self.state = State::Pending { status, buffer };
                self.decide(enough).await
            }
            State::Compressing(encoder) => {
                let output = encoder.finish()?;
                if !output.is_empty() {
                    write_all(self.inner, &output).await?;
                }
                Ok(())
            }
            State::Passthrough => Ok(()),
        }
    }
}

#[async_trait]
impl ResponseWriter for CompressWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        match &mut self.state {
            State::Pending { status: pending, .. } => {
                if status.is_informational() {
                    if status == StatusCode::SWITCHING_PROTOCOLS {
                        self.state = State::Passthrough;
                    }
                    self.inner.write_header(status);
                } else if pending.is_none() {
                    *pending = Some(status);
                }
            }
            _ => self.inner.write_header(status),
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.state {
            State::Pending { buffer, .. } => {
                buffer.extend_from_slice(buf);
                if buffer.len() >= self.config.min_size {
                    self.decide(true).await?;
                    self.drain().await?;
                }
                Ok(buf.len())
            }
            State::Compressing(encoder) => {
                encoder.write_all(buf)?;
                self.drain().await?;
                Ok(buf.len())
            }
            State::Passthrough => self.inner.write(buf).await,
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        if !self.caps.can_flush() {
            return Err(WriterError::NotFlusher(self.inner.writer_name()));
        }

        let result = match &mut self.state {
            // 크기를 알기 전에 flush하면 압축하지 않고 내보냅니다
            State::Pending { .. } => self.decide(false).await,
            State::Compressing(encoder) => match encoder.flush() {
                Ok(()) => self.drain().await,
                Err(e) => Err(e),
            },
            State::Passthrough => Ok(()),
        };
        if let Err(e) = result {
            debug!(middleware = %self.config.name, error = %e, "압축 flush 실패");
            return Err(WriterError::Closed);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler::empty_body;
    use crate::middleware::writer::ResponseRecorder;
    use flate2::read::GzDecoder;
    use std::io::Read;

    struct Text {
        body: Vec<u8>,
        content_type: &'static str,
        flush_first: bool,
    }

    #[async_trait]
    impl Handler for Text {
        async fn serve(&self, w: &mut dyn ResponseWriter, _req: Request<Body>) {
            w.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
            if self.flush_first {
                write_all(w, b"early").await.unwrap();
                w.flush().await.unwrap();
            }
            for chunk in self.body.chunks(100) {
                write_all(w, chunk).await.unwrap();
            }
        }
    }

    fn handler(body: Vec<u8>, content_type: &'static str, config: CompressConfig) -> BoxHandler {
        new(
            Arc::new(Text {
                body,
                content_type,
                flush_first: false,
            }),
            &config,
            "gzip@file",
        )
        .unwrap()
    }

    fn gzip_request() -> Request<Body> {
        Request::builder()
            .header(header::ACCEPT_ENCODING, "gzip, deflate")
            .body(empty_body())
            .unwrap()
    }

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn test_large_body_compressed() {
        let body = vec![b'a'; 4096];
        let handler = handler(body.clone(), "text/plain", CompressConfig::default());

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, gzip_request()).await;

        assert_eq!(rec.sent_headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(rec.sent_headers()[header::VARY], "Accept-Encoding");
        assert_eq!(gunzip(rec.body()), body);
    }

    #[tokio::test]
    async fn test_small_body_uncompressed() {
        let handler = handler(b"tiny".to_vec(), "text/plain", CompressConfig::default());

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, gzip_request()).await;

        assert!(rec.sent_headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(rec.body(), b"tiny");
    }

    #[tokio::test]
    async fn test_excluded_content_type() {
        let config = CompressConfig {
            excluded_content_types: vec!["image/png".to_string()],
            ..Default::default()
        };
        let handler = handler(vec![0; 4096], "image/png; charset=binary", config);

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, gzip_request()).await;
        assert!(rec.sent_headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(rec.body().len(), 4096);
    }

    #[tokio::test]
    async fn test_client_without_gzip() {
        let handler = handler(vec![b'a'; 4096], "text/plain", CompressConfig::default());

        let req = Request::builder()
            .header(header::ACCEPT_ENCODING, "gzip;q=0, br")
            .body(empty_body())
            .unwrap();
        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, req).await;
        assert!(rec.sent_headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_flush_before_decision_sends_plain() {
        let handler = new(
            Arc::new(Text {
                body: vec![b'a'; 4096],
                content_type: "text/plain",
                flush_first: true,
            }),
            &CompressConfig::default(),
            "gzip@file",
        )
        .unwrap();

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, gzip_request()).await;
        assert!(rec.sent_headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(rec.body().len(), 4096 + 5);
        assert_eq!(rec.flushes(), 1);
    }

    #[test]
    fn test_accepts_gzip() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_gzip(&headers));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("br, GZIP;q=0.5"));
        assert!(accepts_gzip(&headers));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("*"));
        assert!(accepts_gzip(&headers));
    }
}
