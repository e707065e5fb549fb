//! 요청/응답 본문 버퍼링과 크기 제한

use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::{BodyExt, Limited};
use hyper::header;
use hyper::{Request, StatusCode};
use tracing::debug;

use super::error::BuildError;
use super::handler::{full_body, Body, BoxError, BoxHandler, Handler};
use super::writer::{write_status, ResponseRecorder, ResponseWriter};
use crate::dynamic::BufferingConfig;

pub struct Buffering {
    next: BoxHandler,
    max_request: Option<usize>,
    max_response: Option<usize>,
    name: String,
}

pub fn new(next: BoxHandler, config: &BufferingConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "buffering", "미들웨어 생성");

    let limit = |v: u64| (v > 0).then(|| usize::try_from(v).unwrap_or(usize::MAX));
    Ok(Arc::new(Buffering {
        next,
        max_request: limit(config.max_request_body_bytes),
        max_response: limit(config.max_response_body_bytes),
        name: name.to_string(),
    }))
}

enum BodyFailure {
    TooLarge,
    Read,
}

impl Buffering {
    async fn buffer_request(&self, req: Request<Body>) -> Result<Request<Body>, BodyFailure> {
        let (mut parts, body) = req.into_parts();

        let bytes = match self.max_request {
            Some(max) => {
                let declared = parts
                    .headers
                    .get(header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<usize>().ok());
                if declared.is_some_and(|len| len > max) {
                    return Err(BodyFailure::TooLarge);
                }
                {
                    let collect: std::pin::Pin<
                        Box<dyn std::future::Future<Output = Result<http_body_util::Collected<bytes::Bytes>, BoxError>> + Send>,
                    > = Box::pin(Limited::new(body, max).collect());
                    collect
                }
                .await
                .map_err(|e| {
                    if e.is::<http_body_util::LengthLimitError>() {
                        BodyFailure::TooLarge
                    } else {
                        BodyFailure::Read
                    }
                })?
            }
            None => body.collect().await.map_err(|_| BodyFailure::Read)?,
        }
        .to_bytes();

        parts.headers.remove(header::TRANSFER_ENCODING);
        parts.headers.insert(header::CONTENT_LENGTH, bytes.len().into());
        Ok(Request::from_parts(parts, full_body(bytes)))
    }
}

#[async_trait]
impl Handler for Buffering {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let req = match self.buffer_request(req).await {
            Ok(req) => req,
            Err(BodyFailure::TooLarge) => {
                debug!(middleware = %self.name, "요청 본문 크기 초과");
                write_status(w, StatusCode::PAYLOAD_TOO_LARGE).await;
                return;
            }
            Err(BodyFailure::Read) => {
                debug!(middleware = %self.name, "요청 본문 읽기 실패");
                write_status(w, StatusCode::BAD_REQUEST).await;
                return;
            }
        };

        let mut recorder = ResponseRecorder::new();
        self.next.serve(&mut recorder, req).await;

        if self.max_response.is_some_and(|max| recorder.body().len() > max) {
            debug!(middleware = %self.name, size = recorder.body().len(), "응답 본문 크기 초과");
            write_status(w, StatusCode::INTERNAL_SERVER_ERROR).await;
            return;
        }
        if let Err(e) = recorder.replay(w).await {
            debug!(middleware = %self.name, error = %e, "버퍼링된 응답 전송 실패");
        }
    }
}
