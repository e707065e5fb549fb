//! 응답 writer 추상화
//!
//! 핸들러는 응답을 반환하지 않고 `ResponseWriter`에 기록합니다. 미들웨어는
//! writer를 감싸서 상태 코드와 헤더, 본문 스트림을 가로채거나 지연시킵니다.

mod capability;
mod channel;
mod recorder;

use std::io;

use async_trait::async_trait;
use hyper::header::{self, HeaderValue};
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, StatusCode};
use tokio::sync::watch;
use tracing::debug;

pub use capability::Capabilities;
pub use channel::{ChannelBody, ChannelWriter, DisconnectGuard};
pub use recorder::ResponseRecorder;

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("{0} does not implement flush")]
    NotFlusher(&'static str),

    #[error("{0} does not implement hijack")]
    NotHijacker(&'static str),

    #[error("연결이 이미 하이재킹되었습니다")]
    AlreadyHijacked,

    #[error("클라이언트 연결이 종료되었습니다")]
    Closed,
}

/// 응답 기록 인터페이스
///
/// `headers`/`write_header`/`write`가 필수 표면이고, flush, hijack,
/// close-notify는 선택 기능입니다. 선택 기능의 노출 여부는
/// `capabilities`로 보고하며, 래퍼는 감싼 writer가 노출한 기능만 다시
/// 노출해야 합니다.
#[async_trait]
pub trait ResponseWriter: Send {
    /// 아직 전송되지 않은 응답 헤더
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// 상태 코드를 기록합니다. 1xx(101 제외)는 여러 번 기록될 수 있고,
    /// 최종 상태 코드 이후의 호출은 무시됩니다.
    fn write_header(&mut self, status: StatusCode);

    /// 본문을 기록합니다. 상태 코드가 없으면 200이 먼저 기록됩니다.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        Err(WriterError::NotFlusher(self.writer_name()))
    }

    /// 원시 연결을 넘겨받습니다. 업그레이드 응답(101)을 기록한 뒤
    /// 반환된 future를 기다리면 업그레이드된 연결이 나옵니다.
    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        Err(WriterError::NotHijacker(self.writer_name()))
    }

    fn close_notify(&self) -> Option<CloseNotify> {
        None
    }

    fn writer_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// 클라이언트 연결 종료 알림
#[derive(Debug, Clone)]
pub struct CloseNotify {
    rx: watch::Receiver<bool>,
}

impl CloseNotify {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_closed(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// 연결이 종료될 때까지 기다립니다.
    pub async fn closed(mut self) {
        let _ = self.rx.wait_for(|closed| *closed).await;
    }
}

/// 101을 제외한 1xx 상태 코드인지 확인합니다.
pub fn is_informational(status: StatusCode) -> bool {
    status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS
}

pub async fn write_all(w: &mut dyn ResponseWriter, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = w.write(buf).await?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        buf = &buf[n..];
    }
    Ok(())
}

/// 평문 에러 응답을 기록합니다.
pub async fn write_error(w: &mut dyn ResponseWriter, status: StatusCode, message: &str) {
    let headers = w.headers_mut();
    headers.remove(header::CONTENT_LENGTH);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    w.write_header(status);

    let body = format!("{}\n", message);
    if let Err(e) = write_all(w, body.as_bytes()).await {
        debug!(error = %e, status = %status, "에러 응답 본문 전송 실패");
    }
}

/// 상태 코드의 표준 문구로 에러 응답을 기록합니다.
pub async fn write_status(w: &mut dyn ResponseWriter, status: StatusCode) {
    let reason = status.canonical_reason().unwrap_or("Unknown Status");
    write_error(w, status, reason).await;
}

/// `src`의 헤더를 `dst`에 키 단위로 덮어씁니다.
///
/// 1xx 응답이 여러 번 나갈 수 있으므로 값을 이어 붙이지 않습니다.
pub fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap) {
    for key in src.keys() {
        dst.remove(key);
        for value in src.get_all(key) {
            dst.append(key.clone(), value.clone());
        }
    }
}
