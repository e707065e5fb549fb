use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame};
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, Response, StatusCode};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::{is_informational, Capabilities, CloseNotify, ResponseWriter, WriterError};
use crate::middleware::handler::BoxError;

const BODY_CHANNEL_CAPACITY: usize = 16;

type Chunk = Result<Frame<Bytes>, BoxError>;

/// hyper 서버 연결과 핸들러를 잇는 writer
///
/// 최종 상태 코드가 기록되면 응답 헤드가 oneshot으로 전달되고, 이후 본문은
/// 채널을 통해 스트리밍됩니다.
///
/// hyper 1 서버는 중간 응답을 내보낼 수 없으므로 101을 제외한 1xx 상태
/// 코드(103 Early Hints 포함)는 클라이언트에 전달되지 않고 버려집니다.
/// 1xx를 관찰해야 하면 `ResponseRecorder`를 사용하세요.
pub struct ChannelWriter {
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<Response<ChannelBody>>>,
    body_tx: mpsc::Sender<Chunk>,
    body_rx: Option<mpsc::Receiver<Chunk>>,
    upgrade: Option<OnUpgrade>,
    hijackable: bool,
    closed: watch::Receiver<bool>,
    committed: bool,
}

impl ChannelWriter {
    pub fn new(
        upgrade: Option<OnUpgrade>,
    ) -> (Self, oneshot::Receiver<Response<ChannelBody>>, DisconnectGuard) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let (closed_tx, closed_rx) = watch::channel(false);

        let writer = Self {
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx,
            body_rx: Some(body_rx),
            hijackable: upgrade.is_some(),
            upgrade,
            closed: closed_rx,
            committed: false,
        };

        (writer, head_rx, DisconnectGuard { tx: closed_tx })
    }

    fn commit(&mut self, status: StatusCode) {
        if self.committed {
            return;
        }
        self.committed = true;

        let Some(head_tx) = self.head_tx.take() else {
            return;
        };
        let mut response = Response::new(ChannelBody {
            rx: self.body_rx.take(),
            guard: None,
        });
        *response.status_mut() = status;
        *response.headers_mut() = self.headers.clone();

        if head_tx.send(response).is_err() {
            debug!(status = %status, "응답 헤드 전송 전에 클라이언트 연결이 종료되었습니다");
        }
    }

    /// 핸들러가 끝난 뒤 호출합니다. 아무것도 기록되지 않았다면 빈 200 응답을
    /// 보냅니다.
    pub fn finish(mut self) {
        if !self.committed {
            self.commit(StatusCode::OK);
        }
    }
}

#[async_trait]
impl ResponseWriter for ChannelWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.committed {
            warn!(status = %status, "중복된 write_header 호출을 무시합니다");
            return;
        }
        if is_informational(status) {
            // hyper 서버는 중간 1xx 응답을 보낼 수 없습니다
            debug!(status = %status, "1xx 응답을 전송하지 않고 건너뜁니다");
            return;
        }
        self.commit(status);
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.committed {
            self.commit(StatusCode::OK);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        self.body_tx
            .send(Ok(Frame::data(Bytes::copy_from_slice(buf))))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))?;
        Ok(buf.len())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(true, self.hijackable, true)
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        if !self.committed {
            self.commit(StatusCode::OK);
        }
        if self.body_tx.is_closed() {
            return Err(WriterError::Closed);
        }
        Ok(())
    }

    fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        if !self.hijackable {
            return Err(WriterError::NotHijacker(self.writer_name()));
        }
        self.upgrade.take().ok_or(WriterError::AlreadyHijacked)
    }

    fn close_notify(&self) -> Option<CloseNotify> {
        Some(CloseNotify::new(self.closed.clone()))
    }
}

/// 응답 본문 스트림
///
/// 연결 종료 가드를 함께 들고 있어서 hyper가 본문을 버리면 close-notify가
/// 발생합니다.
pub struct ChannelBody {
    rx: Option<mpsc::Receiver<Chunk>>,
    guard: Option<DisconnectGuard>,
}

impl ChannelBody {
    pub fn empty() -> Self {
        Self {
            rx: None,
            guard: None,
        }
    }

    pub fn attach(&mut self, guard: DisconnectGuard) {
        self.guard = Some(guard);
    }
}

impl HttpBody for ChannelBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.rx.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

/// 드롭되면 연결 종료를 알립니다.
pub struct DisconnectGuard {
    tx: watch::Sender<bool>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(true);
    }
}
