use std::convert::Infallible;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::UPGRADE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use tracing::{debug, error};

use crate::middleware::handler::{BoxError, BoxHandler, ConnectionInfo};
use crate::middleware::writer::{ChannelBody, ChannelWriter};

/// hyper 연결과 엔트리포인트 핸들러를 잇습니다.
///
/// 핸들러는 별도 태스크에서 `ChannelWriter`에 응답을 기록하고, 이쪽은
/// 최종 상태 코드가 기록되는 순간 응답 헤드를 hyper에 돌려줍니다.
pub struct RequestHandler {
    entry: BoxHandler,
}

impl RequestHandler {
    pub fn new(entry: BoxHandler) -> Self {
        Self { entry }
    }

    pub async fn handle_request(
        &self,
        mut req: Request<Incoming>,
        info: ConnectionInfo,
    ) -> Result<Response<ChannelBody>, Infallible> {
        let upgrade = if req.headers().contains_key(UPGRADE) {
            Some(hyper::upgrade::on(&mut req))
        } else {
            None
        };

        req.extensions_mut().insert(info);
        let req = req.map(|body| body.map_err(|e| Box::new(e) as BoxError).boxed());

        let (mut writer, head_rx, guard) = ChannelWriter::new(upgrade);
        let entry = self.entry.clone();
        tokio::spawn(async move {
            entry.serve(&mut writer, req).await;
            writer.finish();
        });

        match head_rx.await {
            Ok(mut response) => {
                response.body_mut().attach(guard);
                Ok(response)
            }
            Err(_) => {
                error!(remote = %info.remote_addr, "핸들러가 응답을 기록하지 않고 종료되었습니다");
                let mut response = Response::new(ChannelBody::empty());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                Ok(response)
            }
        }
    }

    pub async fn handle_connection<I>(
        &self,
        io: I,
        info: ConnectionInfo,
    ) -> std::result::Result<(), hyper::Error>
    where
        I: hyper::rt::Read + hyper::rt::Write + Send + Unpin + 'static,
    {
        debug!(remote = %info.remote_addr, "연결 처리 시작");
        http1::Builder::new()
            .serve_connection(io, service_fn(|req| self.handle_request(req, info)))
            .with_upgrades()
            .await
    }
}
