use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::error::Error;
use super::handler::RequestHandler;
use super::Result;
use crate::middleware::handler::ConnectionInfo;
use crate::settings::ServerSettings;

pub struct ServerListener {
    http_listener: TcpListener,
}

impl ServerListener {
    pub async fn new(settings: &ServerSettings) -> Result<Self> {
        let addr = format!("{}:{}", settings.address, settings.http_port);
        let http_listener = TcpListener::bind(&addr).await.map_err(|e| {
            error!(error = %e, addr = %addr, "HTTP 포트 바인딩 실패");
            Error::Bind {
                addr: addr.clone(),
                source: e,
            }
        })?;

        info!(addr = %http_listener.local_addr()?, entry_point = %settings.entry_point, "HTTP 리스너 시작");

        Ok(Self { http_listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.http_listener.local_addr()?)
    }

    /// `shutdown`이 끝나면 새 연결을 더 받지 않고 반환합니다. 처리 중인
    /// 연결은 각자의 태스크에서 마저 처리됩니다.
    pub async fn run<F>(self, handler: Arc<RequestHandler>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.http_listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let handler = handler.clone();
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let info = ConnectionInfo { remote_addr, tls: false };
                                if let Err(err) = handler.handle_connection(io, info).await {
                                    error!(error = %err, remote = %remote_addr, "HTTP 연결 처리 실패");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "HTTP 연결 수락 실패");
                        }
                    }
                }

                _ = &mut shutdown => {
                    info!("HTTP 리스너 종료");
                    return Ok(());
                }
            }
        }
    }
}
