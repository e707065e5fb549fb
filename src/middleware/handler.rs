use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::Request;

use super::writer::ResponseWriter;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 미들웨어 체인을 흐르는 요청/응답 본문
pub type Body = BoxBody<Bytes, BoxError>;

/// 요청 처리기
///
/// 응답은 반환하지 않고 `ResponseWriter`에 기록합니다.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>);
}

pub type BoxHandler = Arc<dyn Handler>;

/// 요청이 들어온 연결 정보 (요청 extension으로 전달)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub remote_addr: SocketAddr,
    pub tls: bool,
}

impl ConnectionInfo {
    pub fn from_request<B>(req: &Request<B>) -> Option<ConnectionInfo> {
        req.extensions().get::<ConnectionInfo>().copied()
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls {
            "https"
        } else {
            "http"
        }
    }
}

/// mTLS 연결에서 받은 클라이언트 인증서 (DER)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate(pub Bytes);

pub fn empty_body() -> Body {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

pub fn full_body(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed()
}
