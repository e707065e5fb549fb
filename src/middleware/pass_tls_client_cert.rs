use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hyper::header::HeaderValue;
use hyper::Request;
use tracing::debug;

use super::error::BuildError;
use super::handler::{Body, BoxHandler, ClientCertificate, Handler};
use super::writer::ResponseWriter;
use crate::dynamic::PassTlsClientCertConfig;

pub const CLIENT_CERT_HEADER: &str = "x-forwarded-tls-client-cert";

/// mTLS 클라이언트 인증서를 백엔드로 전달합니다.
///
/// 클라이언트가 보낸 같은 이름의 헤더는 항상 제거됩니다.
pub struct PassTlsClientCert {
    next: BoxHandler,
    pem: bool,
}

pub fn new(next: BoxHandler, config: &PassTlsClientCertConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "passTLSClientCert", "미들웨어 생성");
    Ok(Arc::new(PassTlsClientCert {
        next,
        pem: config.pem,
    }))
}

/// PEM 구분선과 줄바꿈을 뺀 base64 본문을 쿼리 인코딩합니다.
fn encode_certificate(der: &[u8]) -> String {
    let encoded = BASE64.encode(der);
    url::form_urlencoded::byte_serialize(encoded.as_bytes()).collect()
}

#[async_trait]
impl Handler for PassTlsClientCert {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        req.headers_mut().remove(CLIENT_CERT_HEADER);

        if self.pem {
            let certificate = req.extensions().get::<ClientCertificate>().cloned();
            match certificate {
                Some(ClientCertificate(der)) => {
                    if let Ok(value) = HeaderValue::from_str(&encode_certificate(&der)) {
                        req.headers_mut().insert(CLIENT_CERT_HEADER, value);
                    }
                }
                None => debug!("클라이언트 인증서 없음"),
            }
        }

        self.next.serve(w, req).await;
    }
}
