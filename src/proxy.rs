//! 백엔드로 요청을 전달하는 리버스 프록시 핸들러

use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tracing::{debug, warn};

use crate::middleware::handler::{Body, BoxHandler, ConnectionInfo, Handler};
use crate::middleware::retry::AttemptTrace;
use crate::middleware::writer::{write_all, write_status, ResponseWriter};

pub type HttpClient = Client<HttpConnector, Body>;

pub fn http_client() -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// hop-by-hop 헤더 (RFC 7230 6.1)
const HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn upgrade_type(headers: &HeaderMap) -> Option<HeaderValue> {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if connection_upgrade {
        headers.get(header::UPGRADE).cloned()
    } else {
        None
    }
}

/// hop-by-hop 헤더와 Connection 헤더에 나열된 헤더를 제거합니다.
pub fn remove_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_HEADERS {
        headers.remove(*name);
    }
}

/// X-Forwarded-* 헤더를 채웁니다.
pub fn set_forwarded_headers<B>(req: &mut Request<B>) {
    let info = ConnectionInfo::from_request(req);
    let host = req.headers().get(header::HOST).cloned();
    let headers = req.headers_mut();

    if let Some(info) = info {
        let ip = info.remote_addr.ip().to_string();
        let forwarded_for = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{}, {}", prior, ip),
            None => ip.clone(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert("x-forwarded-for", value);
        }
        if !headers.contains_key("x-real-ip") {
            if let Ok(value) = HeaderValue::from_str(&ip) {
                headers.insert("x-real-ip", value);
            }
        }
        if !headers.contains_key("x-forwarded-proto") {
            headers.insert("x-forwarded-proto", HeaderValue::from_static(info.scheme()));
        }
    }
    if let (false, Some(host)) = (headers.contains_key("x-forwarded-host"), host) {
        headers.insert("x-forwarded-host", host);
    }
}

/// 서비스 URL로 요청을 전달하는 핸들러
pub struct ProxyHandler {
    target: Uri,
    client: HttpClient,
}

impl ProxyHandler {
    pub fn new(target: Uri, client: HttpClient) -> BoxHandler {
        Arc::new(Self { target, client })
    }

    /// 서비스 URL의 경로 뒤에 요청 경로를 붙입니다.
    fn outgoing_uri(&self, uri: &Uri) -> Result<Uri, hyper::http::Error> {
        let base = self.target.path().trim_end_matches('/');
        let path = uri.path();
        let mut path_and_query = format!("{}{}", base, path);
        if path_and_query.is_empty() {
            path_and_query.push('/');
        }
        if let Some(query) = uri.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        let mut builder = Uri::builder().path_and_query(path_and_query);
        if let Some(scheme) = self.target.scheme() {
            builder = builder.scheme(scheme.clone());
        }
        if let Some(authority) = self.target.authority() {
            builder = builder.authority(authority.clone());
        }
        builder.build()
    }
}

#[async_trait]
impl Handler for ProxyHandler {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let trace = AttemptTrace::from_request(&req);
        let upgrade = upgrade_type(req.headers());

        let uri = match self.outgoing_uri(req.uri()) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(target_url = %self.target, error = %e, "백엔드 URI 생성 실패");
                write_status(w, StatusCode::BAD_GATEWAY).await;
                return;
            }
        };
        *req.uri_mut() = uri;
        set_forwarded_headers(&mut req);
        remove_hop_headers(req.headers_mut());
        if let Some(protocol) = &upgrade {
            let headers = req.headers_mut();
            headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
            headers.insert(header::UPGRADE, protocol.clone());
        }

        let response = self.client.request(req).await;
        let mut response = match response {
            Ok(response) => {
                if let Some(trace) = &trace {
                    trace.request_written();
                }
                response
            }
            Err(e) => {
                // 연결 단계 실패가 아니면 요청이 이미 나갔을 수 있음
                if !e.is_connect() {
                    if let Some(trace) = &trace {
                        trace.request_written();
                    }
                }
                warn!(target_url = %self.target, error = %e, "백엔드 요청 실패");
                write_status(w, StatusCode::BAD_GATEWAY).await;
                return;
            }
        };

        let status = response.status();
        if status == StatusCode::SWITCHING_PROTOCOLS {
            self.switch_protocols(w, &mut response).await;
            return;
        }

        let streaming = response
            .headers()
            .get(header::CONTENT_TYPE)
            .is_some_and(|ct| ct.as_bytes().starts_with(b"text/event-stream"));
        {
            let headers = response.headers_mut();
            remove_hop_headers(headers);
            let target = w.headers_mut();
            for (name, value) in headers.iter() {
                target.append(name.clone(), value.clone());
            }
        }
        w.write_header(status);

        let mut body = response.into_body();
        while let Some(frame) = body.frame().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "백엔드 응답 본문 읽기 실패");
                    return;
                }
            };
            let Ok(data) = frame.into_data() else {
                continue;
            };
            if let Err(e) = write_all(w, &data).await {
                debug!(error = %e, "클라이언트로 응답 본문 전송 실패");
                return;
            }
            if streaming && w.capabilities().can_flush() {
                let _ = w.flush().await;
            }
        }
    }
}

impl ProxyHandler {
    /// 101 응답이면 클라이언트와 백엔드 연결을 그대로 잇습니다.
    async fn switch_protocols(
        &self,
        w: &mut dyn ResponseWriter,
        response: &mut hyper::Response<hyper::body::Incoming>,
    ) {
        let client_upgrade = match w.hijack() {
            Ok(upgrade) => upgrade,
            Err(e) => {
                warn!(error = %e, "업그레이드를 지원하지 않는 응답 경로");
                write_status(w, StatusCode::BAD_GATEWAY).await;
                return;
            }
        };
        let backend_upgrade = hyper::upgrade::on(&mut *response);

        for (name, value) in response.headers() {
            w.headers_mut().append(name.clone(), value.clone());
        }
        w.write_header(StatusCode::SWITCHING_PROTOCOLS);

        tokio::spawn(async move {
            let (client, backend) = match tokio::try_join!(client_upgrade, backend_upgrade) {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(error = %e, "연결 업그레이드 실패");
                    return;
                }
            };
            let mut client = TokioIo::new(client);
            let mut backend = TokioIo::new(backend);
            match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
                Ok((sent, received)) => debug!(sent, received, "업그레이드 연결 종료"),
                Err(e) => debug!(error = %e, "업그레이드 연결 오류"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_uri_joins_paths() {
        let handler = ProxyHandler {
            target: "http://backend:8080/api/".parse().unwrap(),
            client: http_client(),
        };
        let uri = handler.outgoing_uri(&"/users?id=1".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://backend:8080/api/users?id=1");

        let root = ProxyHandler {
            target: "http://backend:8080".parse().unwrap(),
            client: http_client(),
        };
        let uri = root.outgoing_uri(&"/".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://backend:8080/");
    }

    #[test]
    fn test_remove_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("x-public", HeaderValue::from_static("1"));

        remove_hop_headers(&mut headers);

        assert!(headers.get("x-private").is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(headers["x-public"], "1");
    }

    #[test]
    fn test_forwarded_headers() {
        let mut req = Request::builder()
            .header(header::HOST, "example.com")
            .header("x-forwarded-for", "1.1.1.1")
            .body(())
            .unwrap();
        req.extensions_mut().insert(ConnectionInfo {
            remote_addr: "10.0.0.1:4000".parse().unwrap(),
            tls: true,
        });

        set_forwarded_headers(&mut req);

        let headers = req.headers();
        assert_eq!(headers["x-forwarded-for"], "1.1.1.1, 10.0.0.1");
        assert_eq!(headers["x-forwarded-proto"], "https");
        assert_eq!(headers["x-forwarded-host"], "example.com");
        assert_eq!(headers["x-real-ip"], "10.0.0.1");
    }

    #[test]
    fn test_upgrade_type() {
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        assert!(upgrade_type(&headers).is_none());
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        assert_eq!(upgrade_type(&headers).unwrap(), "websocket");
    }
}
