//! Basic 인증 미들웨어

mod auth;

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::{Request, StatusCode};
use tracing::debug;

pub use auth::{AuthError, Authenticator, UserStore};
pub(crate) use auth::read_users;

use super::error::BuildError;
use super::handler::{Body, BoxHandler, Handler};
use super::writer::{write_error, ResponseWriter};
use crate::dynamic::BasicAuthConfig;

pub struct BasicAuth {
    next: BoxHandler,
    authenticator: Arc<dyn Authenticator>,
    challenge: HeaderValue,
    remove_header: bool,
    header_field: Option<HeaderName>,
    name: String,
}

pub fn new(next: BoxHandler, config: &BasicAuthConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "basicAuth", "미들웨어 생성");

    let invalid = |e: AuthError| BuildError::invalid(name, e.to_string());
    let entries = read_users(&config.users, config.users_file.as_deref()).map_err(invalid)?;
    let store = UserStore::from_entries(&entries).map_err(invalid)?;

    let challenge = HeaderValue::from_str(&format!("Basic realm=\"{}\"", config.realm))
        .map_err(|e| BuildError::invalid(name, e.to_string()))?;
    let header_field = config
        .header_field
        .as_deref()
        .map(|field| HeaderName::from_bytes(field.as_bytes()))
        .transpose()
        .map_err(|e| BuildError::invalid(name, e.to_string()))?;

    Ok(Arc::new(BasicAuth {
        next,
        authenticator: Arc::new(store),
        challenge,
        remove_header: config.remove_header,
        header_field,
        name: name.to_string(),
    }))
}

/// Authorization 헤더에서 자격증명을 추출합니다.
fn extract_credentials<B>(req: &Request<B>) -> Option<(String, String)> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Basic "))
        .and_then(|credentials| BASE64.decode(credentials.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .and_then(|pair| {
            let (username, password) = pair.split_once(':')?;
            Some((username.to_string(), password.to_string()))
        })
}

#[async_trait]
impl Handler for BasicAuth {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let user = extract_credentials(&req).and_then(|(username, password)| {
            self.authenticator
                .verify_credentials(&username, &password)
                .then_some(username)
        });

        let Some(user) = user else {
            debug!(middleware = %self.name, "인증 실패");
            w.headers_mut()
                .insert(header::WWW_AUTHENTICATE, self.challenge.clone());
            write_error(w, StatusCode::UNAUTHORIZED, "401 Unauthorized").await;
            return;
        };

        debug!(middleware = %self.name, user = %user, "인증 성공");
        if let Some(field) = &self.header_field {
            if let Ok(value) = HeaderValue::from_str(&user) {
                req.headers_mut().insert(field.clone(), value);
            }
        }
        if self.remove_header {
            req.headers_mut().remove(header::AUTHORIZATION);
        }

        self.next.serve(w, req).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler::empty_body;
    use crate::middleware::writer::ResponseRecorder;
    use std::sync::Mutex;

    struct Backend {
        seen: Arc<Mutex<Vec<hyper::HeaderMap>>>,
    }

    #[async_trait]
    impl Handler for Backend {
        async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
            self.seen.lock().unwrap().push(req.headers().clone());
            w.write_header(StatusCode::NO_CONTENT);
        }
    }

    fn middleware(remove_header: bool) -> (BoxHandler, Arc<Mutex<Vec<hyper::HeaderMap>>>) {
        let hash = bcrypt::hash("secret", 4).unwrap();
        let config = BasicAuthConfig {
            users: vec![format!("admin:{}", hash)],
            realm: "Test Realm".to_string(),
            remove_header,
            header_field: Some("x-webauth-user".to_string()),
            ..Default::default()
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = new(Arc::new(Backend { seen: seen.clone() }), &config, "auth@file").unwrap();
        (handler, seen)
    }

    fn request(credentials: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(credentials) = credentials {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Basic {}", BASE64.encode(credentials)),
            );
        }
        builder.body(empty_body()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let (handler, seen) = middleware(false);
        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, request(None)).await;

        assert_eq!(rec.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            rec.sent_headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"Test Realm\""
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let (handler, seen) = middleware(false);
        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, request(Some("admin:wrong"))).await;

        assert_eq!(rec.status(), StatusCode::UNAUTHORIZED);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let (handler, seen) = middleware(true);
        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, request(Some("admin:secret"))).await;

        assert_eq!(rec.status(), StatusCode::NO_CONTENT);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["x-webauth-user"], "admin");
        assert!(seen[0].get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_no_users_is_build_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let result = new(Arc::new(Backend { seen }), &BasicAuthConfig::default(), "auth@file");
        assert!(matches!(result, Err(BuildError::InvalidConfig { .. })));
    }
}
