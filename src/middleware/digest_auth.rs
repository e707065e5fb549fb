//! Digest 인증 미들웨어 (RFC 2617, MD5)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::{Request, StatusCode};
use md5::{Digest, Md5};
use tracing::debug;
use uuid::Uuid;

use super::basic_auth::read_users;
use super::error::BuildError;
use super::handler::{Body, BoxHandler, Handler};
use super::writer::{write_error, ResponseWriter};
use crate::dynamic::DigestAuthConfig;

/// nonce 유효 시간
const NONCE_LIFETIME: Duration = Duration::from_secs(300);

pub struct DigestAuth {
    next: BoxHandler,
    /// (사용자, realm) -> HA1
    users: HashMap<(String, String), String>,
    realm: String,
    secret: String,
    opaque: String,
    remove_header: bool,
    header_field: Option<HeaderName>,
    name: String,
}

pub fn new(next: BoxHandler, config: &DigestAuthConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "digestAuth", "미들웨어 생성");

    let entries = read_users(&config.users, config.users_file.as_deref())
        .map_err(|e| BuildError::invalid(name, e.to_string()))?;

    let mut users = HashMap::new();
    for entry in entries {
        let mut fields = entry.splitn(3, ':');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(user), Some(realm), Some(ha1)) if !ha1.is_empty() => {
                users.insert((user.to_string(), realm.to_string()), ha1.to_lowercase());
            }
            _ => {
                return Err(BuildError::invalid(
                    name,
                    format!("invalid digest user entry {:?}, expected user:realm:hash", entry),
                ))
            }
        }
    }

    let header_field = config
        .header_field
        .as_deref()
        .map(|field| HeaderName::from_bytes(field.as_bytes()))
        .transpose()
        .map_err(|e| BuildError::invalid(name, e.to_string()))?;

    Ok(Arc::new(DigestAuth {
        next,
        users,
        realm: config.realm.clone(),
        secret: Uuid::new_v4().simple().to_string(),
        opaque: Uuid::new_v4().simple().to_string(),
        remove_header: config.remove_header,
        header_field,
        name: name.to_string(),
    }))
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// `Digest a="b", c=d` 형태의 인증 파라미터를 파싱합니다.
fn parse_params(value: &str) -> Option<HashMap<String, String>> {
    let rest = value.strip_prefix("Digest ")?;
    let mut params = HashMap::new();
    let mut chars = rest.trim().chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }

        let value = if chars.peek() == Some(&'"') {
            chars.next();
            let mut value = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    c => value.push(c),
                }
            }
            value
        } else {
            chars.by_ref().take_while(|c| *c != ',').collect::<String>().trim().to_string()
        };
        params.insert(key.trim().to_lowercase(), value);
    }

    Some(params)
}

enum Verdict {
    Authorized(String),
    Stale,
    Denied,
}

impl DigestAuth {
    fn nonce_at(&self, timestamp: u64) -> String {
        format!("{:x}-{}", timestamp, md5_hex(&format!("{}:{}", timestamp, self.secret)))
    }

    /// nonce가 이 미들웨어에서 발급된 것이면 발급 시각을 반환합니다.
    fn nonce_timestamp(&self, nonce: &str) -> Option<u64> {
        let (ts, _) = nonce.split_once('-')?;
        let timestamp = u64::from_str_radix(ts, 16).ok()?;
        (self.nonce_at(timestamp) == nonce).then_some(timestamp)
    }

    fn challenge(&self, stale: bool) -> Option<HeaderValue> {
        let mut value = format!(
            "Digest realm=\"{}\", nonce=\"{}\", opaque=\"{}\", algorithm=MD5, qop=\"auth\"",
            self.realm,
            self.nonce_at(unix_seconds()),
            self.opaque
        );
        if stale {
            value.push_str(", stale=true");
        }
        HeaderValue::from_str(&value).ok()
    }

    fn verify(&self, req: &Request<Body>) -> Verdict {
        let Some(params) = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_params)
        else {
            return Verdict::Denied;
        };
        let get = |key: &str| params.get(key).map(String::as_str).unwrap_or("");

        let (username, realm, nonce, uri) = (get("username"), get("realm"), get("nonce"), get("uri"));
        if realm != self.realm || get("opaque") != self.opaque {
            return Verdict::Denied;
        }
        let request_uri = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        if uri != request_uri {
            return Verdict::Denied;
        }
        let Some(ha1) = self.users.get(&(username.to_string(), realm.to_string())) else {
            return Verdict::Denied;
        };

        let ha2 = md5_hex(&format!("{}:{}", req.method(), uri));
        let expected = match get("qop") {
            "" => md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2)),
            "auth" => md5_hex(&format!(
                "{}:{}:{}:{}:auth:{}",
                ha1,
                nonce,
                get("nc"),
                get("cnonce"),
                ha2
            )),
            _ => return Verdict::Denied,
        };
        if expected != get("response").to_lowercase() {
            return Verdict::Denied;
        }

        match self.nonce_timestamp(nonce) {
            Some(issued) if unix_seconds().saturating_sub(issued) <= NONCE_LIFETIME.as_secs() => {
                Verdict::Authorized(username.to_string())
            }
            Some(_) => Verdict::Stale,
            None => Verdict::Denied,
        }
    }
}

#[async_trait]
impl Handler for DigestAuth {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let user = match self.verify(&req) {
            Verdict::Authorized(user) => user,
            verdict => {
                let stale = matches!(verdict, Verdict::Stale);
                debug!(middleware = %self.name, stale, "Digest 인증 실패");
                if let Some(challenge) = self.challenge(stale) {
                    w.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
                }
                write_error(w, StatusCode::UNAUTHORIZED, "401 Unauthorized").await;
                return;
            }
        };

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
