use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, StatusCode};
use regex_lite::Regex;
use tracing::{debug, warn};

use super::{compile, ensure_leading_slash, header_value, set_path, FORWARDED_PREFIX_HEADER};
use crate::dynamic::StripPrefixRegexConfig;
use crate::middleware::error::BuildError;
use crate::middleware::handler::{Body, BoxHandler, Handler};
use crate::middleware::writer::{write_status, ResponseWriter};

pub struct StripPrefixRegex {
    next: BoxHandler,
    expressions: Vec<Regex>,
    name: String,
}

pub fn new(
    next: BoxHandler,
    config: &StripPrefixRegexConfig,
    name: &str,
) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "stripPrefixRegex", "미들웨어 생성");

    let expressions = config
        .regex
        .iter()
        .map(|pattern| compile(name, pattern))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Arc::new(StripPrefixRegex {
        next,
        expressions,
        name: name.to_string(),
    }))
}

#[async_trait]
impl Handler for StripPrefixRegex {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let path = req.uri().path().to_string();

        for expression in &self.expressions {
            // 경로 맨 앞에서 시작하는 일치만 접두사로 봅니다
            let Some(found) = expression.find(&path).filter(|m| m.start() == 0 && m.end() > 0) else {
                continue;
            };
            let prefix = found.as_str();

            let stripped = ensure_leading_slash(&path[prefix.len()..]);
            if let Err(e) = set_path(&mut req, &stripped) {
                warn!(middleware = %self.name, error = %e, "경로 변경 실패");
                write_status(w, StatusCode::BAD_REQUEST).await;
                return;
            }
            if let Ok(value) = header_value(&self.name, prefix) {
                req.headers_mut().insert(FORWARDED_PREFIX_HEADER, value);
            }
            break;
        }

        self.next.serve(w, req).await;
    }
}
