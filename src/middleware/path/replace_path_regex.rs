use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, StatusCode};
use regex_lite::Regex;
use tracing::{debug, warn};

use super::{compile, ensure_leading_slash, header_value, set_path, REPLACED_PATH_HEADER};
use crate::dynamic::ReplacePathRegexConfig;
use crate::middleware::error::BuildError;
use crate::middleware::handler::{Body, BoxHandler, Handler};
use crate::middleware::writer::{write_status, ResponseWriter};

/// 정규식과 일치하는 경로를 치환 문자열(`$1` 참조 가능)로 바꿉니다.
pub struct ReplacePathRegex {
    next: BoxHandler,
    regex: Regex,
    replacement: String,
    name: String,
}

pub fn new(
    next: BoxHandler,
    config: &ReplacePathRegexConfig,
    name: &str,
) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "replacePathRegex", "미들웨어 생성");

    Ok(Arc::new(ReplacePathRegex {
        next,
        regex: compile(name, &config.regex)?,
        replacement: config.replacement.trim().to_string(),
        name: name.to_string(),
    }))
}

#[async_trait]
impl Handler for ReplacePathRegex {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let original = req.uri().path().to_string();

        if self.regex.is_match(&original) {
            let replaced = self.regex.replace_all(&original, self.replacement.as_str());
            let replaced = ensure_leading_slash(&replaced);

            if let Err(e) = set_path(&mut req, &replaced) {
                warn!(middleware = %self.name, error = %e, "경로 변경 실패");
                write_status(w, StatusCode::BAD_REQUEST).await;
                return;
            }
            if let Ok(value) = header_value(&self.name, &original) {
                req.headers_mut().insert(REPLACED_PATH_HEADER, value);
            }
        }

        self.next.serve(w, req).await;
    }
}
