use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, StatusCode};
use tracing::{debug, warn};

use super::{ensure_leading_slash, header_value, set_path, FORWARDED_PREFIX_HEADER};
use crate::dynamic::StripPrefixConfig;
use crate::middleware::error::BuildError;
use crate::middleware::handler::{Body, BoxHandler, Handler};
use crate::middleware::writer::{write_status, ResponseWriter};

/// 처음으로 일치하는 접두사를 경로에서 제거합니다.
///
/// 제거한 접두사는 `X-Forwarded-Prefix` 헤더로 전달됩니다.
pub struct StripPrefix {
    next: BoxHandler,
    prefixes: Vec<String>,
    name: String,
}

pub fn new(next: BoxHandler, config: &StripPrefixConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "stripPrefix", "미들웨어 생성");

    for prefix in &config.prefixes {
        header_value(name, prefix)?;
    }

    Ok(Arc::new(StripPrefix {
        next,
        prefixes: config.prefixes.clone(),
        name: name.to_string(),
    }))
}

#[async_trait]
impl Handler for StripPrefix {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let path = req.uri().path().to_string();

        if let Some(prefix) = self.prefixes.iter().find(|p| path.starts_with(p.as_str())) {
            let stripped = ensure_leading_slash(&path[prefix.len()..]);
            if let Err(e) = set_path(&mut req, &stripped) {
                warn!(middleware = %self.name, error = %e, "경로 변경 실패");
                write_status(w, StatusCode::BAD_REQUEST).await;
                return;
            }
            if let Ok(value) = header_value(&self.name, prefix) {
                req.headers_mut().insert(FORWARDED_PREFIX_HEADER, value);
            }
        }

        self.next.serve(w, req).await;
    }
}
