use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, StatusCode};
use tracing::{debug, warn};

use super::{header_value, set_path, REPLACED_PATH_HEADER};
use crate::dynamic::ReplacePathConfig;
use crate::middleware::error::BuildError;
use crate::middleware::handler::{Body, BoxHandler, Handler};
use crate::middleware::writer::{write_status, ResponseWriter};

/// 경로를 고정 값으로 바꾸고 원래 경로를 `X-Replaced-Path`로 전달합니다.
pub struct ReplacePath {
    next: BoxHandler,
    path: String,
    name: String,
}

pub fn new(next: BoxHandler, config: &ReplacePathConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "replacePath", "미들웨어 생성");

    Ok(Arc::new(ReplacePath {
        next,
        path: config.path.clone(),
        name: name.to_string(),
    }))
}

#[async_trait]
impl Handler for ReplacePath {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let original = req.uri().path().to_string();

        if let Err(e) = set_path(&mut req, &self.path) {
            warn!(middleware = %self.name, error = %e, "경로 변경 실패");
            write_status(w, StatusCode::BAD_REQUEST).await;
            return;
        }
        if let Ok(value) = header_value(&self.name, &original) {
            req.headers_mut().insert(REPLACED_PATH_HEADER, value);
        }

        self.next.serve(w, req).await;
    }
}
