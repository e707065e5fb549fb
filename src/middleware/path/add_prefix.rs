use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, StatusCode};
use tracing::{debug, warn};

use super::{ensure_leading_slash, set_path};
use crate::dynamic::AddPrefixConfig;
use crate::middleware::error::BuildError;
use crate::middleware::handler::{Body, BoxHandler, Handler};
use crate::middleware::writer::{write_status, ResponseWriter};

/// 요청 경로 앞에 접두사를 붙입니다.
pub struct AddPrefix {
    next: BoxHandler,
    prefix: String,
    name: String,
}

pub fn new(next: BoxHandler, config: &AddPrefixConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "addPrefix", "미들웨어 생성");

    if config.prefix.is_empty() {
        return Err(BuildError::invalid(name, "prefix cannot be empty"));
    }

    Ok(Arc::new(AddPrefix {
        next,
        prefix: config.prefix.clone(),
        name: name.to_string(),
    }))
}

#[async_trait]
impl Handler for AddPrefix {
    async fn serve(&self, w: &mut dyn ResponseWriter, mut req: Request<Body>) {
        let path = ensure_leading_slash(&format!("{}{}", self.prefix, req.uri().path()));

        if let Err(e) = set_path(&mut req, &path) {
            warn!(middleware = %self.name, error = %e, "경로 변경 실패");
            write_status(w, StatusCode::BAD_REQUEST).await;
            return;
        }
        self.next.serve(w, req).await;
    }
}
