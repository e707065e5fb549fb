use std::sync::Arc;

use async_trait::async_trait;
use hyper::Request;
use tracing::Instrument;

use super::handler::{Body, BoxHandler, Handler};
use super::writer::ResponseWriter;

/// 미들웨어 실행을 `middleware` span으로 감쌉니다.
pub struct Traced {
    next: BoxHandler,
    name: String,
    kind: &'static str,
}

pub fn wrap(next: BoxHandler, name: &str, kind: &'static str) -> BoxHandler {
    Arc::new(Traced {
        next,
        name: name.to_string(),
        kind,
    })
}

#[async_trait]
impl Handler for Traced {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let span = tracing::debug_span!("middleware", name = %self.name, kind = self.kind);
        self.next.serve(w, req).instrument(span).await;
    }
}
