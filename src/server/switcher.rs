use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use hyper::Request;
use tracing::info;

use crate::middleware::handler::{Body, Handler};
use crate::middleware::writer::ResponseWriter;
use crate::routing::RouterHandler;

/// 현재 라우터를 가리키는 교체 가능한 핸들러
///
/// 요청은 디스패치 시점의 라우터 스냅샷으로 끝까지 처리됩니다. 교체는
/// 통째로 이루어지므로 요청이 반쯤 만들어진 라우터를 보는 일은 없습니다.
pub struct RouterSwitcher {
    current: ArcSwap<RouterHandler>,
}

impl RouterSwitcher {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RouterHandler::default()),
        }
    }

    pub fn update(&self, router: RouterHandler) {
        info!(routes = router.len(), "라우터 교체");
        self.current.store(Arc::new(router));
    }

    pub fn current(&self) -> Arc<RouterHandler> {
        self.current.load_full()
    }
}

impl Default for RouterSwitcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for RouterSwitcher {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let router = self.current.load_full();
        router.serve(w, req).await;
    }
}
