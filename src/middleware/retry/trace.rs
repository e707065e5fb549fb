use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hyper::Request;

/// 요청이 백엔드에 도달했음을 알리는 훅
///
/// 재시도 미들웨어가 시도마다 요청 extension에 붙이고, 백엔드 디스패처가
/// 요청을 보낸 시점에 `request_written`을 호출합니다. 재시도가 중첩되면
/// 바깥 시도의 훅도 함께 유지됩니다.
#[derive(Debug, Clone, Default)]
pub struct AttemptTrace {
    hooks: Vec<Arc<AtomicBool>>,
}

impl AttemptTrace {
    pub fn attach<B>(req: &mut Request<B>, reached: Arc<AtomicBool>) {
        let mut trace = Self::from_request(req).unwrap_or_default();
        trace.hooks.push(reached);
        req.extensions_mut().insert(trace);
    }

    pub fn from_request<B>(req: &Request<B>) -> Option<AttemptTrace> {
        req.extensions().get::<AttemptTrace>().cloned()
    }

    pub fn request_written(&self) {
        for hook in &self.hooks {
            hook.store(true, Ordering::Release);
        }
    }
}
