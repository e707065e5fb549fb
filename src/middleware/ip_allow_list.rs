use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, StatusCode};
use tracing::debug;

use super::error::BuildError;
use super::handler::{Body, BoxHandler, Handler};
use super::ip::{parse_host, IpChecker, IpStrategy};
use super::writer::{write_status, ResponseWriter};
use crate::dynamic::IpAllowListConfig;

/// 허용된 IP 범위에서 온 요청만 통과시킵니다.
pub struct IpAllowList {
    next: BoxHandler,
    checker: IpChecker,
    strategy: IpStrategy,
    name: String,
}

pub fn new(next: BoxHandler, config: &IpAllowListConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "ipAllowList", "미들웨어 생성");

    if config.source_range.is_empty() {
        return Err(BuildError::invalid(name, "sourceRange is empty, IPAllowLister not created"));
    }
    let checker =
        IpChecker::new(&config.source_range).map_err(|e| BuildError::invalid(name, e.to_string()))?;
    let strategy = IpStrategy::from_config(config.ip_strategy.as_ref())
        .map_err(|e| BuildError::invalid(name, e.to_string()))?;

    Ok(Arc::new(IpAllowList {
        next,
        checker,
        strategy,
        name: name.to_string(),
    }))
}

#[async_trait]
impl Handler for IpAllowList {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let client_ip = self.strategy.client_ip(&req);
        let allowed = parse_host(&client_ip).is_some_and(|ip| self.checker.contains(ip));

        if !allowed {
            debug!(middleware = %self.name, client_ip = %client_ip, "허용되지 않은 IP");
            write_status(w, StatusCode::FORBIDDEN).await;
            return;
        }
        self.next.serve(w, req).await;
    }
}
