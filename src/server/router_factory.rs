use std::sync::Arc;

use tracing::{debug, error};

use super::services::ServiceManager;
use crate::dynamic::{RouterConfig, RuntimeConfiguration};
use crate::middleware::builder::{Builder, ServiceBuilder};
use crate::middleware::context::ConstructorContext;
use crate::middleware::error::BuildError;
use crate::middleware::handler::BoxHandler;
use crate::middleware::retry::RetryListener;
use crate::proxy::HttpClient;
use crate::routing::{Route, RouterHandler, Rule, RoutingError};

#[derive(Debug, thiserror::Error)]
enum RouterError {
    #[error(transparent)]
    Rule(#[from] RoutingError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// 런타임 구성으로 엔트리포인트별 라우터를 만듭니다.
pub struct RouterFactory {
    runtime: RuntimeConfiguration,
    services: Arc<ServiceManager>,
    builder: Builder,
}

impl RouterFactory {
    pub fn new(
        runtime: RuntimeConfiguration,
        client: HttpClient,
        retry_listener: Arc<dyn RetryListener>,
    ) -> Self {
        let services = Arc::new(ServiceManager::new(runtime.services.clone(), client));
        let builder = Builder::new(
            Arc::new(runtime.middlewares.clone()),
            services.clone(),
            retry_listener,
        );
        Self {
            runtime,
            services,
            builder,
        }
    }

    /// `entry_point`에 연결된 라우터를 모두 만듭니다.
    ///
    /// 만들지 못한 라우터는 로그를 남기고 제외합니다. 다른 라우터에는 영향이
    /// 없습니다.
    pub fn build(&self, entry_point: &str) -> RouterHandler {
        let mut routes = Vec::new();

        for (name, router) in &self.runtime.routers {
            if !router.entry_points.iter().any(|ep| ep == entry_point) {
                continue;
            }

            match self.build_route(name, router) {
                Ok(route) => routes.push(route),
                Err(e) => error!(router = %name, error = %e, "라우터 생성 실패"),
            }
        }

        debug!(entry_point = %entry_point, routes = routes.len(), "라우터 생성 완료");
        RouterHandler::new(routes)
    }

    fn build_route(&self, name: &str, router: &RouterConfig) -> Result<Route, RouterError> {
        let rule = Rule::new(router.host.as_deref(), router.path.as_deref())?;
        let handler = self.build_handler(name, router)?;

        Ok(Route {
            name: name.to_string(),
            rule,
            priority: router.priority,
            handler,
        })
    }

    fn build_handler(&self, name: &str, router: &RouterConfig) -> Result<BoxHandler, BuildError> {
        let ctx = ConstructorContext::for_element(name);
        let service = self.services.build_http(&ctx.qualified_name(&router.service))?;
        self.builder
            .build_chain(&ctx, &router.middlewares)
            .then(service)
    }
}
