//! 이름 목록을 실행 가능한 미들웨어 체인으로 바꾸는 빌더

use std::sync::Arc;

use tracing::debug;

use super::chain::Chain;
use super::context::ConstructorContext;
use super::error::BuildError;
use super::handler::BoxHandler;
use super::retry::RetryListener;
use super::{
    basic_auth, buffering, circuit_breaker, compress, digest_auth, error_pages, forward_auth,
    headers, ip_allow_list, max_connections, pass_tls_client_cert, path, rate_limit, redirect,
    retry, traced,
};
use crate::dynamic::{KindError, MiddlewareConfig, MiddlewareTable};

/// 서비스 이름으로 백엔드 핸들러를 만드는 인터페이스
pub trait ServiceBuilder: Send + Sync {
    /// `name`은 공급자까지 한정된 서비스 이름입니다.
    fn build_http(&self, name: &str) -> Result<BoxHandler, BuildError>;
}

#[derive(Clone)]
pub struct Builder {
    middlewares: Arc<MiddlewareTable>,
    services: Arc<dyn ServiceBuilder>,
    retry_listener: Arc<dyn RetryListener>,
}

impl Builder {
    pub fn new(
        middlewares: Arc<MiddlewareTable>,
        services: Arc<dyn ServiceBuilder>,
        retry_listener: Arc<dyn RetryListener>,
    ) -> Self {
        Self {
            middlewares,
            services,
            retry_listener,
        }
    }

    /// 이름 목록으로 체인을 만듭니다.
    ///
    /// 이름은 문맥의 공급자로 한정되고, 실제 생성은 `Chain::then` 시점에
    /// 목록 순서대로 일어납니다.
    pub fn build_chain(&self, ctx: &ConstructorContext, names: &[String]) -> Chain {
        let mut chain = Chain::new();

        for name in names {
            let qualified = ctx.qualified_name(name);
            let element_ctx = ctx.enter(&qualified);
            let builder = self.clone();

            chain.push(Box::new(move |next| {
                builder.build_middleware(&element_ctx, &qualified, next)
            }));
        }

        chain
    }

    fn build_middleware(
        &self,
        ctx: &ConstructorContext,
        name: &str,
        next: BoxHandler,
    ) -> Result<BoxHandler, BuildError> {
        let entry = self.middlewares.get(name).ok_or_else(|| BuildError::NotFound {
            name: name.to_string(),
        })?;
        let ctx = ctx.check_recursion(name)?;

        let config = match entry {
            Ok(config) => config,
            Err(KindError::Empty) => {
                return Err(BuildError::EmptyType {
                    name: name.to_string(),
                })
            }
            Err(KindError::MultiType(kinds)) => {
                return Err(BuildError::MultiType {
                    name: name.to_string(),
                    kinds: kinds.join(", "),
                })
            }
        };

        let handler = self.construct(&ctx, name, config, next)?;
        Ok(traced::wrap(handler, name, config.kind_name()))
    }

    fn construct(
        &self,
        ctx: &ConstructorContext,
        name: &str,
        config: &MiddlewareConfig,
        next: BoxHandler,
    ) -> Result<BoxHandler, BuildError> {
        match config {
            MiddlewareConfig::AddPrefix(c) => path::add_prefix::new(next, c, name),
            MiddlewareConfig::BasicAuth(c) => basic_auth::new(next, c, name),
            MiddlewareConfig::Buffering(c) => buffering::new(next, c, name),
            MiddlewareConfig::Chain(c) => {
                debug!(middleware = %name, kind = "chain", "미들웨어 생성");
                self.build_chain(ctx, &c.middlewares).then(next)
            }
            MiddlewareConfig::CircuitBreaker(c) => circuit_breaker::new(next, c, name),
            MiddlewareConfig::Compress(c) => compress::new(next, c, name),
            MiddlewareConfig::ErrorPages(c) => {
                let service = ctx.qualified_name(&c.service);
                error_pages::new(next, c, &service, self.services.as_ref(), name)
            }
            MiddlewareConfig::DigestAuth(c) => digest_auth::new(next, c, name),
            MiddlewareConfig::ForwardAuth(c) => forward_auth::new(next, c, name),
            MiddlewareConfig::Headers(c) => headers::new(next, c, name),
            MiddlewareConfig::IpAllowList(c) => ip_allow_list::new(next, c, name),
            MiddlewareConfig::MaxConnections(c) => max_connections::new(next, c, name),
            MiddlewareConfig::PassTlsClientCert(c) => pass_tls_client_cert::new(next, c, name),
            MiddlewareConfig::RateLimit(c) => rate_limit::new(next, c, name),
            MiddlewareConfig::RedirectRegex(c) => redirect::new_regex(next, c, name),
            MiddlewareConfig::RedirectScheme(c) => redirect::new_scheme(next, c, name),
            MiddlewareConfig::ReplacePath(c) => path::replace_path::new(next, c, name),
            MiddlewareConfig::ReplacePathRegex(c) => path::replace_path_regex::new(next, c, name),
            MiddlewareConfig::Retry(c) => retry::new(next, c, self.retry_listener.clone(), name),
            MiddlewareConfig::StripPrefix(c) => path::strip_prefix::new(next, c, name),
            MiddlewareConfig::StripPrefixRegex(c) => path::strip_prefix_regex::new(next, c, name),
        }
    }
}
