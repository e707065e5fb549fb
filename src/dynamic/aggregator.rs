use std::collections::BTreeMap;

use tracing::warn;

use super::provider::make_qualified_name;
use super::{Configuration, MiddlewareConfig, RuntimeConfiguration};

/// 공급자별 구성을 하나의 런타임 구성으로 합칩니다.
///
/// 모든 키는 `name@provider`로 한정되고, 엔트리포인트가 지정되지 않은
/// 라우터는 `default_entry_points`에 연결됩니다. 미들웨어 종류 변환 실패는
/// 버리지 않고 보관해서 해당 미들웨어를 참조하는 라우터만 실패하게 합니다.
pub fn merge(
    configurations: &BTreeMap<String, Configuration>,
    default_entry_points: &[String],
) -> RuntimeConfiguration {
    let mut runtime = RuntimeConfiguration::default();

    for (provider, configuration) in configurations {
        let http = &configuration.http;

        for (name, router) in &http.routers {
            let mut router = router.clone();
            if router.entry_points.is_empty() {
                router.entry_points = default_entry_points.to_vec();
            }
            runtime
                .routers
                .insert(make_qualified_name(provider, name), router);
        }

        for (name, service) in &http.services {
            runtime
                .services
                .insert(make_qualified_name(provider, name), service.clone());
        }

        for (name, middleware) in &http.middlewares {
            let qualified = make_qualified_name(provider, name);
            let config = MiddlewareConfig::try_from(middleware.clone());
            if let Err(e) = &config {
                warn!(middleware = %qualified, error = %e, "미들웨어 구성 변환 실패");
            }
            runtime.middlewares.insert(qualified, config);
        }
    }

    runtime
}
