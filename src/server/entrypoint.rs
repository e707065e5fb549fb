use std::sync::Arc;

use tracing::debug;

use super::observability::{AccessLog, Metrics, Tracing};
use super::switcher::RouterSwitcher;
use crate::middleware::capture::CaptureHandler;
use crate::middleware::handler::BoxHandler;
use crate::settings::ObservabilitySettings;

/// 엔트리포인트 핸들러를 조립합니다.
///
/// 바깥부터 capture, access log, tracing, metrics, 라우터 스위치 순서입니다.
/// capture는 관측 핸들러가 켜져 있지 않아도 항상 가장 바깥에 둡니다.
pub fn assemble(
    entry_point: &str,
    switcher: Arc<RouterSwitcher>,
    observability: &ObservabilitySettings,
) -> BoxHandler {
    let mut handler: BoxHandler = switcher;

    if observability.metrics {
        handler = Metrics::wrap(handler, entry_point);
    }
    if observability.tracing {
        handler = Tracing::wrap(handler, entry_point);
    }
    if observability.access_log {
        handler = AccessLog::wrap(handler);
    }

    debug!(
        entry_point = %entry_point,
        access_log = observability.access_log,
        tracing = observability.tracing,
        metrics = observability.metrics,
        "엔트리포인트 핸들러 조립"
    );
    CaptureHandler::wrap(handler)
}
