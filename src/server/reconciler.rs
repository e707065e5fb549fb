use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::router_factory::RouterFactory;
use super::switcher::RouterSwitcher;
use crate::dynamic::{merge, ConfigMessage, Configuration};
use crate::middleware::retry::RetryListener;
use crate::proxy::HttpClient;

/// 공급자 구성 갱신을 받아 라우터를 다시 만들고 교체합니다.
pub struct Reconciler {
    entry_point: String,
    configurations: BTreeMap<String, Configuration>,
    switcher: Arc<RouterSwitcher>,
    client: HttpClient,
    retry_listener: Arc<dyn RetryListener>,
}

impl Reconciler {
    pub fn new(
        entry_point: &str,
        switcher: Arc<RouterSwitcher>,
        client: HttpClient,
        retry_listener: Arc<dyn RetryListener>,
    ) -> Self {
        Self {
            entry_point: entry_point.to_string(),
            configurations: BTreeMap::new(),
            switcher,
            client,
            retry_listener,
        }
    }

    /// 공급자 구성을 기록합니다. 이전과 같으면 `false`를 반환합니다.
    fn record(&mut self, message: ConfigMessage) -> bool {
        if self.configurations.get(&message.provider_name) == Some(&message.configuration) {
            debug!(provider = %message.provider_name, "구성 변경 없음, 건너뜀");
            return false;
        }
        self.configurations
            .insert(message.provider_name, message.configuration);
        true
    }

    fn rebuild(&self) {
        let runtime = merge(&self.configurations, &[self.entry_point.clone()]);
        info!(
            routers = runtime.routers.len(),
            services = runtime.services.len(),
            middlewares = runtime.middlewares.len(),
            "동적 구성 적용"
        );

        let factory = RouterFactory::new(runtime, self.client.clone(), self.retry_listener.clone());
        self.switcher.update(factory.build(&self.entry_point));
    }

    /// 갱신 하나를 적용합니다. 라우터를 다시 만들었으면 `true`입니다.
    pub fn apply(&mut self, message: ConfigMessage) -> bool {
        if !self.record(message) {
            return false;
        }
        self.rebuild();
        true
    }

    /// 채널이 닫힐 때까지 갱신을 적용합니다. 한꺼번에 도착한 갱신은
    /// 라우터를 한 번만 다시 만듭니다.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ConfigMessage>) {
        while let Some(message) = rx.recv().await {
            let mut changed = self.record(message);
            while let Ok(pending) = rx.try_recv() {
                changed |= self.record(pending);
            }
            if changed {
                self.rebuild();
            }
        }
        debug!("구성 채널 종료");
    }
}
