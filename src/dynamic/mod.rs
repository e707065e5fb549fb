//! 동적 구성: 공급자가 보내는 라우터/서비스/미들웨어 정의

pub mod aggregator;
pub mod file;
pub mod middleware;
pub mod provider;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use aggregator::merge;
pub use file::FileProvider;
pub use middleware::*;

/// 한 공급자의 전체 구성
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[serde(default)]
    pub http: HttpConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpConfiguration {
    #[serde(default)]
    pub routers: HashMap<String, RouterConfig>,
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
    #[serde(default)]
    pub middlewares: HashMap<String, Middleware>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RouterConfig {
    /// 비어 있으면 기본 엔트리포인트에 연결됩니다.
    #[serde(default)]
    pub entry_points: Vec<String>,
    pub host: Option<String>,
    /// 정확히 일치(`/api`), 접두사(`/api*`), 정규식(`^/api/v[0-9]+`)
    pub path: Option<String>,
    pub service: String,
    #[serde(default)]
    pub middlewares: Vec<String>,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceConfig {
    /// 백엔드 주소. 없으면 모든 요청에 503으로 응답합니다.
    pub url: Option<String>,
}

/// 한 종류로 변환된 미들웨어 구성 (변환 실패도 그대로 보관)
pub type MiddlewareTable = HashMap<String, Result<MiddlewareConfig, KindError>>;

/// 모든 공급자를 합친, 한정된 이름 기준의 런타임 구성
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfiguration {
    pub routers: HashMap<String, RouterConfig>,
    pub services: HashMap<String, ServiceConfig>,
    pub middlewares: MiddlewareTable,
}

/// 공급자가 보내는 구성 갱신
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigMessage {
    pub provider_name: String,
    pub configuration: Configuration,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("구성 파일 읽기 실패: {0}")]
    Io(#[from] std::io::Error),

    #[error("구성 파일 파싱 실패: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("파일 감시 실패: {0}")]
    Watch(#[from] notify::Error),

    #[error("구성 채널이 닫혔습니다")]
    ChannelClosed,
}

/// 동적 구성 공급자
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// 초기 구성을 보내고, 필요하면 이후 변경 사항을 계속 보냅니다.
    async fn provide(&self, tx: mpsc::Sender<ConfigMessage>) -> Result<(), ProviderError>;
}
