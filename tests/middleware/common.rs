use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, StatusCode};
use reverse_proxy_chain::dynamic::{merge, Configuration, RuntimeConfiguration};
use reverse_proxy_chain::middleware::handler::{empty_body, Body};
use reverse_proxy_chain::middleware::writer::write_all;
use reverse_proxy_chain::middleware::{
    BoxHandler, BuildError, Handler, ResponseRecorder, ResponseWriter, ServiceBuilder,
};

/// 요청 경로를 본문으로 돌려주는 백엔드
pub struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        write_all(w, req.uri().path().as_bytes()).await.unwrap();
    }
}

/// 항상 같은 상태 코드로 응답하는 백엔드
pub struct Status(pub StatusCode);

#[async_trait]
impl Handler for Status {
    async fn serve(&self, w: &mut dyn ResponseWriter, _req: Request<Body>) {
        w.headers_mut()
            .insert("x-backend", "status".parse().unwrap());
        w.write_header(self.0);
        write_all(w, b"backend body").await.unwrap();
    }
}

/// 미리 등록된 핸들러를 돌려주는 서비스 빌더
#[derive(Default)]
pub struct StaticServices {
    handlers: HashMap<String, BoxHandler>,
}

impl StaticServices {
    pub fn with(mut self, name: &str, handler: BoxHandler) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }
}

impl ServiceBuilder for StaticServices {
    fn build_http(&self, name: &str) -> Result<BoxHandler, BuildError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| BuildError::ServiceNotFound {
                name: name.to_string(),
            })
    }
}

/// 공급자별 TOML 구성을 합친 런타임 구성
pub fn runtime(providers: &[(&str, &str)]) -> RuntimeConfiguration {
    let configurations: BTreeMap<String, Configuration> = providers
        .iter()
        .map(|(provider, content)| {
            let configuration = toml::from_str(content).unwrap();
            (provider.to_string(), configuration)
        })
        .collect();
    merge(&configurations, &["web".to_string()])
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(empty_body()).unwrap()
}

pub async fn serve(handler: &BoxHandler, req: Request<Body>) -> ResponseRecorder {
    let mut rec = ResponseRecorder::new();
    handler.serve(&mut rec, req).await;
    rec
}
