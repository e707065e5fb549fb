use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, StatusCode, Uri};
use tracing::debug;

use crate::dynamic::ServiceConfig;
use crate::middleware::builder::ServiceBuilder;
use crate::middleware::error::BuildError;
use crate::middleware::handler::{Body, BoxHandler, Handler};
use crate::middleware::writer::{write_status, ResponseWriter};
use crate::proxy::{HttpClient, ProxyHandler};

/// 서버가 없는 서비스의 핸들러
struct Unavailable;

#[async_trait]
impl Handler for Unavailable {
    async fn serve(&self, w: &mut dyn ResponseWriter, _req: Request<Body>) {
        write_status(w, StatusCode::SERVICE_UNAVAILABLE).await;
    }
}

/// 런타임 구성의 서비스 정의로 백엔드 핸들러를 만듭니다.
pub struct ServiceManager {
    services: HashMap<String, ServiceConfig>,
    client: HttpClient,
}

impl ServiceManager {
    pub fn new(services: HashMap<String, ServiceConfig>, client: HttpClient) -> Self {
        Self { services, client }
    }
}

fn parse_target(name: &str, url: &str) -> Result<Uri, BuildError> {
    let invalid = |message: String| BuildError::InvalidService {
        name: name.to_string(),
        message,
    };

    let uri: Uri = url
        .parse()
        .map_err(|e| invalid(format!("invalid url {:?}: {}", url, e)))?;
    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => return Err(invalid(format!("unsupported scheme {:?}", other))),
        None => return Err(invalid(format!("url {:?} has no scheme", url))),
    }
    if uri.authority().is_none() {
        return Err(invalid(format!("url {:?} has no host", url)));
    }
    Ok(uri)
}

impl ServiceBuilder for ServiceManager {
    fn build_http(&self, name: &str) -> Result<BoxHandler, BuildError> {
        let config = self.services.get(name).ok_or_else(|| BuildError::ServiceNotFound {
            name: name.to_string(),
        })?;

        match &config.url {
            Some(url) => {
                let target = parse_target(name, url)?;
                debug!(service = %name, target = %target, "서비스 생성");
                Ok(ProxyHandler::new(target, self.client.clone()))
            }
            None => {
                debug!(service = %name, "서버가 없는 서비스");
                Ok(Arc::new(Unavailable))
            }
        }
    }
}
