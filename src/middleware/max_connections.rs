//! 소스별 동시 처리 요청 수 제한

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use hyper::{Request, StatusCode};
use tracing::debug;

use super::error::BuildError;
use super::handler::{Body, BoxHandler, Handler};
use super::source::SourceExtractor;
use super::writer::{write_status, ResponseWriter};
use crate::dynamic::MaxConnectionsConfig;

pub struct MaxConnections {
    next: BoxHandler,
    amount: u64,
    extractor: SourceExtractor,
    in_flight: Arc<DashMap<String, u64>>,
    name: String,
}

pub fn new(next: BoxHandler, config: &MaxConnectionsConfig, name: &str) -> Result<BoxHandler, BuildError> {
    debug!(middleware = %name, kind = "inFlightReq", "미들웨어 생성");

    if config.amount <= 0 {
        return Err(BuildError::invalid(
            name,
            format!("max connections must be greater than 0, got {}", config.amount),
        ));
    }
    let extractor = SourceExtractor::from_config(config.source_criterion.as_ref(), SourceExtractor::Host)
        .map_err(|e| BuildError::invalid(name, e.to_string()))?;

    Ok(Arc::new(MaxConnections {
        next,
        amount: config.amount as u64,
        extractor,
        in_flight: Arc::new(DashMap::new()),
        name: name.to_string(),
    }))
}

/// 요청 처리가 끝나면 카운터를 되돌립니다.
struct Slot {
    in_flight: Arc<DashMap<String, u64>>,
    source: String,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let remaining = self.in_flight.get_mut(&self.source).map(|mut count| {
            *count = count.saturating_sub(1);
            *count
        });
        if remaining == Some(0) {
            self.in_flight.remove_if(&self.source, |_, count| *count == 0);
        }
    }
}

impl MaxConnections {
    fn acquire(&self, source: &str) -> Option<Slot> {
        let mut count = self.in_flight.entry(source.to_string()).or_insert(0);
        if *count >= self.amount {
            return None;
        }
        *count += 1;
        drop(count);

        Some(Slot {
            in_flight: self.in_flight.clone(),
            source: source.to_string(),
        })
    }
}

#[async_trait]
impl Handler for MaxConnections {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request<Body>) {
        let source = self.extractor.extract(&req);
        let Some(_slot) = self.acquire(&source) else {
            debug!(middleware = %self.name, source = %source, "동시 요청 한도 초과");
            write_status(w, StatusCode::TOO_MANY_REQUESTS).await;
            return;
        };
        self.next.serve(w, req).await;
    }
}
