//! 요청을 묶는 기준(소스) 추출
//!
//! 동시 연결 제한과 요청 속도 제한이 같은 기준으로 요청을 분류합니다.

use hyper::header::{self, HeaderName};
use hyper::Request;

use super::ip::{InvalidRange, IpStrategy};
use crate::dynamic::SourceCriterionConfig;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("iPStrategy, requestHeaderName and requestHost are mutually exclusive")]
    Conflicting,

    #[error(transparent)]
    Range(#[from] InvalidRange),

    #[error("invalid header name {0:?}")]
    HeaderName(String),
}

#[derive(Debug, Clone)]
pub enum SourceExtractor {
    Ip(IpStrategy),
    Header(HeaderName),
    Host,
}

impl SourceExtractor {
    /// 기준이 비어 있으면 `default`를 씁니다.
    pub fn from_config(
        config: Option<&SourceCriterionConfig>,
        default: SourceExtractor,
    ) -> Result<Self, SourceError> {
        let Some(config) = config else {
            return Ok(default);
        };
        let header = config
            .request_header_name
            .as_deref()
            .filter(|name| !name.is_empty());

        let chosen = [config.ip_strategy.is_some(), header.is_some(), config.request_host];
        match chosen.iter().filter(|set| **set).count() {
            0 => Ok(default),
            1 => {
                if let Some(strategy) = &config.ip_strategy {
                    Ok(SourceExtractor::Ip(IpStrategy::from_config(Some(strategy))?))
                } else if let Some(name) = header {
                    HeaderName::from_bytes(name.as_bytes())
                        .map(SourceExtractor::Header)
                        .map_err(|_| SourceError::HeaderName(name.to_string()))
                } else {
                    Ok(SourceExtractor::Host)
                }
            }
            _ => Err(SourceError::Conflicting),
        }
    }

    pub fn extract<B>(&self, req: &Request<B>) -> String {
        match self {
            SourceExtractor::Ip(strategy) => strategy.client_ip(req),
            SourceExtractor::Header(name) => req
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            SourceExtractor::Host => request_host(req),
        }
    }
}

/// Host 헤더, 없으면 URI의 authority
pub fn request_host<B>(req: &Request<B>) -> String {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::IpStrategyConfig;

    #[test]
    fn test_default_when_empty() {
        let extractor =
            SourceExtractor::from_config(Some(&SourceCriterionConfig::default()), SourceExtractor::Host)
                .unwrap();
        assert!(matches!(extractor, SourceExtractor::Host));
    }

    #[test]
    fn test_conflicting_criteria() {
        let config = SourceCriterionConfig {
            ip_strategy: Some(IpStrategyConfig::default()),
            request_host: true,
            ..Default::default()
        };
        assert!(matches!(
            SourceExtractor::from_config(Some(&config), SourceExtractor::Host),
            Err(SourceError::Conflicting)
        ));
    }

    #[test]
    fn test_extract() {
        let req = Request::builder()
            .uri("http://fallback.local/")
            .header("x-api-key", "k1")
            .body(())
            .unwrap();

        let config = SourceCriterionConfig {
            request_header_name: Some("X-Api-Key".to_string()),
            ..Default::default()
        };
        let extractor = SourceExtractor::from_config(Some(&config), SourceExtractor::Host).unwrap();
        assert_eq!(extractor.extract(&req), "k1");
        assert_eq!(SourceExtractor::Host.extract(&req), "fallback.local");
    }
}
