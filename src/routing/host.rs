use super::error::RoutingError;

/// 호스트 규칙. 비교는 대소문자를 구분하지 않고, 요청의 포트는 무시합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMatcher {
    name: String,
}

impl HostMatcher {
    pub fn new(host: &str) -> Result<Self, RoutingError> {
        let host = host.trim();
        if host.is_empty() || host.contains('/') || host.contains(' ') {
            return Err(RoutingError::InvalidHost {
                host: host.to_string(),
                reason: "Invalid format".to_string(),
            });
        }
        Ok(Self {
            name: host.to_ascii_lowercase(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, request_host: &str) -> bool {
        strip_port(request_host).eq_ignore_ascii_case(&self.name)
    }
}

/// `example.com:8080` → `example.com`, `[::1]:80` → `[::1]`
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.parse::<u16>().is_ok() => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:80"), "[::1]");
        assert_eq!(strip_port("::1"), "::1");
    }

    #[test]
    fn test_host_matches() {
        let matcher = HostMatcher::new("Example.com").unwrap();
        assert!(matcher.matches("example.com"));
        assert!(matcher.matches("EXAMPLE.COM:8080"));
        assert!(!matcher.matches("api.example.com"));
    }

    #[test]
    fn test_invalid_host() {
        assert!(HostMatcher::new("").is_err());
        assert!(HostMatcher::new("example.com/path").is_err());
    }
}
