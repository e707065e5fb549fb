use regex_lite as regex;

use super::error::RoutingError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathMatcherKind {
    Exact,
    Prefix,
    Regex,
}

/// 경로 규칙
///
/// - `^`로 시작하면 정규식
/// - `*`로 끝나면 접두사
/// - 그 외는 정확히 일치
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pub kind: PathMatcherKind,
    pub pattern: String,
    regex: Option<regex::Regex>,
}

impl PathMatcher {
    pub fn parse(pattern: &str) -> Result<Self, RoutingError> {
        if pattern.starts_with('^') {
            let re = regex::Regex::new(pattern).map_err(|e| RoutingError::InvalidPathPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(PathMatcher {
                kind: PathMatcherKind::Regex,
                pattern: pattern.to_string(),
                regex: Some(re),
            });
        }

        if !pattern.starts_with('/') {
            return Err(RoutingError::InvalidPathPattern {
                pattern: pattern.to_string(),
                reason: "path must start with '/'".to_string(),
            });
        }
        Ok(PathMatcher {
            kind: if pattern.ends_with('*') {
                PathMatcherKind::Prefix
            } else {
                PathMatcherKind::Exact
            },
            pattern: pattern.trim_end_matches('*').to_string(),
            regex: None,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.kind {
            PathMatcherKind::Exact => self.pattern == path,
            PathMatcherKind::Prefix => {
                // 접두사 매칭에서는 끝의 슬래시를 무시
                let pattern = self.pattern.trim_end_matches('/');
                if pattern.is_empty() {
                    return true;
                }
                let path = path.trim_end_matches('/');
                path == pattern || path.starts_with(&format!("{}/", pattern))
            }
            PathMatcherKind::Regex => self.regex.as_ref().is_some_and(|r| r.is_match(path)),
        }
    }
}

impl PartialEq for PathMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.pattern == other.pattern
    }
}

impl Eq for PathMatcher {}
