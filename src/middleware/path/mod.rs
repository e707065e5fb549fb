//! 요청 경로를 바꾸는 미들웨어들

pub mod add_prefix;
pub mod replace_path;
pub mod replace_path_regex;
pub mod strip_prefix;
pub mod strip_prefix_regex;

use hyper::header::HeaderValue;
use hyper::{Request, Uri};
use regex_lite::Regex;

use super::error::BuildError;

pub const FORWARDED_PREFIX_HEADER: &str = "x-forwarded-prefix";
pub const REPLACED_PATH_HEADER: &str = "x-replaced-path";

/// 쿼리는 유지한 채 경로만 바꿉니다.
pub(crate) fn set_path<B>(req: &mut Request<B>, path: &str) -> Result<(), hyper::http::Error> {
    let path_and_query = match req.uri().query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse()?);
    *req.uri_mut() = Uri::from_parts(parts)?;
    Ok(())
}

pub(crate) fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

pub(crate) fn header_value(name: &str, value: &str) -> Result<HeaderValue, BuildError> {
    HeaderValue::from_str(value).map_err(|e| BuildError::invalid(name, e.to_string()))
}

pub(crate) fn compile(name: &str, pattern: &str) -> Result<Regex, BuildError> {
    Regex::new(pattern)
        .map_err(|e| BuildError::invalid(name, format!("invalid regex {:?}: {}", pattern, e)))
}
