//! 공급자 한정 이름 (`name@provider`)

const SEPARATOR: char = '@';

pub fn make_qualified_name(provider: &str, name: &str) -> String {
    format!("{}{}{}", name, SEPARATOR, provider)
}

pub fn is_qualified(name: &str) -> bool {
    name.contains(SEPARATOR)
}

/// 이미 한정된 이름이거나 공급자가 없으면 그대로 반환합니다.
pub fn qualified_name(provider: Option<&str>, name: &str) -> String {
    match provider {
        Some(provider) if !is_qualified(name) => make_qualified_name(provider, name),
        _ => name.to_string(),
    }
}

/// 한정된 이름의 공급자 부분
pub fn provider_of(name: &str) -> Option<&str> {
    name.split_once(SEPARATOR).map(|(_, provider)| provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name(Some("file"), "auth"), "auth@file");
        assert_eq!(qualified_name(Some("file"), "auth@docker"), "auth@docker");
        assert_eq!(qualified_name(None, "auth"), "auth");
    }

    #[test]
    fn test_provider_of() {
        assert_eq!(provider_of("auth@docker"), Some("docker"));
        assert_eq!(provider_of("auth"), None);
    }
}
