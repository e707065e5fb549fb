use crate::dynamic::provider::{provider_of, qualified_name};

use super::error::BuildError;

/// 미들웨어 생성 문맥
///
/// 현재 공급자와, 지금 생성 중인 체인 경로(방문한 미들웨어 이름)를
/// 담습니다. 분기마다 복사본을 만들기 때문에 형제 분기는 서로의 경로를
/// 보지 못합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstructorContext {
    provider: Option<String>,
    stack: Vec<String>,
}

impl ConstructorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            stack: Vec::new(),
        }
    }

    /// 한정된 이름(`router@provider`)에서 문맥을 만듭니다.
    pub fn for_element(name: &str) -> Self {
        Self::new().enter(name)
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    pub fn qualified_name(&self, name: &str) -> String {
        qualified_name(self.provider(), name)
    }

    /// 한정된 이름의 공급자로 전환한 문맥을 반환합니다.
    pub fn enter(&self, qualified: &str) -> Self {
        let mut next = self.clone();
        if let Some(provider) = provider_of(qualified) {
            next.provider = Some(provider.to_string());
        }
        next
    }

    /// `name`이 현재 경로에 이미 있으면 순환으로 판단합니다.
    pub fn check_recursion(&self, name: &str) -> Result<Self, BuildError> {
        if let Some(start) = self.stack.iter().position(|visited| visited == name) {
            let mut cycle = self.stack[start..].to_vec();
            cycle.push(name.to_string());
            return Err(BuildError::Recursion {
                name: name.to_string(),
                path: cycle.join("->"),
            });
        }

        let mut next = self.clone();
        next.stack.push(name.to_string());
        Ok(next)
    }
}
