use serde::Deserialize;
use std::env;
use super::{server::parse_env_var, SettingsError};

/// 동적 구성 공급자 설정
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersSettings {
    #[serde(default)]
    pub file: Option<FileProviderSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileProviderSettings {
    /// 동적 구성 TOML 파일 경로
    pub filename: String,

    /// 파일 변경을 감시해서 다시 적용할지 여부
    #[serde(default)]
    pub watch: bool,
}

impl ProvidersSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let file = match env::var("PROXY_DYNAMIC_CONFIG") {
            Ok(filename) if !filename.is_empty() => Some(FileProviderSettings {
                filename,
                watch: parse_env_var("PROXY_WATCH", || false)?,
            }),
            _ => None,
        };
        Ok(Self { file })
    }
}

/// 엔트리포인트 관측 핸들러 설정
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilitySettings {
    #[serde(default = "enabled")]
    pub access_log: bool,

    #[serde(default = "enabled")]
    pub tracing: bool,

    #[serde(default)]
    pub metrics: bool,
}

fn enabled() -> bool {
    true
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            access_log: true,
            tracing: true,
            metrics: false,
        }
    }
}
