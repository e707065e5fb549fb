//! 정적 설정: TOML 파일(`PROXY_CONFIG_FILE`) 또는 환경 변수

use std::{env, fs, path::Path};
use serde::Deserialize;
use tracing::debug;

mod error;
pub mod logging;
mod providers;
mod server;

pub use error::SettingsError;
pub use logging::{LogFormat, LogOutput, LogSettings};
pub use providers::{FileProviderSettings, ObservabilitySettings, ProvidersSettings};
pub use server::{parse_env_var, ServerSettings};

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    // 서버 설정
    #[serde(default)]
    pub server: ServerSettings,

    // 로깅 설정
    #[serde(default)]
    pub logging: LogSettings,

    /// 동적 구성 공급자
    #[serde(default)]
    pub providers: ProvidersSettings,

    /// access log, tracing, metrics 사용 여부
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    pub async fn load() -> Result<Self> {
        if let Ok(config_path) = env::var("PROXY_CONFIG_FILE") {
            Self::from_toml_file(&config_path).await
        } else {
            Self::from_env().await
        }
    }

    pub async fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| SettingsError::FileError {
            path: path.as_ref().to_string_lossy().to_string(),
            error: e,
        })?;

        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        debug!(path = %path.as_ref().display(), "설정 파일 로드");
        Ok(settings)
    }

    pub async fn from_env() -> Result<Self> {
        let settings = Self {
            server: ServerSettings::from_env()?,
            logging: LogSettings::from_env()?,
            providers: ProvidersSettings::from_env()?,
            observability: ObservabilitySettings::default(),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// 설정 유효성 검증
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;

        if let Some(file) = &self.providers.file {
            if file.filename.is_empty() {
                return Err(SettingsError::InvalidConfig(
                    "providers.file.filename이 비어 있습니다".to_string(),
                ));
            }
        }

        Ok(())
    }
}
