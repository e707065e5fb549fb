use std::path::Path;

use time::format_description::well_known::Rfc3339;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, EnvFilter};

use crate::settings::{LogFormat, LogOutput, LogSettings};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("로그 파일 경로가 올바르지 않습니다: {0}")]
    InvalidPath(String),

    #[error("로거 초기화 실패: {0}")]
    Init(String),
}

/// 전역 tracing subscriber를 설치합니다.
///
/// `RUST_LOG`가 있으면 그 필터를 따르고, 없으면 설정의 레벨을 씁니다.
/// 반환된 guard가 살아 있는 동안만 로그가 기록되므로 main에서 들고
/// 있어야 합니다.
pub fn init_logging(settings: &LogSettings) -> Result<WorkerGuard, LoggingError> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(settings.level).into())
        .from_env_lossy();

    let (writer, guard) = match &settings.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::File(path) => {
            let path = Path::new(path);
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_timer(UtcTime::new(Rfc3339))
        .with_target(true);

    let result = match settings.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(settings.output == LogOutput::Stdout).try_init(),
    };
    result.map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}
