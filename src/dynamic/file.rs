use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{ConfigMessage, Configuration, Provider, ProviderError};

pub const FILE_PROVIDER_NAME: &str = "file";

/// TOML 파일에서 동적 구성을 읽는 공급자
#[derive(Debug, Clone)]
pub struct FileProvider {
    filename: PathBuf,
    watch: bool,
}

impl FileProvider {
    pub fn new<P: Into<PathBuf>>(filename: P, watch: bool) -> Self {
        Self {
            filename: filename.into(),
            watch,
        }
    }

    pub async fn load(&self) -> Result<Configuration, ProviderError> {
        let content = tokio::fs::read_to_string(&self.filename).await?;
        let configuration = toml::from_str(&content)?;
        debug!(path = %self.filename.display(), "동적 구성 파일 로드");
        Ok(configuration)
    }

    fn message(configuration: Configuration) -> ConfigMessage {
        ConfigMessage {
            provider_name: FILE_PROVIDER_NAME.to_string(),
            configuration,
        }
    }

    fn is_target(&self, path: &Path) -> bool {
        path.file_name().is_some() && path.file_name() == self.filename.file_name()
    }

    fn start_watcher(&self) -> Result<(RecommendedWatcher, mpsc::Receiver<PathBuf>), ProviderError> {
        let (event_tx, event_rx) = mpsc::channel(32);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                for path in event.paths {
                    let _ = event_tx.blocking_send(path);
                }
            }
            Err(e) => error!(error = %e, "파일 감시 오류"),
        })?;

        // 편집기가 파일을 교체하는 경우도 잡기 위해 상위 디렉터리를 감시합니다
        let dir = match self.filename.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = %self.filename.display(), "동적 구성 파일 감시 시작");

        Ok((watcher, event_rx))
    }
}

#[async_trait]
impl Provider for FileProvider {
    fn name(&self) -> &str {
        FILE_PROVIDER_NAME
    }

    async fn provide(&self, tx: mpsc::Sender<ConfigMessage>) -> Result<(), ProviderError> {
        let configuration = self.load().await?;
        tx.send(Self::message(configuration))
            .await
            .map_err(|_| ProviderError::ChannelClosed)?;

        if !self.watch {
            return Ok(());
        }

        let (watcher, mut events) = self.start_watcher()?;
        let provider = self.clone();
        tokio::spawn(async move {
            let _watcher = watcher;
            while let Some(path) = events.recv().await {
                if !provider.is_target(&path) {
                    continue;
                }
                match provider.load().await {
                    Ok(configuration) => {
                        if tx.send(Self::message(configuration)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, path = %path.display(), "변경된 구성 파일을 적용하지 못했습니다"),
                }
            }
            debug!("동적 구성 파일 감시 종료");
        });

        Ok(())
    }
}
