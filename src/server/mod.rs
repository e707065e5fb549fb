//! 리스너, 엔트리포인트, 동적 구성 적용을 묶는 서버

pub mod entrypoint;
pub mod error;
pub mod handler;
pub mod listener;
pub mod observability;
pub mod reconciler;
pub mod router_factory;
pub mod services;
pub mod switcher;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

pub use error::Error;

use self::handler::RequestHandler;
use self::listener::ServerListener;
use self::observability::{AccessLogRetryListener, MetricsRetryListener};
use self::reconciler::Reconciler;
use self::switcher::RouterSwitcher;
use crate::dynamic::{ConfigMessage, FileProvider, Provider};
use crate::middleware::retry::{RetryListener, RetryListeners};
use crate::proxy::http_client;
use crate::settings::Settings;

pub type Result<T> = std::result::Result<T, Error>;

const CONFIG_CHANNEL_CAPACITY: usize = 16;

pub struct Server {
    listener: ServerListener,
    handler: Arc<RequestHandler>,
    reconciler: Reconciler,
    providers: Vec<Arc<dyn Provider>>,
    config_tx: mpsc::Sender<ConfigMessage>,
    config_rx: mpsc::Receiver<ConfigMessage>,
}

impl Server {
    pub async fn new(settings: &Settings) -> Result<Self> {
        let entry_point = settings.server.entry_point.as_str();
        let switcher = Arc::new(RouterSwitcher::new());
        let entry = entrypoint::assemble(entry_point, switcher.clone(), &settings.observability);

        let mut listeners = RetryListeners::new();
        if settings.observability.access_log {
            listeners = listeners.with(Arc::new(AccessLogRetryListener));
        }
        if settings.observability.metrics {
            listeners = listeners.with(Arc::new(MetricsRetryListener));
        }
        let retry_listener: Arc<dyn RetryListener> = Arc::new(listeners);

        let reconciler = Reconciler::new(entry_point, switcher, http_client(), retry_listener);

        let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
        if let Some(file) = &settings.providers.file {
            providers.push(Arc::new(FileProvider::new(&file.filename, file.watch)));
        }

        let listener = ServerListener::new(&settings.server).await?;
        let (config_tx, config_rx) = mpsc::channel(CONFIG_CHANNEL_CAPACITY);

        Ok(Self {
            listener,
            handler: Arc::new(RequestHandler::new(entry)),
            reconciler,
            providers,
            config_tx,
            config_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 외부에서 구성 갱신을 보낼 수 있는 채널
    pub fn config_sender(&self) -> mpsc::Sender<ConfigMessage> {
        self.config_tx.clone()
    }

    /// 공급자를 시작하고 `shutdown`이 끝날 때까지 요청을 처리합니다.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            listener,
            handler,
            reconciler,
            providers,
            config_tx,
            config_rx,
        } = self;

        let reconciler_task = tokio::spawn(reconciler.run(config_rx));

        for provider in providers {
            let tx = config_tx.clone();
            tokio::spawn(async move {
                info!(provider = %provider.name(), "공급자 시작");
                if let Err(e) = provider.provide(tx).await {
                    error!(provider = %provider.name(), error = %e, "공급자 실행 실패");
                }
            });
        }
        drop(config_tx);

        let result = listener.run(handler, shutdown).await;
        reconciler_task.abort();
        result
    }
}
