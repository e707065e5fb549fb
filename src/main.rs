use std::process;

use reverse_proxy_chain::logging::init_logging;
use reverse_proxy_chain::server::Server;
use reverse_proxy_chain::settings::Settings;
use tracing::{error, info};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "종료 신호 대기 실패");
        std::future::pending::<()>().await;
    }
    info!("종료 신호 수신");
}

#[tokio::main]
async fn main() {
    let settings = match Settings::load().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("설정 로드 실패: {}", e);
            process::exit(1);
        }
    };

    let guard = match init_logging(&settings.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    info!(
        port = settings.server.http_port,
        entry_point = %settings.server.entry_point,
        file_provider = ?settings.providers.file,
        "리버스 프록시 시작"
    );

    let server = match Server::new(&settings).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "서버 초기화 실패");
            drop(guard);
            process::exit(1);
        }
    };

    if let Err(e) = server.run(shutdown_signal()).await {
        error!(error = %e, "서버 실행 실패");
        drop(guard);
        process::exit(1);
    }
    info!("리버스 프록시 종료");
    drop(guard);
}
