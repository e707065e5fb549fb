use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use reverse_proxy_chain::dynamic::{ConfigMessage, Configuration};
use reverse_proxy_chain::server::Server;
use reverse_proxy_chain::settings::{ServerSettings, Settings};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

async fn echo(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    let body = format!(
        "path={} prefix={} xff={} host={}",
        req.uri().path(),
        header("x-forwarded-prefix"),
        header("x-forwarded-for"),
        header("x-forwarded-host"),
    );
    Ok(Response::builder()
        .header("connection", "close")
        .body(Full::new(Bytes::from(body)))
        .unwrap())
}

/// 요청 정보를 본문으로 돌려주는 백엔드를 띄웁니다.
async fn start_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(echo))
                    .await;
            });
        }
    });
    addr
}

/// 닫힌 포트 주소
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn dynamic_config(backend: SocketAddr, dead: SocketAddr) -> Configuration {
    let content = format!(
        r#"
        [http.routers.api]
        host = "app.example.com"
        path = "/api*"
        service = "backend"
        middlewares = ["secured"]

        [http.routers.down]
        host = "app.example.com"
        path = "/down*"
        service = "dead"
        middlewares = ["retry"]

        [http.routers.maintenance]
        host = "maintenance.example.com"
        service = "empty"

        [http.services.backend]
        url = "http://{backend}"

        [http.services.dead]
        url = "http://{dead}"

        [http.services.empty]

        [http.middlewares.secured.chain]
        middlewares = ["strip", "tag"]

        [http.middlewares.strip.stripPrefix]
        prefixes = ["/api"]

        [http.middlewares.tag.headers.customResponseHeaders]
        x-proxy = "chain"

        [http.middlewares.retry.retry]
        attempts = 2
        initialInterval = "10ms"
        "#
    );
    toml::from_str(&content).unwrap()
}

struct Running {
    addr: SocketAddr,
    config: mpsc::Sender<ConfigMessage>,
    shutdown: oneshot::Sender<()>,
    client: reqwest::Client,
}

impl Running {
    async fn start() -> Self {
        let settings = Settings {
            server: ServerSettings {
                address: "127.0.0.1".to_string(),
                http_port: 0,
                entry_point: "web".to_string(),
            },
            ..Default::default()
        };
        let server = Server::new(&settings).await.unwrap();
        let addr = server.local_addr().unwrap();
        let config = server.config_sender();

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(server.run(async move {
            let _ = shutdown_rx.await;
        }));

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        Self {
            addr,
            config,
            shutdown,
            client,
        }
    }

    async fn get(&self, host: &str, path: &str) -> reqwest::Response {
        self.client
            .get(format!("http://{}{}", self.addr, path))
            .header("host", host)
            .send()
            .await
            .unwrap()
    }

    /// 라우터가 교체될 때까지 기다립니다.
    async fn wait_for_route(&self, host: &str, path: &str) {
        for _ in 0..100 {
            if self.get(host, path).await.status() != reqwest::StatusCode::NOT_FOUND {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("route {}{} was never installed", host, path);
    }
}

#[tokio::test]
async fn test_end_to_end_routing() {
    let backend = start_backend().await;
    let dead = closed_port().await;
    let proxy = Running::start().await;

    let res = proxy.get("app.example.com", "/api/hello").await;
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "404 page not found\n");

    proxy
        .config
        .send(ConfigMessage {
            provider_name: "file".to_string(),
            configuration: dynamic_config(backend, dead),
        })
        .await
        .unwrap();
    proxy.wait_for_route("app.example.com", "/api/hello").await;

    let res = proxy.get("app.example.com", "/api/hello").await;
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(res.headers()["x-proxy"], "chain");
    let body = res.text().await.unwrap();
    assert!(body.contains("path=/hello"), "{}", body);
    assert!(body.contains("prefix=/api"), "{}", body);
    assert!(body.contains("xff=127.0.0.1"), "{}", body);
    assert!(body.contains("host=app.example.com"), "{}", body);

    let res = proxy.get("maintenance.example.com", "/").await;
    assert_eq!(res.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let res = proxy.get("app.example.com", "/down/x").await;
    assert_eq!(res.status(), reqwest::StatusCode::BAD_GATEWAY);

    let res = proxy.get("other.example.com", "/api/hello").await;
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);

    let _ = proxy.shutdown.send(());
}

#[tokio::test]
async fn test_broken_router_does_not_affect_others() {
    let backend = start_backend().await;
    let proxy = Running::start().await;

    let content = format!(
        r#"
        [http.routers.good]
        path = "/good"
        service = "backend"

        [http.routers.broken]
        path = "/broken"
        service = "backend"
        middlewares = ["missing"]

        [http.services.backend]
        url = "http://{backend}"
        "#
    );
    proxy
        .config
        .send(ConfigMessage {
            provider_name: "file".to_string(),
            configuration: toml::from_str(&content).unwrap(),
        })
        .await
        .unwrap();
    proxy.wait_for_route("localhost", "/good").await;

    let res = proxy.get("localhost", "/good").await;
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    let res = proxy.get("localhost", "/broken").await;
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);

    let _ = proxy.shutdown.send(());
}
