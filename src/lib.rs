//! 미들웨어 체인으로 라우터별 동작을 조립하는 리버스 프록시입니다.
//!
//! # 주요 기능
//!
//! - 공급자 한정 이름(`name@provider`)과 중첩 체인을 해석하는 미들웨어 체인 빌더
//! - 응답 writer 가로채기: 측정(capture), 재시도, 에러 페이지
//! - 파일 공급자의 동적 구성과 무중단 라우터 교체
//!
//! # 예제
//!
//! ```
//! use std::sync::Arc;
//! use reverse_proxy_chain::middleware::{Chain, BoxHandler, Handler, ResponseRecorder};
//! use reverse_proxy_chain::middleware::handler::{empty_body, Body};
//! use reverse_proxy_chain::middleware::writer::{write_all, ResponseWriter};
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Handler for Hello {
//!     async fn serve(&self, w: &mut dyn ResponseWriter, _req: hyper::Request<Body>) {
//!         write_all(w, b"hello").await.unwrap();
//!     }
//! }
//!
//! let handler = Chain::new().then(Arc::new(Hello) as BoxHandler).unwrap();
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let mut rec = ResponseRecorder::new();
//! rt.block_on(handler.serve(&mut rec, hyper::Request::new(empty_body())));
//! assert_eq!(rec.body_string(), "hello");
//! ```

pub mod dynamic;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod routing;
pub mod server;
pub mod settings;
