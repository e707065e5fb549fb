//! HTTP 미들웨어
//!
//! 모든 미들웨어는 `Handler`를 감싸는 `Handler`입니다. 응답은
//! `ResponseWriter`로 흐르므로, 응답을 관찰하거나 바꾸는 미들웨어는 writer를
//! 감싸서 다음 핸들러에 넘깁니다.

pub mod basic_auth;
pub mod buffering;
pub mod builder;
pub mod capture;
pub mod chain;
pub mod circuit_breaker;
pub mod compress;
pub mod context;
pub mod digest_auth;
pub mod error;
pub mod error_pages;
pub mod forward_auth;
pub mod handler;
pub mod headers;
pub mod ip;
pub mod ip_allow_list;
pub mod max_connections;
pub mod pass_tls_client_cert;
pub mod path;
pub mod rate_limit;
pub mod redirect;
pub mod retry;
pub mod source;
pub mod traced;
pub mod writer;

pub use builder::{Builder, ServiceBuilder};
pub use capture::{Capture, CaptureHandler};
pub use chain::{Chain, Constructor};
pub use context::ConstructorContext;
pub use error::BuildError;
pub use handler::{Body, BoxError, BoxHandler, ConnectionInfo, Handler};
pub use retry::{RetryListener, RetryListeners};
pub use writer::{ResponseRecorder, ResponseWriter, WriterError};
