//! 로깅 초기화

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// RUST_LOG 가 없으면 info; 대화형 출력과 섞이지 않도록 stderr 로 쓴다
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
