use tracing_subscriber::EnvFilter;

pub fn trace_init() {
    let level = std::env::var("TEST_LOG").unwrap_or_else(|_| "debug".to_string());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_test_writer()
        .try_init();
}
