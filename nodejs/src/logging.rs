use napi_derive::napi;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "ae_bridge=info,ae_bridge_nodejs=info";

/// Install a stderr log subscriber
///
/// `filter` takes precedence over `RUST_LOG`. Returns `false` if a subscriber
/// was already installed.
#[napi]
pub fn init_logging(filter: Option<String>) -> bool {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
