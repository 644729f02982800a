use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the environment default.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(env: &Environment) {
    let fallback = format!(
        "{level},courier_server={level},courier_jobs={level},courier_notify={level}",
        level = env.default_log_level()
    );
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
