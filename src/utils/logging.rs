use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Installs the global subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.format.eq_ignore_ascii_case("json") {
        let _ = registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init();
    } else {
        let _ = registry
            .with(fmt::layer().with_target(true))
            .try_init();
    }
}

fn default_directives(level: &str) -> String {
    format!("{level},hyper=warn,reqwest=warn,teloxide=warn")
}
