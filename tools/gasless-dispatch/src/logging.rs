use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise tracing for the given `NETWORK_ENV`. `RUST_LOG` wins when set.
pub fn init_tracing(network_env: &str) -> Result<()> {
    let production = network_env.eq_ignore_ascii_case("production");
    let default_directives = if production {
        "info"
    } else {
        "debug,hyper=info,reqwest=info,rustls=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let base = fmt()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true)
        .with_level(true);

    if production {
        base.json()
            .with_current_span(false)
            .with_span_list(false)
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!("failed to initialise tracing: {err}"))
    } else {
        base.with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!("failed to initialise tracing: {err}"))
    }
}
